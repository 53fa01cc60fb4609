//! Weather tool - current conditions for a place name
//!
//! OpenWeather is tried first when `OPENWEATHER_API_KEY` is configured. Any
//! OpenWeather failure falls back to Open-Meteo, which needs no key. Both
//! providers are normalized to the same payload.

use crate::error::ToolFailure;
use crate::http::fetch_json;
use crate::registry::{CapabilityDescriptor, Tool};
use aiops_llm::util::mask_api_key;
use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

/// OpenWeather API base URL
pub const OPENWEATHER_BASE: &str = "https://api.openweathermap.org";
/// Open-Meteo geocoding base URL
pub const OPEN_METEO_GEOCODING_BASE: &str = "https://geocoding-api.open-meteo.com";
/// Open-Meteo forecast base URL
pub const OPEN_METEO_FORECAST_BASE: &str = "https://api.open-meteo.com";

/// Weather adapter configuration
#[derive(Clone)]
pub struct WeatherConfig {
    /// OpenWeather key (None = Open-Meteo only)
    pub openweather_key: Option<String>,
    /// OpenWeather base URL
    pub openweather_base: String,
    /// Open-Meteo geocoding base URL
    pub geocoding_base: String,
    /// Open-Meteo forecast base URL
    pub forecast_base: String,
}

impl fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherConfig")
            .field(
                "openweather_key",
                &self.openweather_key.as_deref().map(mask_api_key),
            )
            .field("openweather_base", &self.openweather_base)
            .field("geocoding_base", &self.geocoding_base)
            .field("forecast_base", &self.forecast_base)
            .finish()
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            openweather_key: None,
            openweather_base: OPENWEATHER_BASE.to_string(),
            geocoding_base: OPEN_METEO_GEOCODING_BASE.to_string(),
            forecast_base: OPEN_METEO_FORECAST_BASE.to_string(),
        }
    }
}

impl WeatherConfig {
    /// Read `OPENWEATHER_API_KEY` from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            openweather_key: std::env::var("OPENWEATHER_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }

    /// Set the OpenWeather key
    #[must_use]
    pub fn with_openweather_key(mut self, key: impl Into<String>) -> Self {
        self.openweather_key = Some(key.into());
        self
    }

    /// Point every provider at one base URL (mock servers)
    #[must_use]
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.openweather_base = base.clone();
        self.geocoding_base = base.clone();
        self.forecast_base = base;
        self
    }
}

/// Human-readable text for a WMO weather interpretation code
#[must_use]
pub fn wmo_condition(code: i64) -> String {
    let text = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        other => return format!("Weather code {}", other),
    };
    text.to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Tool for current weather
pub struct WeatherTool {
    descriptor: CapabilityDescriptor,
    client: Client,
    config: WeatherConfig,
}

impl WeatherTool {
    /// Create a new weather tool
    #[must_use]
    pub fn new(client: Client, config: WeatherConfig) -> Self {
        let descriptor = CapabilityDescriptor::new(
            "weather_current",
            "Current weather conditions (temperature, humidity, wind, condition) for a city or place name",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "minLength": 1,
                    "description": "City or place name, e.g. 'Mumbai'"
                }
            },
            "required": ["location"],
            "additionalProperties": false
        }))
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "location": {"type": "string"},
                "region": {"type": ["string", "null"]},
                "country": {"type": ["string", "null"]},
                "latitude": {"type": "number"},
                "longitude": {"type": "number"},
                "temperature_c": {"type": "number"},
                "apparent_temperature_c": {"type": ["number", "null"]},
                "humidity_pct": {"type": ["number", "null"]},
                "wind_kph": {"type": ["number", "null"]},
                "condition": {"type": "string"},
                "observed_at": {"type": ["string", "null"]},
                "provider": {"type": "string"}
            },
            "required": ["location", "temperature_c", "condition", "provider"]
        }));

        Self {
            descriptor,
            client,
            config,
        }
    }

    async fn openweather(&self, key: &str, location: &str) -> Result<Value, ToolFailure> {
        let geo = fetch_json(
            "openweather",
            self.client
                .get(format!("{}/geo/1.0/direct", self.config.openweather_base))
                .query(&[("q", location), ("limit", "1"), ("appid", key)]),
        )
        .await?;
        let place = geo
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ToolFailure::not_found(format!("no place named '{}'", location)))?;

        let (lat, lon) = match (
            place.get("lat").and_then(Value::as_f64),
            place.get("lon").and_then(Value::as_f64),
        ) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(ToolFailure::malformed("openweather geocode without coordinates")),
        };

        let current = fetch_json(
            "openweather",
            self.client
                .get(format!("{}/data/2.5/weather", self.config.openweather_base))
                .query(&[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("appid", key.to_string()),
                    ("units", "metric".to_string()),
                ]),
        )
        .await?;

        let main = &current["main"];
        let temperature = main["temp"]
            .as_f64()
            .ok_or_else(|| ToolFailure::malformed("openweather response without main.temp"))?;
        let condition = current["weather"][0]["description"]
            .as_str()
            .map(capitalize)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let observed_at = current["dt"].as_i64().and_then(|dt| {
            let offset = current["timezone"].as_i64().unwrap_or(0);
            chrono::DateTime::from_timestamp(dt + offset, 0)
                .map(|t| t.format("%Y-%m-%dT%H:%M").to_string())
        });

        Ok(json!({
            "location": place["name"].as_str().unwrap_or(location),
            "region": place["state"].as_str(),
            "country": place["country"].as_str(),
            "latitude": lat,
            "longitude": lon,
            "temperature_c": temperature,
            "apparent_temperature_c": main["feels_like"].as_f64(),
            "humidity_pct": main["humidity"].as_f64(),
            "wind_kph": current["wind"]["speed"].as_f64().map(|ms| (ms * 3.6 * 10.0).round() / 10.0),
            "condition": condition,
            "observed_at": observed_at,
            "provider": "openweather",
        }))
    }

    async fn open_meteo(&self, location: &str) -> Result<Value, ToolFailure> {
        let geo = fetch_json(
            "open-meteo",
            self.client
                .get(format!("{}/v1/search", self.config.geocoding_base))
                .query(&[
                    ("name", location),
                    ("count", "1"),
                    ("language", "en"),
                    ("format", "json"),
                ]),
        )
        .await?;
        let place = geo["results"]
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ToolFailure::not_found(format!("no place named '{}'", location)))?;

        let (lat, lon) = match (place["latitude"].as_f64(), place["longitude"].as_f64()) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(ToolFailure::malformed("open-meteo geocode without coordinates")),
        };

        let forecast = fetch_json(
            "open-meteo",
            self.client
                .get(format!("{}/v1/forecast", self.config.forecast_base))
                .query(&[
                    ("latitude", lat.to_string()),
                    ("longitude", lon.to_string()),
                    (
                        "current",
                        "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code"
                            .to_string(),
                    ),
                    ("timezone", "auto".to_string()),
                ]),
        )
        .await?;

        let current = &forecast["current"];
        let temperature = current["temperature_2m"].as_f64().ok_or_else(|| {
            ToolFailure::malformed("open-meteo response without current.temperature_2m")
        })?;
        let condition = current["weather_code"]
            .as_i64()
            .map(wmo_condition)
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(json!({
            "location": place["name"].as_str().unwrap_or(location),
            "region": place["admin1"].as_str(),
            "country": place["country"].as_str(),
            "latitude": lat,
            "longitude": lon,
            "temperature_c": temperature,
            "apparent_temperature_c": current["apparent_temperature"].as_f64(),
            "humidity_pct": current["relative_humidity_2m"].as_f64(),
            "wind_kph": current["wind_speed_10m"].as_f64(),
            "condition": condition,
            "observed_at": current["time"].as_str(),
            "provider": "open-meteo",
        }))
    }
}

#[async_trait::async_trait]
impl Tool for WeatherTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolFailure> {
        let location = args["location"].as_str().unwrap_or_default().trim();
        if location.is_empty() {
            return Err(ToolFailure::not_found("empty location"));
        }

        let mut openweather_error = None;
        if let Some(key) = self.config.openweather_key.as_deref() {
            match self.openweather(key, location).await {
                Ok(payload) => return Ok(payload),
                Err(failure) => {
                    warn!(location, error = %failure, "OpenWeather failed, falling back to Open-Meteo");
                    openweather_error = Some(failure);
                }
            }
        }

        match self.open_meteo(location).await {
            Ok(mut payload) => {
                if openweather_error.is_some() {
                    payload["fallback_from"] = json!("openweather");
                }
                debug!(location, "Weather resolved via Open-Meteo");
                Ok(payload)
            }
            Err(failure) => {
                let message = match openweather_error {
                    Some(ow) => format!("openweather: {} | open-meteo: {}", ow.message, failure.message),
                    None => failure.message,
                };
                Err(ToolFailure::new(failure.kind, message))
            }
        }
    }
}
