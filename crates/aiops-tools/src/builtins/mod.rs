//! Builtins - Built-in capabilities
//!
//! This module provides the external data-fetching capabilities:
//! - Weather: weather_current (OpenWeather, Open-Meteo fallback)
//! - GitHub: github_repo_search
//! - News: news_search (NewsAPI, GDELT, Google News RSS)

mod github;
mod news;
mod weather;

pub use github::{GitHubConfig, GitHubSearchTool, GITHUB_API_BASE};
pub use news::{NewsConfig, NewsSearchTool};
pub use weather::{wmo_condition, WeatherConfig, WeatherTool};

use crate::error::Result;
use crate::http::build_client;
use crate::registry::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for built-in capabilities
#[derive(Debug, Clone, Default)]
pub struct BuiltinsConfig {
    /// Weather adapter settings
    pub weather: WeatherConfig,
    /// GitHub adapter settings
    pub github: GitHubConfig,
    /// News adapter settings
    pub news: NewsConfig,
    /// HTTP timeout shared by all adapters (None = 20s)
    pub http_timeout: Option<Duration>,
}

impl BuiltinsConfig {
    /// Read adapter credentials from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            weather: WeatherConfig::from_env(),
            github: GitHubConfig::from_env(),
            news: NewsConfig::from_env(),
            http_timeout: None,
        }
    }

    /// Set the HTTP timeout
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }
}

/// Register all built-in capabilities with the registry (default config)
pub fn register_builtins(registry: &mut ToolRegistry) -> Result<()> {
    register_builtins_with_config(registry, &BuiltinsConfig::default())
}

/// Register all built-in capabilities with custom configuration
pub fn register_builtins_with_config(
    registry: &mut ToolRegistry,
    config: &BuiltinsConfig,
) -> Result<()> {
    let client = build_client(config.http_timeout.unwrap_or(Duration::from_secs(20)))?;

    registry.register(Arc::new(WeatherTool::new(
        client.clone(),
        config.weather.clone(),
    )))?;
    registry.register(Arc::new(GitHubSearchTool::new(
        client.clone(),
        config.github.clone(),
    )))?;
    registry.register(Arc::new(NewsSearchTool::new(client, config.news.clone())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtins() {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry).unwrap();

        assert_eq!(
            registry.list_names(),
            vec!["github_repo_search", "news_search", "weather_current"]
        );
        assert!(register_builtins(&mut registry).is_err());
    }

    #[test]
    fn test_builtin_descriptors_are_closed_objects() {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry).unwrap();

        for descriptor in registry.catalogue().descriptors() {
            assert_eq!(descriptor.input_schema["type"], "object");
            assert_eq!(descriptor.input_schema["additionalProperties"], false);
            assert!(!descriptor.description.is_empty());
        }
    }
}
