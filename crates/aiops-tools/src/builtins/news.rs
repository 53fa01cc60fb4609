//! News tool - headline search with provider fallback
//!
//! Providers are tried in order: NewsAPI (only when `NEWSAPI_KEY` is set),
//! GDELT, then the Google News RSS feed. The payload records which providers
//! failed before the one that answered.

use crate::error::{FailureKind, ToolFailure};
use crate::http::{fetch_json, fetch_text};
use crate::registry::{CapabilityDescriptor, Tool};
use aiops_llm::util::mask_api_key;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// NewsAPI base URL
pub const NEWSAPI_BASE: &str = "https://newsapi.org";
/// GDELT base URL
pub const GDELT_BASE: &str = "https://api.gdeltproject.org";
/// Google News base URL
pub const GOOGLE_NEWS_BASE: &str = "https://news.google.com";

const DEFAULT_TOP_N: u64 = 5;

#[derive(Debug, Clone, Copy)]
enum Provider {
    NewsApi,
    Gdelt,
    GoogleNewsRss,
}

impl Provider {
    fn as_str(self) -> &'static str {
        match self {
            Self::NewsApi => "newsapi",
            Self::Gdelt => "gdelt",
            Self::GoogleNewsRss => "googlenews_rss",
        }
    }
}

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<item>(.*?)</item>").expect("ITEM_RE is a compile-time constant"));
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("TITLE_RE is a compile-time constant")
});
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<link[^>]*>(.*?)</link>").expect("LINK_RE is a compile-time constant")
});
static PUB_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<pubDate[^>]*>(.*?)</pubDate>").expect("PUB_DATE_RE is a compile-time constant")
});
static SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<source[^>]*>(.*?)</source>").expect("SOURCE_RE is a compile-time constant")
});

/// News adapter configuration
#[derive(Clone)]
pub struct NewsConfig {
    /// NewsAPI key (None = skip NewsAPI)
    pub newsapi_key: Option<String>,
    /// NewsAPI base URL
    pub newsapi_base: String,
    /// GDELT base URL
    pub gdelt_base: String,
    /// Google News base URL
    pub rss_base: String,
}

impl fmt::Debug for NewsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsConfig")
            .field("newsapi_key", &self.newsapi_key.as_deref().map(mask_api_key))
            .field("newsapi_base", &self.newsapi_base)
            .field("gdelt_base", &self.gdelt_base)
            .field("rss_base", &self.rss_base)
            .finish()
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            newsapi_key: None,
            newsapi_base: NEWSAPI_BASE.to_string(),
            gdelt_base: GDELT_BASE.to_string(),
            rss_base: GOOGLE_NEWS_BASE.to_string(),
        }
    }
}

impl NewsConfig {
    /// Read `NEWSAPI_KEY` from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            newsapi_key: std::env::var("NEWSAPI_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }

    /// Point every provider at one base URL (mock servers)
    #[must_use]
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.newsapi_base = base.clone();
        self.gdelt_base = base.clone();
        self.rss_base = base;
        self
    }
}

/// Tool for news headline search
pub struct NewsSearchTool {
    descriptor: CapabilityDescriptor,
    client: Client,
    config: NewsConfig,
}

impl NewsSearchTool {
    /// Create a new news search tool
    #[must_use]
    pub fn new(client: Client, config: NewsConfig) -> Self {
        let article = json!({
            "type": "object",
            "properties": {
                "title": {"type": ["string", "null"]},
                "source": {"type": ["string", "null"]},
                "url": {"type": ["string", "null"]},
                "published_at": {"type": ["string", "null"]}
            }
        });
        let descriptor = CapabilityDescriptor::new(
            "news_search",
            "Search recent news headlines for a topic",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Topic to search, e.g. 'artificial intelligence'"
                },
                "top_n": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Number of headlines to return (default 5)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }))
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "provider": {"type": "string", "enum": ["newsapi", "gdelt", "googlenews_rss"]},
                "articles": {"type": "array", "items": article},
                "fallback_trail": {"type": "array"}
            },
            "required": ["query", "provider", "articles"]
        }));

        Self {
            descriptor,
            client,
            config,
        }
    }

    async fn newsapi(&self, key: &str, query: &str, top_n: u64) -> Result<Vec<Value>, ToolFailure> {
        let data = fetch_json(
            "newsapi",
            self.client
                .get(format!("{}/v2/everything", self.config.newsapi_base))
                .header("X-Api-Key", key)
                .query(&[
                    ("q", query.to_string()),
                    ("pageSize", top_n.to_string()),
                    ("sortBy", "publishedAt".to_string()),
                    ("language", "en".to_string()),
                ]),
        )
        .await?;

        // NewsAPI may answer 200 with an error document
        if data["status"].as_str() != Some("ok") {
            let code = data["code"].as_str().unwrap_or("unknown");
            return Err(if code == "rateLimited" {
                ToolFailure::rate_limited("newsapi rate limited")
            } else {
                ToolFailure::malformed(format!("newsapi returned error status: {}", code))
            });
        }

        Ok(data["articles"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .take(top_n as usize)
            .map(|a| {
                json!({
                    "title": a["title"].as_str(),
                    "source": a["source"]["name"].as_str(),
                    "url": a["url"].as_str(),
                    "published_at": a["publishedAt"].as_str(),
                })
            })
            .collect())
    }

    async fn gdelt(&self, query: &str, top_n: u64) -> Result<Vec<Value>, ToolFailure> {
        let data = fetch_json(
            "gdelt",
            self.client
                .get(format!("{}/api/v2/doc/doc", self.config.gdelt_base))
                .query(&[
                    ("query", query.to_string()),
                    ("mode", "ArtList".to_string()),
                    ("format", "json".to_string()),
                    ("maxrecords", top_n.to_string()),
                    ("sort", "HybridRel".to_string()),
                ]),
        )
        .await?;

        Ok(data["articles"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .take(top_n as usize)
            .map(|a| {
                json!({
                    "title": a["title"].as_str(),
                    "source": a["domain"].as_str().or(a["sourcecountry"].as_str()),
                    "url": a["url"].as_str(),
                    "published_at": a["seendate"].as_str(),
                })
            })
            .collect())
    }

    async fn google_news_rss(&self, query: &str, top_n: u64) -> Result<Vec<Value>, ToolFailure> {
        let xml = fetch_text(
            "googlenews_rss",
            self.client
                .get(format!("{}/rss/search", self.config.rss_base))
                .header("Accept", "application/rss+xml, application/xml;q=0.9, */*;q=0.8")
                .query(&[("q", query), ("hl", "en-US"), ("gl", "US"), ("ceid", "US:en")]),
        )
        .await?;

        if !xml.contains("<rss") && !xml.contains("<channel") {
            return Err(ToolFailure::malformed("google news returned a non-RSS body"));
        }
        Ok(parse_rss_items(&xml, top_n as usize))
    }
}

/// Parse `<item>` entries out of an RSS document
fn parse_rss_items(xml: &str, max_items: usize) -> Vec<Value> {
    ITEM_RE
        .captures_iter(xml)
        .take(max_items)
        .map(|cap| {
            let item = cap.get(1).map_or("", |m| m.as_str());
            json!({
                "title": tag_text(&TITLE_RE, item),
                "source": tag_text(&SOURCE_RE, item),
                "url": tag_text(&LINK_RE, item),
                "published_at": tag_text(&PUB_DATE_RE, item),
            })
        })
        .collect()
}

fn tag_text(re: &Regex, item: &str) -> Option<String> {
    let raw = re.captures(item)?.get(1)?.as_str().trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    let text = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait::async_trait]
impl Tool for NewsSearchTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolFailure> {
        let query = args["query"].as_str().unwrap_or_default().trim();
        let top_n = args["top_n"].as_u64().unwrap_or(DEFAULT_TOP_N).clamp(1, 20);

        let mut chain = Vec::with_capacity(3);
        if self.config.newsapi_key.is_some() {
            chain.push(Provider::NewsApi);
        }
        chain.extend([Provider::Gdelt, Provider::GoogleNewsRss]);

        let mut trail: Vec<Value> = Vec::new();
        let mut last_failure: Option<ToolFailure> = None;

        for provider in chain {
            let result = match provider {
                Provider::NewsApi => {
                    let key = self.config.newsapi_key.as_deref().unwrap_or_default();
                    self.newsapi(key, query, top_n).await
                }
                Provider::Gdelt => self.gdelt(query, top_n).await,
                Provider::GoogleNewsRss => self.google_news_rss(query, top_n).await,
            };

            match result {
                Ok(articles) => {
                    debug!(provider = provider.as_str(), count = articles.len(), "News resolved");
                    return Ok(json!({
                        "query": query,
                        "provider": provider.as_str(),
                        "articles": articles,
                        "fallback_trail": trail,
                    }));
                }
                Err(failure) => {
                    warn!(provider = provider.as_str(), error = %failure, "News provider failed");
                    trail.push(json!({"provider": provider.as_str(), "error": failure.message}));
                    last_failure = Some(failure);
                }
            }
        }

        let detail = trail
            .iter()
            .filter_map(|t| Some(format!("{}: {}", t["provider"].as_str()?, t["error"].as_str()?)))
            .collect::<Vec<_>>()
            .join(" | ");
        let kind = last_failure.map_or(FailureKind::UpstreamUnavailable, |f| f.kind);
        Err(ToolFailure::new(kind, detail))
    }
}
