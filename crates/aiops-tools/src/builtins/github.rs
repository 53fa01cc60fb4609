//! GitHub tool - public repository search

use crate::error::ToolFailure;
use crate::http::{map_status, map_transport, read_body};
use crate::registry::{CapabilityDescriptor, Tool};
use aiops_llm::util::mask_api_key;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

/// GitHub REST API base URL
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Default number of repositories returned
const DEFAULT_TOP_N: u64 = 5;

/// GitHub adapter configuration
#[derive(Clone)]
pub struct GitHubConfig {
    /// API base URL
    pub base_url: String,
    /// Optional token (raises the rate limit)
    pub token: Option<String>,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_deref().map(mask_api_key))
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: GITHUB_API_BASE.to_string(),
            token: None,
        }
    }
}

impl GitHubConfig {
    /// Read `GITHUB_TOKEN` from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            ..Self::default()
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    total_count: u64,
    #[serde(default)]
    items: Vec<RepoItem>,
}

#[derive(Deserialize)]
struct RepoItem {
    name: String,
    full_name: String,
    #[serde(default)]
    stargazers_count: u64,
    description: Option<String>,
    html_url: String,
    language: Option<String>,
}

/// Tool for GitHub repository search
pub struct GitHubSearchTool {
    descriptor: CapabilityDescriptor,
    client: Client,
    config: GitHubConfig,
}

impl GitHubSearchTool {
    /// Create a new GitHub search tool
    #[must_use]
    pub fn new(client: Client, config: GitHubConfig) -> Self {
        let descriptor = CapabilityDescriptor::new(
            "github_repo_search",
            "Search public GitHub repositories, most starred first",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "GitHub search query, e.g. 'rust web framework'"
                },
                "top_n": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Number of repositories to return (default 5)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }))
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "total_count": {"type": "integer"},
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "full_name": {"type": "string"},
                            "stars": {"type": "integer"},
                            "description": {"type": ["string", "null"]},
                            "url": {"type": "string"},
                            "language": {"type": ["string", "null"]}
                        },
                        "required": ["name", "full_name", "stars", "url"]
                    }
                }
            },
            "required": ["query", "total_count", "items"]
        }));

        Self {
            descriptor,
            client,
            config,
        }
    }
}

#[async_trait::async_trait]
impl Tool for GitHubSearchTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolFailure> {
        let query = args["query"].as_str().unwrap_or_default().trim();
        let top_n = args["top_n"].as_u64().unwrap_or(DEFAULT_TOP_N).clamp(1, 20);

        debug!(query, top_n, "Searching GitHub repositories");

        let mut request = self
            .client
            .get(format!("{}/search/repositories", self.config.base_url))
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("q", query.to_string()),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", top_n.to_string()),
            ]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        // GitHub signals rate limiting with 403 and a message, not only 429
        let response = request
            .send()
            .await
            .map_err(|e| map_transport("github", &e))?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            if body.to_lowercase().contains("rate limit") {
                return Err(ToolFailure::rate_limited("github rate limit exceeded"));
            }
            return Err(map_status("github", status, &body));
        }

        let body = read_body("github", response).await?;
        let search: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| ToolFailure::malformed(format!("github search response: {}", e)))?;

        let items: Vec<Value> = search
            .items
            .into_iter()
            .take(top_n as usize)
            .map(|it| {
                json!({
                    "name": it.name,
                    "full_name": it.full_name,
                    "stars": it.stargazers_count,
                    "description": it.description,
                    "url": it.html_url,
                    "language": it.language,
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "total_count": search.total_count,
            "items": items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::http::build_client;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(server: &MockServer) -> GitHubSearchTool {
        GitHubSearchTool::new(
            build_client(Duration::from_secs(5)).unwrap(),
            GitHubConfig::default().with_base_url(server.uri()),
        )
    }

    #[test]
    fn test_config_debug_masks_token() {
        let config = GitHubConfig {
            token: Some("ghp_abcdefghijklmnopqrstuvwxyz".into()),
            ..GitHubConfig::default()
        };
        assert!(!format!("{:?}", config).contains("ijklmnop"));
    }

    #[tokio::test]
    async fn test_search_normalizes_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "rust web framework"))
            .and(query_param("sort", "stars"))
            .and(query_param("per_page", "2"))
            .and(header("accept", "application/vnd.github+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1234,
                "items": [
                    {
                        "name": "axum", "full_name": "tokio-rs/axum", "stargazers_count": 20000,
                        "description": "Ergonomic web framework", "html_url": "https://github.com/tokio-rs/axum",
                        "language": "Rust"
                    },
                    {
                        "name": "actix-web", "full_name": "actix/actix-web", "stargazers_count": 21000,
                        "description": null, "html_url": "https://github.com/actix/actix-web",
                        "language": null
                    }
                ]
            })))
            .mount(&server)
            .await;

        let payload = tool(&server)
            .execute(json!({"query": "rust web framework", "top_n": 2}))
            .await
            .unwrap();
        assert_eq!(payload["total_count"], 1234);
        assert_eq!(payload["items"][0]["full_name"], "tokio-rs/axum");
        assert_eq!(payload["items"][0]["stars"], 20000);
        assert!(payload["items"][1]["description"].is_null());
    }

    #[tokio::test]
    async fn test_forbidden_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(r#"{"message":"API rate limit exceeded for 1.2.3.4."}"#),
            )
            .mount(&server)
            .await;

        let failure = tool(&server)
            .execute(json!({"query": "tokio"}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert!(failure.is_transient());
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": "nope"})))
            .mount(&server)
            .await;

        let failure = tool(&server)
            .execute(json!({"query": "tokio"}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::MalformedUpstreamResponse);
    }
}
