//! `search_unsplash_photos` — photo search against the Unsplash API.
//!
//! Results are rendered as a plain-text gallery the presentation layer
//! shows verbatim.

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

use px_domain::config::UnsplashConfig;
use px_domain::tool::ToolDefinition;

use crate::registry::{ToolError, ToolExecutor};

pub const TOOL_NAME: &str = "search_unsplash_photos";

/// Subset of the Unsplash photo object that ends up in the output.
#[derive(Debug, Deserialize)]
pub struct Photo {
    pub id: String,
    pub created_at: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub alt_description: Option<String>,
    pub user: Photographer,
    pub urls: PhotoUrls,
    pub links: PhotoLinks,
}

#[derive(Debug, Deserialize)]
pub struct Photographer {
    pub username: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoUrls {
    pub full: String,
    pub regular: String,
    pub thumb: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoLinks {
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    #[serde(default)]
    pub results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<f64>,
}

pub struct UnsplashSearch {
    client: reqwest::Client,
    base_url: String,
    access_key: String,
    default_limit: u32,
    max_limit: u32,
}

impl UnsplashSearch {
    pub fn from_config(cfg: &UnsplashConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ToolError::Failed(format!("building HTTP client: {e}")))?;

        let access_key = std::env::var(&cfg.access_key_env).unwrap_or_else(|_| {
            tracing::warn!(
                env = %cfg.access_key_env,
                "Unsplash access key not set, using the public demo client id"
            );
            "demo".into()
        });

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            access_key,
            default_limit: cfg.default_limit,
            max_limit: cfg.max_limit,
        })
    }

    /// Clamp the requested limit into `1..=max_limit`.
    fn effective_limit(&self, requested: Option<f64>) -> u32 {
        match requested {
            Some(n) if n >= 1.0 => (n as u32).min(self.max_limit),
            _ => self.default_limit.min(self.max_limit),
        }
    }
}

#[async_trait::async_trait]
impl ToolExecutor for UnsplashSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.into(),
            description: "Search for Unsplash photos based on a query description. Returns a list \
                          of high-quality photos matching the search criteria."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query to find photos (e.g., 'modern kitchen designs', 'nature landscapes')"
                    },
                    "limit": {
                        "type": "number",
                        "description": format!(
                            "Maximum number of photos to return (default: {}, max: {})",
                            self.default_limit, self.max_limit
                        )
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: &Value) -> Result<String, ToolError> {
        let args: SearchInput = serde_json::from_value(input.clone())
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        let limit = self.effective_limit(args.limit);

        tracing::debug!(query = %args.query, limit, "unsplash search");

        let resp = self
            .client
            .get(format!("{}/search/photos", self.base_url))
            .query(&[
                ("query", args.query.as_str()),
                ("per_page", &limit.to_string()),
                ("client_id", self.access_key.as_str()),
            ])
            .header("Accept-Version", "v1")
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Error searching Unsplash photos: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::Failed(format!(
                "Unsplash API error ({}): {body}",
                status.as_u16()
            )));
        }

        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("Error searching Unsplash photos: {e}")))?;

        Ok(format_results(&args.query, &data))
    }
}

/// Render search results as the text block the client displays.
pub fn format_results(query: &str, data: &SearchResponse) -> String {
    if data.results.is_empty() {
        return format!("No photos found for query: \"{query}\"");
    }

    let photos: Vec<String> = data
        .results
        .iter()
        .enumerate()
        .map(|(i, photo)| {
            let description = photo
                .description
                .as_deref()
                .or(photo.alt_description.as_deref())
                .unwrap_or("No description");
            format!(
                "Photo {}:\n\
                 - ID: {}\n\
                 - Description: {}\n\
                 - Image URL: {}\n\
                 - Full Resolution: {}\n\
                 - Thumbnail: {}\n\
                 - Link: {}\n\
                 - Photographer: {} (@{})\n\
                 - Dimensions: {}x{}\n\
                 - Created: {}",
                i + 1,
                photo.id,
                description,
                photo.urls.regular,
                photo.urls.full,
                photo.urls.thumb,
                photo.links.html,
                photo.user.name,
                photo.user.username,
                photo.width,
                photo.height,
                photo.created_at,
            )
        })
        .collect();

    format!(
        "Found {} photos (total: {}) for query: \"{query}\"\n\n{}",
        data.results.len(),
        data.total,
        photos.join("\n\n")
    )
}
