//! Reference text for a topic, fetched from Wikipedia
//!
//! The article is the factual grounding handed to the script writer. Only
//! the plain-text extract is used, cut to a fixed character budget.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::config::ReferenceConfig;
use crate::error::{CastError, CastResult};

/// Source of reference text for a topic
#[async_trait::async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Plain text for `title`, at most `max_chars` characters long
    async fn fetch(&self, title: &str, max_chars: usize) -> CastResult<String>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
}

/// English Wikipedia through the MediaWiki `extracts` API
#[derive(Debug)]
pub struct WikipediaSource {
    api_url: String,
    min_chars: usize,
    client: HttpClient,
}

impl WikipediaSource {
    pub fn new(config: &ReferenceConfig) -> CastResult<Self> {
        let client = HttpClient::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_url: config.api_url.clone(),
            min_chars: config.min_chars,
            client,
        })
    }
}

#[async_trait::async_trait]
impl ReferenceSource for WikipediaSource {
    async fn fetch(&self, title: &str, max_chars: usize) -> CastResult<String> {
        let title = title.trim();
        log::info!("Fetching Wikipedia article: {}", title);

        if title.is_empty() {
            return Err(CastError::NotFound {
                title: title.to_string(),
            });
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CastError::Provider {
                provider: "wikipedia",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = response.json().await?;
        let extract = parsed
            .query
            .and_then(|q| q.pages.into_iter().next())
            .filter(|page| !page.missing && !page.invalid)
            .and_then(|page| page.extract)
            .ok_or_else(|| CastError::NotFound {
                title: title.to_string(),
            })?;

        let text: String = extract.trim().chars().take(max_chars).collect();
        let length = text.chars().count();
        if length < self.min_chars {
            return Err(CastError::TooShort {
                title: title.to_string(),
                length,
                minimum: self.min_chars,
            });
        }

        log::info!("Fetched article '{}': {} characters", title, length);
        Ok(text)
    }
}
