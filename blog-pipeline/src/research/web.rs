//! Web search through a Perplexity-style answer API. Without an API
//! key the fetcher degrades to empty results.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::state::ResearchResult;
use crate::util::clip;

use super::{SourceFetcher, sources};

const API_URL: &str = "https://api.perplexity.ai/chat/completions";

pub struct WebFetcher {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    choices: Vec<SearchChoice>,
}

#[derive(Deserialize)]
struct SearchChoice {
    message: SearchMessage,
}

#[derive(Deserialize)]
struct SearchMessage {
    #[serde(default)]
    content: String,
}

impl WebFetcher {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl SourceFetcher for WebFetcher {
    fn name(&self) -> &'static str {
        sources::WEB
    }

    async fn fetch(&self, query: &str) -> Vec<ResearchResult> {
        let Some(api_key) = &self.api_key else {
            return Vec::new();
        };

        let payload = json!({
            "model": "sonar",
            "messages": [
                {
                    "role": "system",
                    "content": "You are a research assistant. Provide accurate, recent information with sources. Focus on technical and programming topics."
                },
                {
                    "role": "user",
                    "content": format!(
                        "Search for: {query}. Provide 3-5 key findings with sources from the last 2 years. List each finding as a bullet and include URLs."
                    )
                }
            ],
            "max_tokens": 1000,
        });

        let response = match self
            .client
            .post(API_URL)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "web search returned an error status");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "web search request failed");
                return Vec::new();
            }
        };

        let body: SearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "web search response unparseable");
                return Vec::new();
            }
        };

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        parse_findings(&content)
    }
}

/// Turn a bulleted answer into structured results, one per bullet,
/// lifting the first URL found in each line.
fn parse_findings(content: &str) -> Vec<ResearchResult> {
    let mut results = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        let text = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| line.strip_prefix("• "));
        let Some(text) = text else { continue };
        if text.is_empty() {
            continue;
        }

        let url = extract_url(text);
        results.push(ResearchResult {
            title: clip(text, 80).trim_end().to_string(),
            url,
            content: text.to_string(),
            summary: None,
            metadata: Default::default(),
        });
    }

    results
}

fn extract_url(text: &str) -> Option<String> {
    let start = text.find("http")?;
    let tail = &text[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || matches!(c, ')' | ']' | '>' | '"'))
        .unwrap_or(tail.len());
    let url = tail[..end].trim_end_matches(['.', ',', ';']);
    (!url.is_empty()).then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_become_results_with_urls() {
        let content = "Key findings:\n\
                       - Rust adoption grew 40% (https://example.com/report).\n\
                       * Async ecosystems matured, see https://example.com/async\n\
                       not a bullet line";
        let results = parse_findings(content);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].url.as_deref(),
            Some("https://example.com/report")
        );
        assert_eq!(results[1].url.as_deref(), Some("https://example.com/async"));
    }

    #[tokio::test]
    async fn missing_key_yields_no_results() {
        let fetcher = WebFetcher::new(None);
        assert!(fetcher.fetch("anything").await.is_empty());
    }
}
