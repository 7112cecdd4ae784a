//! Academic-paper search against the arXiv Atom feed.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::state::ResearchResult;
use crate::util::clip;

use super::{SourceFetcher, sources};

const QUERY_URL: &str = "http://export.arxiv.org/api/query";
const MAX_RESULTS: usize = 3;

pub struct ArxivFetcher {
    client: reqwest::Client,
}

impl ArxivFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ArxivFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for ArxivFetcher {
    fn name(&self) -> &'static str {
        sources::ARXIV
    }

    async fn fetch(&self, query: &str) -> Vec<ResearchResult> {
        let url = format!(
            "{}?search_query=all:{}&start=0&max_results={}",
            QUERY_URL,
            urlencoding::encode(query),
            MAX_RESULTS
        );

        let feed = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "arxiv response body unreadable");
                    return Vec::new();
                }
            },
            Ok(response) => {
                warn!(status = %response.status(), "arxiv search returned an error status");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "arxiv search request failed");
                return Vec::new();
            }
        };

        parse_atom_feed(&feed)
    }
}

/// Pull the fields this pipeline needs out of the Atom feed. The feed
/// structure is flat enough that tag scanning beats a full XML stack.
fn parse_atom_feed(feed: &str) -> Vec<ResearchResult> {
    let mut results = Vec::new();

    for entry in feed.split("<entry>").skip(1) {
        let Some(title) = extract_tag(entry, "title") else {
            continue;
        };
        let abstract_text = extract_tag(entry, "summary").unwrap_or_default();
        let url = extract_tag(entry, "id");
        let published = extract_tag(entry, "published").unwrap_or_default();
        let authors = extract_all_tags(entry, "name");

        results.push(ResearchResult {
            title: normalize_whitespace(&title),
            url,
            content: clip(&abstract_text, 500).to_string(),
            summary: Some(clip(&abstract_text, 300).to_string()),
            metadata: [
                ("authors".to_string(), json!(authors)),
                ("published".to_string(), json!(published)),
            ]
            .into_iter()
            .collect(),
        });
    }

    results
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

fn extract_all_tags(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        values.push(after[..end].trim().to_string());
        rest = &after[end + close.len()..];
    }
    values
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
