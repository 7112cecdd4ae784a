//! Newsletter search. Uses the authenticated search API when a key is
//! configured, the public endpoint otherwise.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::state::ResearchResult;
use crate::util::clip;

use super::{SourceFetcher, sources};

const API_SEARCH_URL: &str = "https://api.substack.com/v1/search/posts";
const PUBLIC_SEARCH_URL: &str = "https://substack.com/api/v1/search/posts";
const MAX_RESULTS: usize = 3;

pub struct SubstackFetcher {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    canonical_url: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    post_date: Option<String>,
}

#[derive(Deserialize)]
struct Author {
    #[serde(default)]
    name: String,
}

impl SubstackFetcher {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl SourceFetcher for SubstackFetcher {
    fn name(&self) -> &'static str {
        sources::SUBSTACK
    }

    async fn fetch(&self, query: &str) -> Vec<ResearchResult> {
        let encoded = urlencoding::encode(query);
        let mut request = match &self.api_key {
            Some(key) => self
                .client
                .get(format!("{API_SEARCH_URL}?query={encoded}&limit={MAX_RESULTS}"))
                .bearer_auth(key),
            None => self
                .client
                .get(format!("{PUBLIC_SEARCH_URL}?query={encoded}")),
        };
        request = request.header("User-Agent", "blog-pipeline");

        let body: SearchBody = match request.send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "newsletter search response unparseable");
                    return Vec::new();
                }
            },
            Ok(response) => {
                warn!(status = %response.status(), "newsletter search returned an error status");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "newsletter search request failed");
                return Vec::new();
            }
        };

        body.posts
            .into_iter()
            .take(MAX_RESULTS)
            .filter(|post| !post.title.is_empty())
            .map(|post| ResearchResult {
                title: post.title,
                url: post.canonical_url,
                content: clip(&post.description, 200).to_string(),
                summary: None,
                metadata: [
                    (
                        "author".to_string(),
                        json!(post.author.map(|a| a.name).unwrap_or_default()),
                    ),
                    ("published".to_string(), json!(post.post_date)),
                ]
                .into_iter()
                .collect(),
            })
            .collect()
    }
}
