//! Repository search against the code-host REST API, with a quality
//! filter and a per-run call budget for the rate-limited search
//! endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::state::ResearchResult;
use crate::util::clip;

use super::{RateLimiter, SourceFetcher, sources};

const SEARCH_URL: &str = "https://api.github.com/search/repositories";
const MIN_STARS: u64 = 10;
const MAX_RESULTS: usize = 3;
// The unauthenticated search endpoint allows 10 requests per minute.
const CALL_BUDGET: u32 = 8;

pub struct GithubFetcher {
    client: reqwest::Client,
    token: Option<String>,
    limiter: RateLimiter,
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Deserialize)]
struct Repo {
    full_name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    fork: bool,
}

impl GithubFetcher {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            limiter: RateLimiter::new(CALL_BUDGET),
        }
    }
}

#[async_trait]
impl SourceFetcher for GithubFetcher {
    fn name(&self) -> &'static str {
        sources::GITHUB
    }

    async fn fetch(&self, query: &str) -> Vec<ResearchResult> {
        if !self.limiter.try_acquire() {
            warn!("github search call budget exhausted for this run");
            return Vec::new();
        }

        let url = format!(
            "{}?q={}&sort=stars&order=desc&per_page=10",
            SEARCH_URL,
            urlencoding::encode(query)
        );
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "blog-pipeline")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let body: SearchBody = match request.send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "github search response unparseable");
                    return Vec::new();
                }
            },
            Ok(response) => {
                warn!(status = %response.status(), "github search returned an error status");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "github search request failed");
                return Vec::new();
            }
        };

        body.items
            .into_iter()
            .filter(should_include_repo)
            .take(MAX_RESULTS)
            .map(|repo| {
                let description = repo.description.unwrap_or_default();
                ResearchResult {
                    title: repo.full_name,
                    url: Some(repo.html_url),
                    content: clip(&description, 200).to_string(),
                    summary: None,
                    metadata: [
                        ("stars".to_string(), json!(repo.stargazers_count)),
                        ("language".to_string(), json!(repo.language)),
                        ("updated".to_string(), json!(repo.updated_at)),
                    ]
                    .into_iter()
                    .collect(),
                }
            })
            .collect()
    }
}

/// Quality gate: skip archived repos, starless forks, repos without a
/// description, and anything below the star floor.
fn should_include_repo(repo: &Repo) -> bool {
    if repo.archived {
        return false;
    }
    if repo.fork && repo.stargazers_count < 100 {
        return false;
    }
    if repo.description.as_deref().unwrap_or("").is_empty() {
        return false;
    }
    repo.stargazers_count >= MIN_STARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(stars: u64, archived: bool, fork: bool, description: Option<&str>) -> Repo {
        Repo {
            full_name: "owner/repo".to_string(),
            html_url: "https://github.com/owner/repo".to_string(),
            description: description.map(str::to_string),
            stargazers_count: stars,
            language: Some("Rust".to_string()),
            updated_at: None,
            archived,
            fork,
        }
    }

    #[test]
    fn quality_filter() {
        assert!(should_include_repo(&repo(500, false, false, Some("useful"))));
        assert!(!should_include_repo(&repo(500, true, false, Some("archived"))));
        assert!(!should_include_repo(&repo(50, false, true, Some("small fork"))));
        assert!(should_include_repo(&repo(5000, false, true, Some("famous fork"))));
        assert!(!should_include_repo(&repo(500, false, false, None)));
        assert!(!should_include_repo(&repo(3, false, false, Some("tiny"))));
    }
}
