//! Research fetch boundary and backends. A fetcher maps a query to a
//! list of normalized [`ResearchResult`]s and never lets an error
//! escape its boundary; failures degrade to an empty list.

pub mod arxiv;
pub mod executor;
pub mod github;
pub mod organizer;
pub mod substack;
pub mod web;

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::state::ResearchResult;

pub use arxiv::ArxivFetcher;
pub use executor::ResearchExecutor;
pub use github::GithubFetcher;
pub use substack::SubstackFetcher;
pub use web::WebFetcher;

/// Canonical source names used in plans, fetcher registries and the
/// merged research context.
pub mod sources {
    pub const ARXIV: &str = "arxiv";
    pub const WEB: &str = "web";
    pub const GITHUB: &str = "github";
    pub const SUBSTACK: &str = "substack";
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch results for one query. Must not raise past this boundary;
    /// internal failures return an empty list.
    async fn fetch(&self, query: &str) -> Vec<ResearchResult>;
}

/// Per-run call budget for rate-limited backends. Owned by the fetcher
/// that needs it; there is no process-wide counter, so concurrent
/// pipeline runs do not interfere.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    used: AtomicU32,
}

impl RateLimiter {
    pub fn new(max_calls: u32) -> Self {
        Self {
            max_calls,
            used: AtomicU32::new(0),
        }
    }

    /// Claim one call slot. Returns false once the budget is spent.
    pub fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.max_calls).then_some(used + 1)
            })
            .is_ok()
    }
}
