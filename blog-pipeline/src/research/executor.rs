//! Concurrent fan-out of one query across its assigned sources, with a
//! bounded worker pool, an independent timeout per fetch, and
//! partial-failure isolation: a failed, panicked or timed-out fetch
//! contributes an empty entry for its source and never disturbs its
//! siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::state::ResearchResult;

use super::SourceFetcher;

const MAX_CONCURRENT_FETCHES: usize = 3;

pub struct ResearchExecutor {
    fetchers: BTreeMap<&'static str, Arc<dyn SourceFetcher>>,
    timeout: Duration,
}

impl ResearchExecutor {
    pub fn new(fetchers: Vec<Arc<dyn SourceFetcher>>, timeout: Duration) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.name(), fetcher))
            .collect();
        Self { fetchers, timeout }
    }

    /// Run one query against every requested source. The returned map
    /// contains an entry for each requested source, empty where the
    /// fetch produced nothing or failed.
    pub async fn run_query(
        &self,
        query: &str,
        sources: &[String],
    ) -> BTreeMap<String, Vec<ResearchResult>> {
        let mut results: BTreeMap<String, Vec<ResearchResult>> = sources
            .iter()
            .map(|source| (source.clone(), Vec::new()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES));
        let mut set = JoinSet::new();

        for source in sources {
            let Some(fetcher) = self.fetchers.get(source.as_str()) else {
                warn!(source = %source, "no fetcher registered for source");
                continue;
            };
            let fetcher = Arc::clone(fetcher);
            let query = query.to_string();
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;

            set.spawn(async move {
                let name = fetcher.name().to_string();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (name, Vec::new()),
                };
                match tokio::time::timeout(timeout, fetcher.fetch(&query)).await {
                    Ok(items) => (name, items),
                    Err(_) => {
                        warn!(source = %name, "research fetch timed out");
                        (name, Vec::new())
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((source, items)) => {
                    info!(source = %source, count = items.len(), query = %query, "research fetch finished");
                    results.insert(source, items);
                }
                // A panicked fetch keeps its pre-seeded empty entry.
                Err(e) => error!(error = %e, "research fetch task failed"),
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFetcher {
        name: &'static str,
        titles: Vec<&'static str>,
    }

    #[async_trait]
    impl SourceFetcher for StaticFetcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _query: &str) -> Vec<ResearchResult> {
            self.titles
                .iter()
                .map(|title| ResearchResult {
                    title: title.to_string(),
                    url: None,
                    content: String::new(),
                    summary: None,
                    metadata: Default::default(),
                })
                .collect()
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl SourceFetcher for PanickingFetcher {
        fn name(&self) -> &'static str {
            "github"
        }

        async fn fetch(&self, _query: &str) -> Vec<ResearchResult> {
            panic!("backend blew up");
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl SourceFetcher for SlowFetcher {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch(&self, _query: &str) -> Vec<ResearchResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Vec::new()
        }
    }

    fn sources(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn one_failing_source_does_not_disturb_siblings() {
        let executor = ResearchExecutor::new(
            vec![
                Arc::new(StaticFetcher {
                    name: "web",
                    titles: vec!["w1", "w2"],
                }),
                Arc::new(StaticFetcher {
                    name: "arxiv",
                    titles: vec!["a1"],
                }),
                Arc::new(PanickingFetcher),
            ],
            Duration::from_secs(5),
        );

        let results = executor
            .run_query("query", &sources(&["web", "arxiv", "github"]))
            .await;

        assert_eq!(results["web"].len(), 2);
        assert_eq!(results["arxiv"].len(), 1);
        // present but empty, not missing
        assert!(results.contains_key("github"));
        assert!(results["github"].is_empty());
    }

    #[tokio::test]
    async fn timed_out_fetch_degrades_to_empty() {
        let executor = ResearchExecutor::new(
            vec![
                Arc::new(SlowFetcher),
                Arc::new(StaticFetcher {
                    name: "web",
                    titles: vec!["w1"],
                }),
            ],
            Duration::from_millis(50),
        );

        let results = executor.run_query("query", &sources(&["slow", "web"])).await;
        assert!(results["slow"].is_empty());
        assert_eq!(results["web"].len(), 1);
    }

    #[tokio::test]
    async fn unregistered_source_stays_empty() {
        let executor = ResearchExecutor::new(vec![], Duration::from_secs(1));
        let results = executor.run_query("query", &sources(&["nowhere"])).await;
        assert!(results["nowhere"].is_empty());
    }
}
