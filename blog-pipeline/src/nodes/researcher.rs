//! Parallel research execution: fan each planned query out across its
//! sources, re-check the token budget between queries, and merge
//! whatever was gathered. Partial results are always kept.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use stategraph::{Node, Result};
use tracing::info;

use crate::config::PipelineConfig;
use crate::research::{ResearchExecutor, organizer};
use crate::state::{Action, PipelineState};

use super::ids;

const MEDIUM_PRIORITY_LIMIT: usize = 2;

pub struct ConductResearchNode {
    executor: Arc<ResearchExecutor>,
    config: Arc<PipelineConfig>,
}

impl ConductResearchNode {
    pub fn new(executor: Arc<ResearchExecutor>, config: Arc<PipelineConfig>) -> Self {
        Self { executor, config }
    }

    fn over_budget(&self, state: &PipelineState) -> bool {
        state.total_tokens() > self.config.research_token_hard_stop
    }
}

#[async_trait]
impl Node<PipelineState> for ConductResearchNode {
    fn id(&self) -> &str {
        ids::CONDUCT_RESEARCH
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        if state.research_queries.is_empty() {
            return Ok(state
                .update()
                .next_action(Action::BlogStructuring)
                .finish());
        }

        let plan = state.research_plan.clone().unwrap_or_default();
        let mut all_results = BTreeMap::new();

        for planned in &plan.high {
            let per_source = self
                .executor
                .run_query(&planned.query, &planned.sources)
                .await;
            all_results.insert(planned.query.clone(), per_source);
            if self.over_budget(state) {
                info!("token budget exhausted during high-priority research");
                break;
            }
        }

        if !self.over_budget(state) {
            for planned in plan.medium.iter().take(MEDIUM_PRIORITY_LIMIT) {
                let per_source = self
                    .executor
                    .run_query(&planned.query, &planned.sources)
                    .await;
                all_results.insert(planned.query.clone(), per_source);
                if self.over_budget(state) {
                    break;
                }
            }
        }
        // Low-priority queries are never executed automatically.

        let executed = all_results.len();
        let research = organizer::organize(all_results, &state.research);
        info!(
            executed,
            sources = research.by_source.len(),
            citations = research.citations.len(),
            "research merged"
        );

        Ok(state
            .update()
            .research(research)
            .next_action(Action::BlogStructuring)
            .finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::SourceFetcher;
    use crate::state::{PlannedQuery, ResearchPlan, ResearchResult};
    use std::time::Duration;

    struct OneHitFetcher(&'static str);

    #[async_trait]
    impl SourceFetcher for OneHitFetcher {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn fetch(&self, query: &str) -> Vec<ResearchResult> {
            vec![ResearchResult {
                title: format!("{} result for {query}", self.0),
                url: Some(format!("http://example.com/{}/{query}", self.0)),
                content: "body".to_string(),
                summary: None,
                metadata: Default::default(),
            }]
        }
    }

    fn executor() -> Arc<ResearchExecutor> {
        Arc::new(ResearchExecutor::new(
            vec![Arc::new(OneHitFetcher("web")), Arc::new(OneHitFetcher("arxiv"))],
            Duration::from_secs(5),
        ))
    }

    fn planned(query: &str, sources: &[&str]) -> PlannedQuery {
        PlannedQuery {
            query: query.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn executes_high_and_capped_medium_priority() {
        let node = ConductResearchNode::new(executor(), Arc::new(PipelineConfig::default()));
        let mut state = PipelineState::new(100);
        state.research_queries = vec!["q1".to_string()];
        state.research_plan = Some(ResearchPlan {
            high: vec![planned("q-high", &["web", "arxiv"])],
            medium: vec![
                planned("q-med-1", &["web"]),
                planned("q-med-2", &["web"]),
                planned("q-med-3", &["web"]),
            ],
            low: vec![planned("q-low", &["web"])],
        });

        let next = node.run(&state).await.unwrap();
        // high + 2 medium, low never runs
        assert_eq!(next.research.by_topic.len(), 3);
        assert!(next.research.by_topic.contains_key("q-high"));
        assert!(next.research.by_topic.contains_key("q-med-2"));
        assert!(!next.research.by_topic.contains_key("q-med-3"));
        assert!(!next.research.by_topic.contains_key("q-low"));
        assert_eq!(next.next_action, Action::BlogStructuring);
        // merged by source across queries
        assert_eq!(next.research.by_source["web"].len(), 3);
    }

    #[tokio::test]
    async fn over_budget_skips_medium_but_keeps_high_results() {
        let node = ConductResearchNode::new(executor(), Arc::new(PipelineConfig::default()));
        let mut state = PipelineState::new(100);
        state.research_queries = vec!["q1".to_string()];
        state.token_usage.insert("m".to_string(), 960_000);
        state.research_plan = Some(ResearchPlan {
            high: vec![planned("q-high", &["web"])],
            medium: vec![planned("q-med", &["web"])],
            low: vec![],
        });

        let next = node.run(&state).await.unwrap();
        assert!(next.research.by_topic.contains_key("q-high"));
        assert!(!next.research.by_topic.contains_key("q-med"));
    }

    #[tokio::test]
    async fn no_queries_routes_straight_to_structuring() {
        let node = ConductResearchNode::new(executor(), Arc::new(PipelineConfig::default()));
        let state = PipelineState::new(100);
        let next = node.run(&state).await.unwrap();
        assert_eq!(next.next_action, Action::BlogStructuring);
        assert!(next.research.by_topic.is_empty());
    }
}
