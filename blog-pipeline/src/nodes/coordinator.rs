//! Research coordination: decide whether to research at all, generate
//! focused queries, and build the prioritized execution plan.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use stategraph::{Node, Result};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::generation::{Completion, Role, TextGenerator};
use crate::research::sources;
use crate::state::{Action, PipelineState, PlannedQuery, ResearchPlan};
use crate::util::{clip, extract_json_object};

use super::ids;

const DEFAULT_QUERIES: [&str; 2] = ["technical documentation", "best practices"];
const DEFAULT_SOURCES: [&str; 2] = [sources::ARXIV, sources::WEB];

const CODE_FLAVORED: [&str; 6] = [
    "library",
    "framework",
    "package",
    "implementation",
    "tool",
    "sdk",
];
const PAPER_FLAVORED: [&str; 4] = ["paper", "research", "study", "algorithm"];

pub struct ResearchCoordinatorNode {
    generator: Arc<dyn TextGenerator>,
    config: Arc<PipelineConfig>,
}

#[derive(Deserialize)]
struct QueriesResponse {
    #[serde(default)]
    queries: Vec<String>,
}

impl ResearchCoordinatorNode {
    pub fn new(generator: Arc<dyn TextGenerator>, config: Arc<PipelineConfig>) -> Self {
        Self { generator, config }
    }

    /// Ask the researcher model for focused queries. Any call or parse
    /// failure falls back to the fixed default query list.
    async fn generate_queries(&self, state: &PipelineState) -> (Vec<String>, Option<Completion>) {
        let summary = state.content_summary.as_deref().unwrap_or_default();
        let focus = state
            .research_focus
            .as_deref()
            .unwrap_or("technical documentation");
        let prompt = format!(
            "Analyze this technical content and generate {} focused research queries:\n\n\
             CONTENT:\n{}\n\n\
             USER RESEARCH FOCUS: {focus}\n\n\
             Respond with JSON only:\n\
             {{\"queries\": [\"specific technical concept to research\", \"related tools or frameworks\", \"best practices or implementation examples\"]}}",
            self.config.research_query_count,
            clip(summary, 1500),
        );

        let completion = match self
            .generator
            .generate(
                "You are a research strategist. Create focused, actionable research queries. Output valid JSON only.",
                &prompt,
                Role::Researcher,
            )
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "query generation unavailable, using defaults");
                return (default_queries(), None);
            }
        };

        let queries = extract_json_object(&completion.text)
            .and_then(|json| serde_json::from_str::<QueriesResponse>(json).ok())
            .map(|parsed| parsed.queries)
            .filter(|queries| !queries.is_empty())
            .unwrap_or_else(|| {
                warn!("query generation returned unusable output, using defaults");
                default_queries()
            });

        let queries = queries
            .into_iter()
            .take(self.config.research_query_count)
            .collect();
        (queries, Some(completion))
    }
}

fn default_queries() -> Vec<String> {
    DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()
}

#[async_trait]
impl Node<PipelineState> for ResearchCoordinatorNode {
    fn id(&self) -> &str {
        ids::RESEARCH_COORDINATOR
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        // Budget guard: near the token ceiling, or with nothing to
        // research, go straight to structuring.
        let total_tokens = state.total_tokens();
        if total_tokens > self.config.research_token_ceiling {
            info!(total_tokens, "token ceiling reached, skipping research");
            return Ok(state
                .update()
                .next_action(Action::BlogStructuring)
                .finish());
        }
        if state
            .content_summary
            .as_deref()
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            info!("no content summary available, skipping research");
            return Ok(state
                .update()
                .next_action(Action::BlogStructuring)
                .finish());
        }

        let (queries, completion) = self.generate_queries(state).await;
        info!(count = queries.len(), "generated research queries");
        let plan = build_plan(&queries, &state.research_sources);

        let mut update = state
            .update()
            .research_queries(queries)
            .research_plan(plan)
            .next_action(Action::ConductResearch);
        if let Some(completion) = completion {
            update = update.record_usage(&completion.model, &completion.usage);
        }
        Ok(update.finish())
    }
}

/// Bucket queries by position (first = high, second = medium, rest =
/// low) and assign each a source subset by keyword flavor, intersected
/// with the user-selected set. Unmatched queries get the full set.
fn build_plan(queries: &[String], selected_sources: &[String]) -> ResearchPlan {
    let selected: Vec<String> = if selected_sources.is_empty() {
        DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()
    } else {
        selected_sources.to_vec()
    };

    let mut plan = ResearchPlan::default();
    for (index, query) in queries.iter().enumerate() {
        let planned = PlannedQuery {
            query: query.clone(),
            sources: assign_sources(query, &selected),
        };
        match index {
            0 => plan.high.push(planned),
            1 => plan.medium.push(planned),
            _ => plan.low.push(planned),
        }
    }
    plan
}

fn assign_sources(query: &str, selected: &[String]) -> Vec<String> {
    let lowered = query.to_lowercase();

    let preferred: Option<[&str; 2]> = if CODE_FLAVORED.iter().any(|kw| lowered.contains(kw)) {
        Some([sources::GITHUB, sources::WEB])
    } else if PAPER_FLAVORED.iter().any(|kw| lowered.contains(kw)) {
        Some([sources::ARXIV, sources::WEB])
    } else {
        None
    };

    if let Some(preferred) = preferred {
        let intersection: Vec<String> = preferred
            .iter()
            .filter(|source| selected.iter().any(|s| s == *source))
            .map(|s| s.to_string())
            .collect();
        if !intersection.is_empty() {
            return intersection;
        }
    }
    selected.to_vec()
}
