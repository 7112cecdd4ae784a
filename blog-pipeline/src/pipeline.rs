//! `Pipeline` facade: wires configuration and external collaborators
//! into the workflow graph and runs one state value to completion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stategraph::Graph;
use tracing::info;

use crate::analysis::SimulatedChecker;
use crate::config::PipelineConfig;
use crate::extract::PlainTextExtractor;
use crate::generation::{
    ChatCompletionsGenerator, FallbackGenerator, LocalGenerator, TextGenerator,
};
use crate::research::{
    ArxivFetcher, GithubFetcher, ResearchExecutor, SourceFetcher, SubstackFetcher, WebFetcher,
};
use crate::state::PipelineState;
use crate::workflow::{WorkflowComponents, build_workflow};

/// Caller-supplied inputs for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInput {
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub document_paths: Vec<String>,
    #[serde(default)]
    pub research_sources: Vec<String>,
    #[serde(default)]
    pub research_focus: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub custom_questions: Vec<String>,
}

pub struct Pipeline {
    graph: Arc<Graph<PipelineState>>,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    /// Wire the default collaborators: the local generation service
    /// (with the hosted fallback when a key is configured), the four
    /// research fetchers, and the simulated originality checker.
    pub fn new(config: PipelineConfig) -> stategraph::Result<Self> {
        let config = Arc::new(config);

        let mut providers: Vec<Arc<dyn TextGenerator>> =
            vec![Arc::new(LocalGenerator::new(&config))];
        if let Some(api_key) = &config.fallback_api_key {
            providers.push(Arc::new(ChatCompletionsGenerator::new(
                &config.fallback_base_url,
                api_key,
                &config.fallback_model,
            )));
        }
        let generator: Arc<dyn TextGenerator> = Arc::new(FallbackGenerator::new(providers));

        let fetchers: Vec<Arc<dyn SourceFetcher>> = vec![
            Arc::new(ArxivFetcher::new()),
            Arc::new(WebFetcher::new(config.perplexity_api_key.clone())),
            Arc::new(GithubFetcher::new(config.github_token.clone())),
            Arc::new(SubstackFetcher::new(config.substack_api_key.clone())),
        ];
        let executor = Arc::new(ResearchExecutor::new(fetchers, config.fetch_timeout));

        let components = WorkflowComponents {
            generator,
            checker: Arc::new(SimulatedChecker),
            extractor: Arc::new(PlainTextExtractor),
            executor,
            config: config.clone(),
        };
        Self::with_components(config, &components)
    }

    /// Build from explicit components. The seam tests and embedders use
    /// to substitute mocked collaborators.
    pub fn with_components(
        config: Arc<PipelineConfig>,
        components: &WorkflowComponents,
    ) -> stategraph::Result<Self> {
        let graph = Arc::new(build_workflow(components)?);
        Ok(Self { graph, config })
    }

    /// Run the full workflow for one input. Returns the final state or
    /// the first fatal error (missing inputs, unknown routing key, step
    /// ceiling).
    pub async fn run(&self, input: PipelineInput) -> stategraph::Result<PipelineState> {
        let state = self.initial_state(input);
        info!(max_steps = self.config.max_workflow_steps, "starting pipeline run");
        self.graph
            .run(state, self.config.max_workflow_steps)
            .await
    }

    fn initial_state(&self, input: PipelineInput) -> PipelineState {
        let mut state = PipelineState::new(self.config.free_tier_credits);
        state.source_code = input.source_code.filter(|code| !code.trim().is_empty());
        state.uploaded_files = input.document_paths;
        state.research_sources = input
            .research_sources
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        state.research_focus = input.research_focus;
        state.target_audience = input.target_audience;
        state.tone = input.tone;
        state.custom_questions = input.custom_questions;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_normalizes_sources_and_credits() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let input = PipelineInput {
            source_code: Some("fn main() {}".to_string()),
            research_sources: vec!["ArXiv".to_string(), "WEB".to_string()],
            ..Default::default()
        };
        let state = pipeline.initial_state(input);
        assert_eq!(state.free_tier_credits, 100);
        assert_eq!(state.research_sources, vec!["arxiv", "web"]);
        assert_eq!(state.next_action, crate::state::Action::ProcessInputs);
    }

    #[test]
    fn blank_source_code_counts_as_absent() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let input = PipelineInput {
            source_code: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(pipeline.initial_state(input).source_code.is_none());
    }
}
