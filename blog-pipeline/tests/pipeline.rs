//! Full workflow runs against mocked collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blog_pipeline::analysis::SimulatedChecker;
use blog_pipeline::config::PipelineConfig;
use blog_pipeline::extract::PlainTextExtractor;
use blog_pipeline::generation::{Completion, GenerationError, Role, TextGenerator, TokenUsage};
use blog_pipeline::pipeline::{Pipeline, PipelineInput};
use blog_pipeline::research::{ResearchExecutor, SourceFetcher};
use blog_pipeline::state::{CompositeScore, ResearchResult};
use blog_pipeline::workflow::WorkflowComponents;
use stategraph::GraphError;

/// Scripted generator: a rule fires when every needle appears in the
/// combined system + user prompt; the first matching rule wins.
struct ScriptedGenerator {
    rules: Vec<(Vec<&'static str>, &'static str)>,
    default: &'static str,
}

impl ScriptedGenerator {
    fn new(rules: Vec<(Vec<&'static str>, &'static str)>, default: &'static str) -> Arc<Self> {
        Arc::new(Self { rules, default })
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        _role: Role,
    ) -> Result<Completion, GenerationError> {
        let haystack = format!("{system}\n{prompt}");
        let text = self
            .rules
            .iter()
            .find(|(needles, _)| needles.iter().all(|needle| haystack.contains(needle)))
            .map(|(_, reply)| *reply)
            .unwrap_or(self.default);
        Ok(Completion {
            text: text.to_string(),
            model: "mock".to_string(),
            usage: TokenUsage {
                prompt: 10,
                completion: 20,
                total: 30,
            },
        })
    }
}

struct WebHitFetcher;

#[async_trait]
impl SourceFetcher for WebHitFetcher {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn fetch(&self, query: &str) -> Vec<ResearchResult> {
        vec![ResearchResult {
            title: format!("Finding about {query}"),
            url: Some(format!("https://example.com/{}", query.replace(' ', "-"))),
            content: "evidence from the web".to_string(),
            summary: None,
            metadata: Default::default(),
        }]
    }
}

const STRUCTURE: &str = r#"{"title": "Pipelines in Practice", "sections": [
  {"id": "1", "title": "Motivation", "description": "why this matters"},
  {"id": "2", "title": "Architecture", "description": "how it fits together"},
  {"id": "3", "title": "Tradeoffs", "description": "what it costs"},
  {"id": "4", "title": "Closing Takeaways", "description": "wrap up"}
]}"#;

fn happy_generator() -> Arc<ScriptedGenerator> {
    ScriptedGenerator::new(
        vec![
            (
                vec!["senior developer"],
                "Staged workflow turning repositories into publishable posts.",
            ),
            (
                vec!["research strategist"],
                r#"{"queries": ["workflow engine design", "pipeline library comparison", "orchestration trends"]}"#,
            ),
            (vec!["content strategist"], STRUCTURE),
            (
                vec!["plagiarism detection expert"],
                r#"{"risk_score": 5, "flagged_phrases": [], "confidence": "high"}"#,
            ),
            (vec!["demanding technical editor"], r#"{"score": 9, "weaknesses": []}"#),
            (vec!["rank research findings"], r#"{"picks": [1, 2]}"#),
            (
                vec!["engaging introduction"],
                "Every project eventually writes about itself.",
            ),
            (
                vec!["closing out a blog post"],
                "Ship the pipeline, then write about it.",
            ),
            (
                vec!["Section Title:** Motivation"],
                "Teams drown under manual publishing chores every single week.",
            ),
            (
                vec!["Section Title:** Architecture"],
                "Nodes route state through edges until a sink finishes execution.",
            ),
            (
                vec!["Section Title:** Tradeoffs"],
                "Budget guards bound spending while timeouts bound waiting.",
            ),
            (
                vec!["Section Title:** Closing Takeaways"],
                "Automation leaves reviewers doing only interesting judgment calls.",
            ),
        ],
        "generic fallback reply",
    )
}

fn build_pipeline(generator: Arc<dyn TextGenerator>, config: PipelineConfig) -> Pipeline {
    let config = Arc::new(config);
    let executor = Arc::new(ResearchExecutor::new(
        vec![Arc::new(WebHitFetcher)],
        Duration::from_secs(5),
    ));
    let components = WorkflowComponents {
        generator,
        checker: Arc::new(SimulatedChecker),
        extractor: Arc::new(PlainTextExtractor),
        executor,
        config: config.clone(),
    };
    Pipeline::with_components(config, &components).unwrap()
}

fn code_input() -> PipelineInput {
    PipelineInput {
        source_code: Some("fn main() { println!(\"hello\"); }".to_string()),
        research_sources: vec!["web".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn full_run_produces_an_assembled_document() {
    let pipeline = build_pipeline(happy_generator(), PipelineConfig::default());

    let final_state = pipeline.run(code_input()).await.unwrap();

    assert_eq!(final_state.sections.len(), 4);
    assert_eq!(final_state.section_drafts.len(), 4);
    assert_eq!(final_state.plagiarism_checks.len(), 4);

    let document = final_state.final_document.as_deref().unwrap();
    assert!(document.starts_with("# Pipelines in Practice"));
    assert!(document.contains("Every project eventually writes about itself."));
    assert!(document.contains("## Architecture"));
    assert!(document.contains("## References"));
    assert!(document.contains("https://example.com/"));
    // the outline already ends on a takeaways section, so no generated
    // conclusion is appended
    assert!(!document.contains("Ship the pipeline"));

    let summary = final_state.completion_summary.as_ref().unwrap();
    assert_eq!(summary.total_sections, 4);
    assert_eq!(summary.checked_sections, 4);
    assert_eq!(summary.sections_with_revisions, 0);

    // budget monotonicity over the whole run
    assert!(final_state.total_tokens() > 0);
    assert!(final_state.free_tier_credits <= 100);
    assert!(!final_state.content_fingerprints.is_empty());
}

#[tokio::test]
async fn identical_runs_produce_identical_states() {
    let pipeline = build_pipeline(happy_generator(), PipelineConfig::default());

    let first = pipeline.run(code_input()).await.unwrap();
    let second = pipeline.run(code_input()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn zero_credits_force_estimated_checks() {
    let config = PipelineConfig {
        free_tier_credits: 0,
        ..Default::default()
    };
    let pipeline = build_pipeline(happy_generator(), config);

    let final_state = pipeline.run(code_input()).await.unwrap();
    assert_eq!(final_state.free_tier_credits, 0);
    assert!(!final_state.plagiarism_checks.is_empty());
    for check in final_state.plagiarism_checks.values() {
        assert!(matches!(check.composite, CompositeScore::Estimated { .. }));
    }
}

#[tokio::test]
async fn always_flagged_content_halts_at_the_step_ceiling() {
    // Remove the per-section cap so only the global ceiling can stop
    // the rewrite cycle.
    let config = PipelineConfig {
        max_section_rewrites: 1_000_000,
        max_workflow_steps: 30,
        ..Default::default()
    };
    let generator = ScriptedGenerator::new(
        vec![
            (
                vec!["senior developer"],
                "Staged workflow turning repositories into publishable posts.",
            ),
            (
                vec!["research strategist"],
                r#"{"queries": ["workflow engine design"]}"#,
            ),
            (vec!["content strategist"], STRUCTURE),
            (
                vec!["plagiarism detection expert"],
                r#"{"risk_score": 99, "flagged_phrases": ["borrowed phrasing"], "confidence": "high"}"#,
            ),
            (vec!["demanding technical editor"], r#"{"score": 9, "weaknesses": []}"#),
            (
                vec!["OUTPUT ONLY THE REVISED CONTENT"],
                "still the same reworded text",
            ),
        ],
        "a draft that always looks plagiarized",
    );
    let pipeline = build_pipeline(generator, config);

    let err = pipeline.run(code_input()).await.unwrap_err();
    assert!(matches!(
        err,
        GraphError::StepLimitExceeded { max_steps: 30, .. }
    ));
}

#[tokio::test]
async fn missing_inputs_fail_fast() {
    let pipeline = build_pipeline(happy_generator(), PipelineConfig::default());

    let err = pipeline.run(PipelineInput::default()).await.unwrap_err();
    assert!(matches!(err, GraphError::MissingInput(_)));
}

#[tokio::test]
async fn rewrite_cycle_converges_and_records_history() {
    // Every initial draft analyzes risky (85); each rewritten draft is
    // recognized by its wording and analyzes clean (10).
    let generator = ScriptedGenerator::new(
        vec![
            (
                vec!["senior developer"],
                "Staged workflow turning repositories into publishable posts.",
            ),
            (
                vec!["research strategist"],
                r#"{"queries": ["workflow engine design"]}"#,
            ),
            (vec!["content strategist"], STRUCTURE),
            (vec!["demanding technical editor"], r#"{"score": 9, "weaknesses": []}"#),
            (
                vec!["plagiarism detection expert", "Rephrased"],
                r#"{"risk_score": 10, "flagged_phrases": [], "confidence": "high"}"#,
            ),
            (
                vec!["plagiarism detection expert"],
                r#"{"risk_score": 85, "flagged_phrases": [], "confidence": "high"}"#,
            ),
            (
                vec!["OUTPUT ONLY THE REVISED CONTENT", "manual publishing chores"],
                "Rephrased motivation copy that energizes adoption quickly.",
            ),
            (
                vec!["OUTPUT ONLY THE REVISED CONTENT", "sink finishes execution"],
                "Rephrased architecture overview mapping node transitions clearly.",
            ),
            (
                vec!["OUTPUT ONLY THE REVISED CONTENT", "timeouts bound waiting"],
                "Rephrased tradeoff analysis weighing budgets against latency.",
            ),
            (
                vec!["OUTPUT ONLY THE REVISED CONTENT", "interesting judgment calls"],
                "Rephrased takeaway reminding readers to automate reviews.",
            ),
            (
                vec!["Section Title:** Motivation"],
                "Teams drown under manual publishing chores every single week.",
            ),
            (
                vec!["Section Title:** Architecture"],
                "Nodes route state through edges until a sink finishes execution.",
            ),
            (
                vec!["Section Title:** Tradeoffs"],
                "Budget guards bound spending while timeouts bound waiting.",
            ),
            (
                vec!["Section Title:** Closing Takeaways"],
                "Automation leaves reviewers doing only interesting judgment calls.",
            ),
        ],
        "generic fallback reply",
    );
    let pipeline = build_pipeline(generator, PipelineConfig::default());

    let final_state = pipeline.run(code_input()).await.unwrap();

    // every section was rewritten exactly once and the run completed
    assert_eq!(final_state.section_drafts.len(), 4);
    assert_eq!(final_state.revision_history.len(), 4);
    for history in final_state.revision_history.values() {
        assert_eq!(history.len(), 1);
        assert!(history[0].feedback.contains("85"));
    }
    assert_eq!(
        final_state.section_drafts["1"],
        "Rephrased motivation copy that energizes adoption quickly."
    );
    let summary = final_state.completion_summary.unwrap();
    assert_eq!(summary.sections_with_revisions, 4);
    assert!(final_state.final_document.is_some());
}
