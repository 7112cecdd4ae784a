//! Research synthesis nodes: source-specialized highlight extraction
//! and the introduction hook.

use std::sync::Arc;

use async_trait::async_trait;
use stategraph::{Node, Result};
use tracing::{info, warn};

use crate::generation::{Role, TextGenerator};
use crate::research::sources;
use crate::state::{Action, PipelineState, ResearchResult, Synthesis, SynthesisKind};
use crate::util::clip;

use super::ids;

/// Specializes the research view for the dominant selected source:
/// academic papers, repositories, newsletters, or general web results.
/// Pure data shaping; no generation call.
pub struct ConditionalSynthesisNode;

#[async_trait]
impl Node<PipelineState> for ConditionalSynthesisNode {
    fn id(&self) -> &str {
        ids::CONDITIONAL_SYNTHESIS
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let kind = dominant_kind(&state.research_sources);
        let source_name = match kind {
            SynthesisKind::Academic => sources::ARXIV,
            SynthesisKind::Repository => sources::GITHUB,
            SynthesisKind::Newsletter => sources::SUBSTACK,
            SynthesisKind::Web => sources::WEB,
        };

        let highlights: Vec<String> = state
            .research
            .by_source
            .get(source_name)
            .map(|results| {
                results
                    .iter()
                    .take(3)
                    .map(|result| highlight_for(kind, result))
                    .collect()
            })
            .unwrap_or_default();

        let mut research = state.research.clone();
        if !highlights.is_empty() {
            research.synthesis = Some(Synthesis { kind, highlights });
        }

        Ok(state
            .update()
            .research(research)
            .next_action(Action::IntroductionSynthesis)
            .finish())
    }
}

fn dominant_kind(selected: &[String]) -> SynthesisKind {
    if selected.iter().any(|s| s == sources::ARXIV) {
        SynthesisKind::Academic
    } else if selected.iter().any(|s| s == sources::GITHUB) {
        SynthesisKind::Repository
    } else if selected.iter().any(|s| s == sources::SUBSTACK) {
        SynthesisKind::Newsletter
    } else {
        SynthesisKind::Web
    }
}

fn highlight_for(kind: SynthesisKind, result: &ResearchResult) -> String {
    match kind {
        SynthesisKind::Academic => {
            let authors = result
                .metadata
                .get("authors")
                .and_then(|v| v.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            if authors.is_empty() {
                result.title.clone()
            } else {
                format!("{} ({authors})", result.title)
            }
        }
        SynthesisKind::Repository => {
            let stars = result
                .metadata
                .get("stars")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            format!("{} ({stars} stars): {}", result.title, clip(&result.content, 120))
        }
        SynthesisKind::Newsletter => {
            let author = result
                .metadata
                .get("author")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if author.is_empty() {
                result.title.clone()
            } else {
                format!("{} by {author}", result.title)
            }
        }
        SynthesisKind::Web => result.title.clone(),
    }
}

/// One generation call producing the introduction hook, stored on the
/// research context for final assembly. A failed call leaves the
/// introduction unset; assembly copes.
pub struct IntroductionSynthesisNode {
    generator: Arc<dyn TextGenerator>,
}

impl IntroductionSynthesisNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node<PipelineState> for IntroductionSynthesisNode {
    fn id(&self) -> &str {
        ids::INTRODUCTION_SYNTHESIS
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let audience = state.target_audience.as_deref().unwrap_or("Developers");
        let tone = state.tone.as_deref().unwrap_or("Professional");
        let title = state
            .research
            .blog_title
            .as_deref()
            .unwrap_or("this technical deep dive");

        let insights = if state.research.key_insights.is_empty() {
            "Research conducted across multiple sources.".to_string()
        } else {
            state
                .research
                .key_insights
                .iter()
                .map(|insight| format!("- {insight}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let preview = section_preview(state);
        let questions = if state.custom_questions.is_empty() {
            "None".to_string()
        } else {
            state
                .custom_questions
                .iter()
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = format!(
            "Write a compelling 200-300 word introduction for a technical blog post titled \"{title}\".\n\n\
             TARGET AUDIENCE: {audience}\n\
             TONE: {tone}\n\n\
             CONTENT CONTEXT:\n{}\n\n\
             KEY RESEARCH INSIGHTS:\n{insights}\n\n\
             CUSTOM QUESTIONS TO ADDRESS:\n{questions}\n\n\
             WHAT THE POST WILL COVER:\n{preview}\n\n\
             Open with a hook, explain why the topic matters to {audience}, preview what \
             readers will learn, and avoid stock openers like \"In this post\". \
             Output only the introduction text in markdown.",
            clip(state.content_summary.as_deref().unwrap_or_default(), 800),
        );
        let system = format!(
            "You are a technical writer crafting an engaging introduction for {audience}. \
             Write in a {tone} tone. Hook the reader immediately and avoid cliches."
        );

        match self.generator.generate(&system, &prompt, Role::Writer).await {
            Ok(completion) => {
                let intro = completion.text.trim().to_string();
                let mut research = state.research.clone();
                if !intro.is_empty() {
                    research.introduction = Some(intro);
                }
                info!("introduction synthesized");
                Ok(state
                    .update()
                    .research(research)
                    .record_usage(&completion.model, &completion.usage)
                    .next_action(Action::DraftSection)
                    .finish())
            }
            Err(e) => {
                warn!(error = %e, "introduction synthesis unavailable, continuing without one");
                Ok(state
                    .update()
                    .next_action(Action::DraftSection)
                    .finish())
            }
        }
    }
}

fn section_preview(state: &PipelineState) -> String {
    let titles: Vec<&str> = state
        .sections
        .iter()
        .map(|s| s.title.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    match titles.len() {
        0 | 1 => String::new(),
        2 => format!("We'll cover {} and {}.", titles[0], titles[1]),
        _ => format!(
            "We'll explore {}, and {}.",
            titles[..titles.len() - 1].join(", "),
            titles[titles.len() - 1]
        ),
    }
}
