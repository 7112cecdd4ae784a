//! Content analysis nodes: turn the raw inputs into a content summary.
//! A failed generation call degrades to a truncated excerpt of the raw
//! input; these nodes never abort the run.

use std::sync::Arc;

use async_trait::async_trait;
use stategraph::{Node, Result};
use tracing::warn;

use crate::generation::{Role, TextGenerator};
use crate::state::{Action, PipelineState};
use crate::util::clip;

use super::ids;

const EXCERPT_FALLBACK_CHARS: usize = 1000;

pub struct ProcessCodeNode {
    generator: Arc<dyn TextGenerator>,
}

impl ProcessCodeNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node<PipelineState> for ProcessCodeNode {
    fn id(&self) -> &str {
        ids::PROCESS_CODE
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let Some(code) = state.source_code.as_deref() else {
            return Ok(state
                .update()
                .next_action(Action::ResearchCoordinator)
                .finish());
        };

        let content = clip(code, 10_000);
        match self
            .generator
            .generate(
                "You're a senior developer. Provide technical analysis in 3-5 key points.",
                content,
                Role::Writer,
            )
            .await
        {
            Ok(completion) => Ok(state
                .update()
                .content_summary(completion.text.clone())
                .record_usage(&completion.model, &completion.usage)
                .next_action(Action::ResearchCoordinator)
                .finish()),
            Err(e) => {
                warn!(error = %e, "code analysis unavailable, using raw excerpt");
                Ok(state
                    .update()
                    .content_summary(clip(content, EXCERPT_FALLBACK_CHARS))
                    .next_action(Action::ResearchCoordinator)
                    .finish())
            }
        }
    }
}

pub struct ProcessDocsNode {
    generator: Arc<dyn TextGenerator>,
}

impl ProcessDocsNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node<PipelineState> for ProcessDocsNode {
    fn id(&self) -> &str {
        ids::PROCESS_DOCS
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        if state.documents.is_empty() {
            return Ok(state
                .update()
                .next_action(Action::ResearchCoordinator)
                .finish());
        }

        let docs_text = state
            .documents
            .iter()
            .take(3)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        let docs_text = clip(&docs_text, 10_000);

        match self
            .generator
            .generate(
                "You're a research analyst. Extract core concepts.",
                &format!("Summarize key points:\n{docs_text}"),
                Role::Researcher,
            )
            .await
        {
            Ok(completion) => Ok(state
                .update()
                .content_summary(completion.text.clone())
                .record_usage(&completion.model, &completion.usage)
                .next_action(Action::ResearchCoordinator)
                .finish()),
            Err(e) => {
                warn!(error = %e, "document analysis unavailable, using raw excerpt");
                Ok(state
                    .update()
                    .content_summary(clip(docs_text, EXCERPT_FALLBACK_CHARS))
                    .next_action(Action::ResearchCoordinator)
                    .finish())
            }
        }
    }
}

pub struct ProcessBothNode {
    generator: Arc<dyn TextGenerator>,
}

impl ProcessBothNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node<PipelineState> for ProcessBothNode {
    fn id(&self) -> &str {
        ids::PROCESS_BOTH
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let (Some(code), false) = (state.source_code.as_deref(), state.documents.is_empty())
        else {
            return Ok(state
                .update()
                .next_action(Action::ResearchCoordinator)
                .finish());
        };

        let docs = state.documents.join("\n\n");
        let combined = format!(
            "## SOURCE CODE\n{}\n\n### DOCUMENTS\n{}",
            clip(code, 5000),
            clip(&docs, 5000)
        );

        match self
            .generator
            .generate(
                "You're a technical integrator. Find connections between code and docs.",
                &format!("Create unified technical overview:\n{combined}"),
                Role::Researcher,
            )
            .await
        {
            Ok(completion) => Ok(state
                .update()
                .content_summary(completion.text.clone())
                .record_usage(&completion.model, &completion.usage)
                .next_action(Action::ResearchCoordinator)
                .finish()),
            Err(e) => {
                warn!(error = %e, "combined analysis unavailable, using raw excerpt");
                Ok(state
                    .update()
                    .content_summary(clip(&combined, EXCERPT_FALLBACK_CHARS))
                    .next_action(Action::ResearchCoordinator)
                    .finish())
            }
        }
    }
}
