//! Completion: aggregate run statistics and assemble the final
//! document from the title, introduction, ordered sections, an optional
//! generated conclusion, and the references block.

use std::sync::Arc;

use async_trait::async_trait;
use stategraph::{Node, Result};
use tracing::{info, warn};

use crate::generation::{Completion, Role, TextGenerator};
use crate::state::{Action, CitationKind, CompletionSummary, PipelineState};
use crate::util::clip;

use super::ids;

const DEFAULT_TITLE: &str = "Technical Deep Dive";
const CONCLUSION_MARKERS: [&str; 4] = ["conclusion", "summary", "wrap", "takeaway"];

pub struct CompletionNode {
    generator: Arc<dyn TextGenerator>,
}

impl CompletionNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate a closing section when the outline doesn't already end
    /// on one. Failure just means no conclusion block.
    async fn generate_conclusion(&self, state: &PipelineState) -> Option<Completion> {
        let last_title = state.sections.last()?.title.to_lowercase();
        if CONCLUSION_MARKERS
            .iter()
            .any(|marker| last_title.contains(marker))
        {
            return None;
        }

        let outline = state
            .sections
            .iter()
            .map(|s| format!("- {}", s.title))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Write a short concluding section (100-200 words) for a blog post \
             covering:\n{outline}\n\nCONTENT CONTEXT:\n{}\n\n\
             Summarize the key takeaways and end with a forward-looking note. \
             Output only the conclusion text in markdown.",
            clip(state.content_summary.as_deref().unwrap_or_default(), 800),
        );

        match self
            .generator
            .generate(
                "You're a technical writer closing out a blog post.",
                &prompt,
                Role::Writer,
            )
            .await
        {
            Ok(completion) if !completion.text.trim().is_empty() => Some(completion),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "conclusion generation unavailable, skipping");
                None
            }
        }
    }
}

#[async_trait]
impl Node<PipelineState> for CompletionNode {
    fn id(&self) -> &str {
        ids::COMPLETION
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let conclusion = self.generate_conclusion(state).await;

        let mut update = state.update();
        if let Some(completion) = &conclusion {
            update = update.record_usage(&completion.model, &completion.usage);
        }
        let document = assemble_document(state, conclusion.as_ref().map(|c| c.text.trim()));

        let summary = CompletionSummary {
            total_sections: state.section_drafts.len(),
            checked_sections: state.plagiarism_checks.len(),
            total_tokens: update_total_tokens(state, conclusion.as_ref()),
            remaining_credits: state.free_tier_credits,
            sections_with_revisions: state
                .revision_history
                .values()
                .filter(|history| !history.is_empty())
                .count(),
        };
        info!(
            sections = summary.total_sections,
            tokens = summary.total_tokens,
            credits = summary.remaining_credits,
            "pipeline completed"
        );

        Ok(update
            .completion_summary(summary)
            .final_document(document)
            .next_action(Action::End)
            .finish())
    }
}

fn update_total_tokens(state: &PipelineState, conclusion: Option<&Completion>) -> u64 {
    state.total_tokens() + conclusion.map(|c| c.usage.total).unwrap_or(0)
}

fn assemble_document(state: &PipelineState, conclusion: Option<&str>) -> String {
    let title = state
        .research
        .blog_title
        .as_deref()
        .unwrap_or(DEFAULT_TITLE);
    let mut document = format!("# {title}\n\n");

    if let Some(intro) = &state.research.introduction {
        document.push_str(intro);
        document.push_str("\n\n");
    }

    for section in &state.sections {
        if let Some(draft) = state.section_drafts.get(&section.id) {
            document.push_str(&format!("## {}\n\n{draft}\n\n", section.title));
        }
    }

    if let Some(conclusion) = conclusion {
        document.push_str(&format!("## Conclusion\n\n{conclusion}\n\n"));
    }

    if !state.research.citations.is_empty() {
        document.push_str("## References\n\n");
        for (index, citation) in state.research.citations.iter().enumerate() {
            let line = match citation.kind {
                CitationKind::Academic => {
                    let authors = if citation.authors.is_empty() {
                        String::new()
                    } else {
                        format!(" - {}", citation.authors.join(", "))
                    };
                    let year = citation
                        .year
                        .as_deref()
                        .map(|y| format!(" ({y})"))
                        .unwrap_or_default();
                    format!(
                        "{}. [{}]({}){authors}{year}\n",
                        index + 1,
                        citation.title,
                        citation.url
                    )
                }
                CitationKind::Web => format!(
                    "{}. [{}]({})\n",
                    index + 1,
                    citation.title,
                    citation.url
                ),
            };
            document.push_str(&line);
        }
        document.push('\n');
    }

    document.trim_end().to_string()
}
