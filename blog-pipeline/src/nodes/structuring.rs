//! Blog structuring: one generation call turns the content summary and
//! research highlights into an ordered section outline. A structuring
//! failure never aborts the pipeline; the fixed template takes over.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use stategraph::{Node, Result};
use tracing::{info, warn};

use crate::generation::{Role, TextGenerator};
use crate::state::{Action, PipelineState, Section};
use crate::util::{clip, extract_json_object};

use super::ids;

pub struct BlogStructuringNode {
    generator: Arc<dyn TextGenerator>,
}

#[derive(Deserialize)]
struct StructureResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    sections: Vec<Section>,
}

impl BlogStructuringNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node<PipelineState> for BlogStructuringNode {
    fn id(&self) -> &str {
        ids::BLOG_STRUCTURING
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let Some(summary) = state
            .content_summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        else {
            let sections = short_fallback_sections();
            return Ok(apply_structure(state, None, sections, None));
        };

        let insights = state
            .research
            .key_insights
            .iter()
            .take(3)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Based on this content summary, create an appropriate blog structure:\n\n\
             CONTENT SUMMARY:\n{}\n\n\
             RESEARCH CONTEXT:\n{insights}\n\n\
             Create a logical blog structure with 4-6 sections. Output JSON:\n\
             {{\"title\": \"Blog Title\", \"sections\": [{{\"id\": \"1\", \"title\": \"Section Title\", \"description\": \"What this section will cover\"}}]}}",
            clip(summary, 2000),
        );

        match self
            .generator
            .generate(
                "You are a technical content strategist. Create logical blog structures. Output valid JSON only.",
                &prompt,
                Role::Writer,
            )
            .await
        {
            Ok(completion) => {
                let parsed = extract_json_object(&completion.text)
                    .and_then(|json| serde_json::from_str::<StructureResponse>(json).ok())
                    .filter(|parsed| !parsed.sections.is_empty());
                match parsed {
                    Some(parsed) => {
                        info!(sections = parsed.sections.len(), "blog structure generated");
                        Ok(apply_structure(
                            state,
                            parsed.title,
                            parsed.sections,
                            Some(completion),
                        ))
                    }
                    None => {
                        warn!("structuring output unusable, applying fallback template");
                        Ok(apply_structure(
                            state,
                            None,
                            fallback_sections(),
                            Some(completion),
                        ))
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "structuring call failed, applying fallback template");
                Ok(apply_structure(state, None, fallback_sections(), None))
            }
        }
    }
}

fn apply_structure(
    state: &PipelineState,
    title: Option<String>,
    sections: Vec<Section>,
    completion: Option<crate::generation::Completion>,
) -> PipelineState {
    let mut research = state.research.clone();
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        research.blog_title = Some(title);
    }

    let first = sections.first().cloned();
    let mut update = state
        .update()
        .research(research)
        .sections(sections)
        .current_section(first)
        .next_action(Action::DraftSection);
    if let Some(completion) = completion {
        update = update.record_usage(&completion.model, &completion.usage);
    }
    update.finish()
}

fn section(id: &str, title: &str, description: &str) -> Section {
    Section {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
    }
}

/// Template used when structuring output is unusable.
fn fallback_sections() -> Vec<Section> {
    vec![
        section("1", "Introduction", "Overview and context"),
        section("2", "Technical Background", "Foundational concepts"),
        section("3", "Implementation", "Practical examples"),
        section("4", "Best Practices", "Recommendations and tips"),
        section("5", "Conclusion", "Summary and next steps"),
    ]
}

/// Smaller template for runs that never produced a content summary.
fn short_fallback_sections() -> Vec<Section> {
    vec![
        section("1", "Introduction", "Overview and context"),
        section("2", "Technical Analysis", "Detailed examination"),
        section("3", "Implementation", "Code examples and explanations"),
        section("4", "Conclusion", "Summary and takeaways"),
    ]
}
