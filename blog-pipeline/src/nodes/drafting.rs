//! Section drafting: pick the most relevant research snippets, carry
//! narrative context from prior sections (summarized when it would
//! overflow the prompt budget), draft, and run at most one
//! critique-and-refine round.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use stategraph::{Node, Result};
use tracing::{info, warn};

use crate::analysis::Summarizer;
use crate::config::PipelineConfig;
use crate::generation::{Completion, Role, TextGenerator};
use crate::state::{Action, PipelineState, ResearchResult, Section};
use crate::util::{clip, extract_json_object};

use super::ids;

const MAX_SNIPPET_CANDIDATES: usize = 6;
const SNIPPETS_PER_SECTION: usize = 2;
const REFINE_BELOW_SCORE: u8 = 8;
const EMPTY_DRAFT_PLACEHOLDER: &str =
    "*Content for this section could not be generated; regenerate to fill it in.*";

pub struct DraftSectionNode {
    generator: Arc<dyn TextGenerator>,
    summarizer: Summarizer,
    config: Arc<PipelineConfig>,
}

#[derive(Deserialize)]
struct RankResponse {
    #[serde(default)]
    picks: Vec<usize>,
}

#[derive(Deserialize)]
struct CritiqueResponse {
    #[serde(default = "default_score")]
    score: u8,
    #[serde(default)]
    weaknesses: Vec<String>,
}

fn default_score() -> u8 {
    10
}

impl DraftSectionNode {
    pub fn new(generator: Arc<dyn TextGenerator>, config: Arc<PipelineConfig>) -> Self {
        let summarizer = Summarizer::new(generator.clone());
        Self {
            generator,
            summarizer,
            config,
        }
    }

    /// Select up to two research snippets for the section. With more
    /// than two candidates, ask the researcher model to rank; any
    /// failure keeps the top candidates by keyword relevance.
    async fn select_snippets(
        &self,
        state: &PipelineState,
        section: &Section,
        usage: &mut Vec<Completion>,
    ) -> Vec<String> {
        let candidates = collect_candidates(state, section);
        if candidates.is_empty() {
            return Vec::new();
        }
        if candidates.len() <= SNIPPETS_PER_SECTION {
            return candidates
                .iter()
                .map(|(source, result)| format_snippet(source, result))
                .collect();
        }

        let listing = candidates
            .iter()
            .enumerate()
            .map(|(index, (source, result))| {
                format!("{}. [{source}] {}", index + 1, result.title)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Pick the {SNIPPETS_PER_SECTION} research findings most relevant to a blog section \
             titled \"{}\" ({}).\n\nFINDINGS:\n{listing}\n\n\
             Respond with JSON only: {{\"picks\": [1, 2]}}",
            section.title, section.description,
        );

        let picks = match self
            .generator
            .generate(
                "You rank research findings by relevance. Output valid JSON only.",
                &prompt,
                Role::Researcher,
            )
            .await
        {
            Ok(completion) => {
                let parsed = extract_json_object(&completion.text)
                    .and_then(|json| serde_json::from_str::<RankResponse>(json).ok())
                    .map(|r| r.picks)
                    .unwrap_or_default();
                usage.push(completion);
                parsed
            }
            Err(e) => {
                warn!(error = %e, "snippet ranking unavailable, using relevance order");
                Vec::new()
            }
        };

        let chosen: Vec<&(String, ResearchResult)> = picks
            .iter()
            .filter_map(|pick| pick.checked_sub(1))
            .filter_map(|index| candidates.get(index))
            .take(SNIPPETS_PER_SECTION)
            .collect();
        if chosen.is_empty() {
            candidates
                .iter()
                .take(SNIPPETS_PER_SECTION)
                .map(|(source, result)| format_snippet(source, result))
                .collect()
        } else {
            chosen
                .into_iter()
                .map(|(source, result)| format_snippet(source, result))
                .collect()
        }
    }

    /// Narrative context from already-drafted sections, condensed when
    /// it would overflow the configured budget.
    async fn narrative_context(
        &self,
        state: &PipelineState,
        section: &Section,
        usage: &mut Vec<Completion>,
    ) -> String {
        let current_index = state
            .sections
            .iter()
            .position(|s| s.id == section.id)
            .unwrap_or(0);
        let prior: Vec<String> = state.sections[..current_index]
            .iter()
            .filter_map(|s| {
                state
                    .section_drafts
                    .get(&s.id)
                    .map(|draft| format!("## {}\n{draft}", s.title))
            })
            .collect();
        let prior = prior.join("\n\n");
        if prior.is_empty() {
            return prior;
        }

        if prior.chars().count() <= self.config.section_context_budget {
            return prior;
        }

        match self
            .summarizer
            .condense(&prior, "narrative continuity for the next section")
            .await
        {
            Ok(completion) => {
                let text = completion.text.clone();
                usage.push(completion);
                text
            }
            Err(e) => {
                warn!(error = %e, "context summarization unavailable, clipping instead");
                clip(&prior, self.config.section_context_budget).to_string()
            }
        }
    }

    /// One critique round: score the draft, and refine once when the
    /// critic scores it below the bar. Never loops.
    async fn self_correct(
        &self,
        section: &Section,
        draft: &str,
        usage: &mut Vec<Completion>,
    ) -> Option<String> {
        let critique_prompt = format!(
            "Score this draft of the section \"{}\" from 1-10 and list its weaknesses.\n\n\
             DRAFT:\n{}\n\n\
             Respond with JSON only: {{\"score\": 7, \"weaknesses\": [\"...\"]}}",
            section.title,
            clip(draft, 4000),
        );
        let critique = match self
            .generator
            .generate(
                "You are a demanding technical editor. Output valid JSON only.",
                &critique_prompt,
                Role::Researcher,
            )
            .await
        {
            Ok(completion) => {
                let parsed = extract_json_object(&completion.text)
                    .and_then(|json| serde_json::from_str::<CritiqueResponse>(json).ok())
                    .unwrap_or(CritiqueResponse {
                        score: default_score(),
                        weaknesses: Vec::new(),
                    });
                usage.push(completion);
                parsed
            }
            Err(_) => return None,
        };

        if critique.score >= REFINE_BELOW_SCORE {
            return None;
        }
        info!(score = critique.score, "draft scored below the bar, refining once");

        let weaknesses = critique.weaknesses.join("\n- ");
        let refine_prompt = format!(
            "Revise this draft of \"{}\" to address the critique. Keep the technical \
             content and markdown formatting.\n\nCRITIQUE:\n- {weaknesses}\n\n\
             DRAFT:\n{}\n\nOutput only the revised section.",
            section.title,
            clip(draft, 4000),
        );
        match self
            .generator
            .generate(
                "You're a technical writer revising your own work.",
                &refine_prompt,
                Role::Writer,
            )
            .await
        {
            Ok(completion) => {
                let refined = completion.text.trim().to_string();
                usage.push(completion);
                (!refined.is_empty()).then_some(refined)
            }
            Err(e) => {
                warn!(error = %e, "refinement call failed, keeping original draft");
                None
            }
        }
    }
}

#[async_trait]
impl Node<PipelineState> for DraftSectionNode {
    fn id(&self) -> &str {
        ids::DRAFT_SECTION
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let Some(section) = state.current_section.clone() else {
            return Ok(state.update().next_action(Action::Completion).finish());
        };

        let mut usage: Vec<Completion> = Vec::new();
        let snippets = self.select_snippets(state, &section, &mut usage).await;
        let context = self.narrative_context(state, &section, &mut usage).await;

        let research_block = if snippets.is_empty() {
            "No research findings available for this section.".to_string()
        } else {
            snippets.join("\n\n")
        };
        let audience = state.target_audience.as_deref().unwrap_or("Developers");
        let tone = state.tone.as_deref().unwrap_or("Professional");

        let prompt = format!(
            "## Technical Writing Task\n\
             **Section Title:** {}\n\
             **Purpose:** {}\n\n\
             ## Content Summary\n{}\n\n\
             ## Relevant Research\n{research_block}\n\n\
             ## Narrative So Far\n{}\n\n\
             ## Requirements\n\
             1. Integrate 1-3 relevant citations using [^n] notation\n\
             2. Include code snippets if applicable\n\
             3. Use markdown formatting\n\
             4. Maintain technical accuracy\n\
             5. Write for {audience} in a {tone} tone\n\
             6. Target length: 500-1000 words",
            section.title,
            section.description,
            clip(state.content_summary.as_deref().unwrap_or_default(), 1500),
            if context.is_empty() { "This is the opening section." } else { context.as_str() },
        );

        let mut draft = match self
            .generator
            .generate(
                "You're a technical writer. Create comprehensive, cited content with proper markdown formatting.",
                &prompt,
                Role::Writer,
            )
            .await
        {
            Ok(completion) => {
                let text = completion.text.trim().to_string();
                usage.push(completion);
                text
            }
            Err(e) => {
                warn!(error = %e, section = %section.id, "section drafting failed");
                String::new()
            }
        };

        if draft.is_empty() {
            warn!(section = %section.id, "storing placeholder for empty draft");
            draft = EMPTY_DRAFT_PLACEHOLDER.to_string();
        } else if let Some(refined) = self.self_correct(&section, &draft, &mut usage).await {
            draft = refined;
        }

        info!(section = %section.id, chars = draft.len(), "section drafted");
        let mut update = state
            .update()
            .set_draft(&section.id, draft)
            .next_action(Action::PlagiarismCheck);
        for completion in &usage {
            update = update.record_usage(&completion.model, &completion.usage);
        }
        Ok(update.finish())
    }
}

fn collect_candidates(state: &PipelineState, section: &Section) -> Vec<(String, ResearchResult)> {
    let keywords: Vec<String> = format!("{} {}", section.title, section.description)
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.len() >= 4)
        .map(str::to_string)
        .collect();

    let mut scored: Vec<(usize, String, ResearchResult)> = Vec::new();
    for (source, results) in &state.research.by_source {
        for result in results {
            let haystack = format!("{} {}", result.title, result.content).to_lowercase();
            let score = keywords
                .iter()
                .filter(|keyword| haystack.contains(keyword.as_str()))
                .count();
            scored.push((score, source.clone(), result.clone()));
        }
    }

    // Relevance first; sources with no keyword hit still surface their
    // lead result so sparse research is not dropped entirely.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(MAX_SNIPPET_CANDIDATES)
        .map(|(_, source, result)| (source, result))
        .collect()
}

fn format_snippet(source: &str, result: &ResearchResult) -> String {
    let body = result
        .summary
        .as_deref()
        .unwrap_or(&result.content);
    format!("From {source}: {}\n{}", result.title, clip(body, 500))
}
