//! The plagiarism gate: check, evaluate, rewrite. The rewrite loops
//! back to the check through the graph; a per-section rewrite cap keeps
//! a non-converging section from riding the loop up to the global step
//! ceiling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use stategraph::{Node, Result};
use tracing::{info, warn};

use crate::analysis::{self, OriginalityChecker, PlagiarismDetector};
use crate::config::PipelineConfig;
use crate::generation::{Role, TextGenerator};
use crate::state::{
    Action, AiAnalysis, CompositeScore, PipelineState, PlagiarismCheck, Revision, SimilarityCheck,
};
use crate::util::clip;

use super::ids;

const MIN_WORDS_FOR_COSTED_CHECK: usize = 150;
const HIGH_AI_RISK: u8 = 70;
const API_WORTHY_AI_RISK: u8 = 50;
const HIGH_SIMILARITY: f32 = 20.0;
const MANY_FLAGGED_PHRASES: usize = 5;

/// Multi-stage check: fingerprint, AI analysis, local similarity, and
/// either a costed external score or a local estimate. Exactly one of
/// the two composite variants is recorded.
pub struct PlagiarismCheckNode {
    detector: PlagiarismDetector,
    checker: Arc<dyn OriginalityChecker>,
}

impl PlagiarismCheckNode {
    pub fn new(generator: Arc<dyn TextGenerator>, checker: Arc<dyn OriginalityChecker>) -> Self {
        Self {
            detector: PlagiarismDetector::new(generator),
            checker,
        }
    }
}

#[async_trait]
impl Node<PipelineState> for PlagiarismCheckNode {
    fn id(&self) -> &str {
        ids::PLAGIARISM_CHECK
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let Some(section) = state.current_section.clone() else {
            return Ok(state.update().next_action(Action::Completion).finish());
        };
        let Some(content) = state
            .section_drafts
            .get(&section.id)
            .filter(|draft| !draft.is_empty())
            .cloned()
        else {
            return Ok(state.update().next_action(Action::Completion).finish());
        };

        let fingerprint = analysis::fingerprint(&content);
        let ai = self
            .detector
            .analyze(&content, &state.content_fingerprints)
            .await;

        let others: Vec<&str> = state
            .section_drafts
            .iter()
            .filter(|(id, _)| **id != section.id)
            .map(|(_, draft)| draft.as_str())
            .collect();
        let similarity = analysis::max_similarity(&content, others);

        let mut update = state.update().add_fingerprint(fingerprint);
        let composite = if should_spend_credit(state, &content, &ai, &similarity) {
            match self.checker.score(&content, &ai, &similarity).await {
                Ok(score) => {
                    update = update.spend_credit();
                    CompositeScore::Api { score }
                }
                Err(e) => {
                    // No score, no spend: degrade to the estimate.
                    warn!(error = %e, "costed originality check failed");
                    CompositeScore::Estimated {
                        score: analysis::estimate_score(&ai, &similarity),
                    }
                }
            }
        } else {
            CompositeScore::Estimated {
                score: analysis::estimate_score(&ai, &similarity),
            }
        };

        info!(
            section = %section.id,
            ai_risk = ai.risk_score,
            similarity = similarity.similarity_score,
            composite = composite.score(),
            "plagiarism check recorded"
        );
        Ok(update
            .record_check(
                &section.id,
                PlagiarismCheck {
                    ai,
                    local_similarity: similarity,
                    composite,
                },
            )
            .next_action(Action::EvaluatePlagiarism)
            .finish())
    }
}

/// Spend a credit only on content worth checking: credits remain, the
/// draft is long enough, it is not code-dominated, and the local
/// signals point at real risk.
fn should_spend_credit(
    state: &PipelineState,
    content: &str,
    ai: &AiAnalysis,
    similarity: &SimilarityCheck,
) -> bool {
    if state.free_tier_credits == 0 {
        return false;
    }
    if content.split_whitespace().count() < MIN_WORDS_FOR_COSTED_CHECK {
        return false;
    }
    if looks_like_code(content) {
        return false;
    }
    ai.risk_score > API_WORTHY_AI_RISK
        || similarity.similarity_score > HIGH_SIMILARITY
        || ai.flagged_phrases.len() > MANY_FLAGGED_PHRASES
}

fn looks_like_code(content: &str) -> bool {
    const CODE_MARKERS: [&str; 6] = ["def ", "class ", "import ", "fn ", "function ", "```"];
    CODE_MARKERS.iter().any(|marker| content.contains(marker))
}

/// Derives the verdict from the recorded check and routes: rewrite,
/// next section, or completion.
pub struct EvaluatePlagiarismNode {
    config: Arc<PipelineConfig>,
}

impl EvaluatePlagiarismNode {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Node<PipelineState> for EvaluatePlagiarismNode {
    fn id(&self) -> &str {
        ids::EVALUATE_PLAGIARISM
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let Some(section) = state.current_section.clone() else {
            return Ok(state.update().next_action(Action::Completion).finish());
        };
        let Some(check) = state.plagiarism_checks.get(&section.id) else {
            // Nothing recorded for this section; treat as passing.
            return Ok(advance(state, &section.id));
        };

        let score = check.composite.score();
        let mut needs_rewrite = false;
        let mut feedback = String::new();

        if score > self.config.plagiarism_threshold {
            needs_rewrite = true;
            feedback.push_str(&format!(
                "Plagiarism risk score {score}% exceeds threshold {}. ",
                self.config.plagiarism_threshold
            ));
        }
        if check.ai.risk_score > HIGH_AI_RISK {
            needs_rewrite = true;
            feedback.push_str(&format!(
                "High AI risk score {}/100. ",
                check.ai.risk_score
            ));
        }
        if !check.ai.flagged_phrases.is_empty() {
            let flagged: Vec<&str> = check
                .ai
                .flagged_phrases
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            feedback.push_str(&format!("Flagged phrases: {}. ", flagged.join(", ")));
        }
        if check.local_similarity.similarity_score > HIGH_SIMILARITY {
            needs_rewrite = true;
            feedback.push_str(&format!(
                "High similarity ({:.0}%) with previous content. ",
                check.local_similarity.similarity_score
            ));
        }

        if needs_rewrite && state.revision_count(&section.id) >= self.config.max_section_rewrites {
            warn!(
                section = %section.id,
                rewrites = state.revision_count(&section.id),
                "rewrite limit reached, accepting current draft"
            );
            return Ok(advance(state, &section.id));
        }

        if needs_rewrite {
            info!(section = %section.id, feedback = %feedback, "section needs a rewrite");
            Ok(state
                .update()
                .plagiarism_feedback(Some(feedback))
                .needs_rewrite(true)
                .next_action(Action::RewriteSection)
                .finish())
        } else {
            Ok(advance(state, &section.id))
        }
    }
}

/// Move to the next section by document order, or to completion after
/// the last one.
fn advance(state: &PipelineState, section_id: &str) -> PipelineState {
    let update = state
        .update()
        .plagiarism_feedback(None)
        .needs_rewrite(false);
    match state.next_section_after(section_id) {
        Some(next) => update
            .current_section(Some(next))
            .next_action(Action::DraftSection)
            .finish(),
        None => update.next_action(Action::Completion).finish(),
    }
}

/// Plagiarism-aware revision. Loops back to the check through the
/// graph; bounded by the evaluate node's per-section cap.
pub struct RewriteSectionNode {
    generator: Arc<dyn TextGenerator>,
}

impl RewriteSectionNode {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node<PipelineState> for RewriteSectionNode {
    fn id(&self) -> &str {
        ids::REWRITE_SECTION
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let Some(section) = state.current_section.clone() else {
            return Ok(state.update().next_action(Action::Completion).finish());
        };
        let original = state
            .section_drafts
            .get(&section.id)
            .cloned()
            .unwrap_or_default();
        let feedback = state.plagiarism_feedback.clone().unwrap_or_default();
        let check = state.plagiarism_checks.get(&section.id);

        let instructions = rewrite_instructions(&original, &feedback, check);
        let prompt = format!(
            "You are revising content to eliminate plagiarism while maintaining accuracy.\n\n\
             ### ORIGINAL CONTENT:\n{}\n\n\
             ### REVISION INSTRUCTIONS:\n{instructions}\n\n\
             ### REQUIREMENTS:\n\
             1. Maintain all technical accuracy and key information\n\
             2. Use completely original phrasing and sentence structures\n\
             3. Add appropriate citations for any factual claims\n\
             4. Ensure the revised content flows naturally\n\n\
             ### OUTPUT ONLY THE REVISED CONTENT:",
            clip(&original, 3000),
        );

        let revised = match self
            .generator
            .generate(
                "You are an expert technical writer skilled in plagiarism prevention and content revision.",
                &prompt,
                Role::Writer,
            )
            .await
        {
            Ok(completion) => Some(completion),
            Err(e) => {
                // Keep the draft; the evaluate node's cap will stop the
                // loop if the condition persists.
                warn!(error = %e, section = %section.id, "rewrite call failed, keeping draft");
                None
            }
        };

        let Some(completion) = revised else {
            return Ok(state
                .update()
                .needs_rewrite(false)
                .next_action(Action::PlagiarismCheck)
                .finish());
        };

        let excerpt = if original.chars().count() > 500 {
            format!("{}...", clip(&original, 500))
        } else {
            original.clone()
        };
        info!(section = %section.id, "section rewritten");

        Ok(state
            .update()
            .push_revision(
                &section.id,
                Revision {
                    original_excerpt: excerpt,
                    revised: completion.text.clone(),
                    feedback,
                    timestamp: Utc::now(),
                },
            )
            .set_draft(&section.id, completion.text.trim())
            .record_usage(&completion.model, &completion.usage)
            .needs_rewrite(false)
            .next_action(Action::PlagiarismCheck)
            .finish())
    }
}

fn rewrite_instructions(
    original: &str,
    feedback: &str,
    check: Option<&PlagiarismCheck>,
) -> String {
    let mut instructions = Vec::new();

    if !feedback.is_empty() {
        instructions.push(format!("ADDRESS THE FOLLOWING ISSUES:\n{feedback}"));
    }

    if let Some(check) = check {
        if check.ai.risk_score > API_WORTHY_AI_RISK {
            instructions
                .push("HIGH PLAGIARISM RISK DETECTED - COMPLETE REWRITING REQUIRED".to_string());
        }
        if !check.ai.flagged_phrases.is_empty() {
            let flagged: Vec<&str> = check
                .ai
                .flagged_phrases
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            instructions.push(format!("AVOID THESE PHRASES: {}", flagged.join(", ")));
        }
        if check.local_similarity.similarity_score > HIGH_SIMILARITY {
            instructions.push(format!(
                "REDUCE SIMILARITY WITH PREVIOUS CONTENT (currently {:.0}%); use different vocabulary and sentence structures",
                check.local_similarity.similarity_score
            ));
        }
    }

    instructions.push(
        "REWRITING STRATEGIES:\n\
         1. Change sentence structure (active/passive, complex/simple)\n\
         2. Use synonyms and alternative expressions\n\
         3. Rearrange paragraphs and ideas\n\
         4. Add original examples and explanations\n\
         5. Include proper citations for factual information\n\
         6. Break up long similar passages with your own analysis\n\
         7. Use transition words to improve flow with original language"
            .to_string(),
    );

    if original.split_whitespace().count() > 500 {
        instructions.push("Focus on the passages with highest similarity first".to_string());
    }

    instructions.join("\n\n")
}
