//! The single state value threaded through every workflow node.
//!
//! Nodes never mutate a `PipelineState` in place; they derive a new one
//! through the [`StateUpdate`] builder. Resource counters only move in
//! one direction: token usage grows, credits shrink (floor 0),
//! fingerprints accumulate.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::TokenUsage;

/// Routing keys a node can set. The engine fails fatally on a key with
/// no matching table entry, so the set of keys and the edge tables must
/// stay in lockstep (checked by the workflow tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ProcessInputs,
    RouteInputs,
    ProcessCode,
    ProcessDocs,
    ProcessBoth,
    ResearchCoordinator,
    ConductResearch,
    BlogStructuring,
    ConditionalSynthesis,
    IntroductionSynthesis,
    DraftSection,
    PlagiarismCheck,
    EvaluatePlagiarism,
    RewriteSection,
    Completion,
    End,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ProcessInputs => "process_inputs",
            Action::RouteInputs => "route_inputs",
            Action::ProcessCode => "process_code",
            Action::ProcessDocs => "process_docs",
            Action::ProcessBoth => "process_both",
            Action::ResearchCoordinator => "research_coordinator",
            Action::ConductResearch => "conduct_research",
            Action::BlogStructuring => "blog_structuring",
            Action::ConditionalSynthesis => "conditional_synthesis",
            Action::IntroductionSynthesis => "introduction_synthesis",
            Action::DraftSection => "draft_section",
            Action::PlagiarismCheck => "plagiarism_check",
            Action::EvaluatePlagiarism => "evaluate_plagiarism",
            Action::RewriteSection => "rewrite_section",
            Action::Completion => "completion",
            Action::End => "end",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned blog section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A normalized research record. Fetchers may fill fewer fields; only
/// `title` and `content` are guaranteed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Academic,
    Web,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<String>,
}

/// One query scheduled for execution against a set of sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub query: String,
    pub sources: Vec<String>,
}

/// Prioritized research execution plan. Low-priority queries are kept
/// for inspection but never executed automatically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub high: Vec<PlannedQuery>,
    pub medium: Vec<PlannedQuery>,
    pub low: Vec<PlannedQuery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisKind {
    Academic,
    Repository,
    Newsletter,
    Web,
}

/// Output of the source-specialized synthesis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub kind: SynthesisKind,
    pub highlights: Vec<String>,
}

/// Aggregated research, organized for downstream consumption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    /// All results grouped by source name across executed queries.
    pub by_source: BTreeMap<String, Vec<ResearchResult>>,
    /// Per-query grouping, preserved for traceability.
    pub by_topic: BTreeMap<String, BTreeMap<String, Vec<ResearchResult>>>,
    /// URL-deduplicated citations for the references block.
    pub citations: Vec<Citation>,
    pub key_insights: Vec<String>,
    pub blog_title: Option<String>,
    pub introduction: Option<String>,
    pub synthesis: Option<Synthesis>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

/// AI-risk analysis of one draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default)]
    pub risk_score: u8,
    #[serde(default)]
    pub flagged_phrases: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

/// Word-overlap similarity against the other drafted sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCheck {
    pub similarity_score: f32,
    pub detail: String,
}

/// Composite plagiarism score. Exactly one variant per check: a costed
/// external check or the local estimate, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeScore {
    Api { score: u8 },
    Estimated { score: u8 },
}

impl CompositeScore {
    pub fn score(&self) -> u8 {
        match self {
            CompositeScore::Api { score } | CompositeScore::Estimated { score } => *score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlagiarismCheck {
    pub ai: AiAnalysis,
    pub local_similarity: SimilarityCheck,
    pub composite: CompositeScore,
}

/// One entry in a section's rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub original_excerpt: String,
    pub revised: String,
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
}

/// Run statistics aggregated by the completion node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub total_sections: usize,
    pub checked_sections: usize,
    pub total_tokens: u64,
    pub remaining_credits: u32,
    pub sections_with_revisions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    // Inputs, immutable once input processing has run
    pub source_code: Option<String>,
    pub uploaded_files: Vec<String>,
    pub documents: Vec<String>,

    // User hints
    pub research_focus: Option<String>,
    pub target_audience: Option<String>,
    pub tone: Option<String>,
    pub custom_questions: Vec<String>,
    pub research_sources: Vec<String>,

    // Derived content
    pub content_summary: Option<String>,

    // Research
    pub research_queries: Vec<String>,
    pub research_plan: Option<ResearchPlan>,
    pub research: ResearchContext,

    // Structure and drafts
    pub sections: Vec<Section>,
    pub current_section: Option<Section>,
    pub section_drafts: BTreeMap<String, String>,

    // Plagiarism
    pub plagiarism_checks: BTreeMap<String, PlagiarismCheck>,
    pub revision_history: BTreeMap<String, Vec<Revision>>,
    pub plagiarism_feedback: Option<String>,
    pub needs_rewrite: bool,

    // Resource counters
    pub token_usage: BTreeMap<String, u64>,
    pub free_tier_credits: u32,
    pub content_fingerprints: BTreeSet<String>,

    // Control and output
    pub next_action: Action,
    pub final_document: Option<String>,
    pub completion_summary: Option<CompletionSummary>,
}

impl PipelineState {
    pub fn new(free_tier_credits: u32) -> Self {
        Self {
            source_code: None,
            uploaded_files: Vec::new(),
            documents: Vec::new(),
            research_focus: None,
            target_audience: None,
            tone: None,
            custom_questions: Vec::new(),
            research_sources: Vec::new(),
            content_summary: None,
            research_queries: Vec::new(),
            research_plan: None,
            research: ResearchContext::default(),
            sections: Vec::new(),
            current_section: None,
            section_drafts: BTreeMap::new(),
            plagiarism_checks: BTreeMap::new(),
            revision_history: BTreeMap::new(),
            plagiarism_feedback: None,
            needs_rewrite: false,
            token_usage: BTreeMap::new(),
            free_tier_credits,
            content_fingerprints: BTreeSet::new(),
            next_action: Action::ProcessInputs,
            final_document: None,
            completion_summary: None,
        }
    }

    /// Begin a copy-on-write update. The receiver is left untouched.
    pub fn update(&self) -> StateUpdate {
        StateUpdate {
            next: self.clone(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.token_usage.values().sum()
    }

    /// Section following `id` in document order, if any.
    pub fn next_section_after(&self, id: &str) -> Option<Section> {
        let idx = self.sections.iter().position(|s| s.id == id)?;
        self.sections.get(idx + 1).cloned()
    }

    pub fn revision_count(&self, section_id: &str) -> usize {
        self.revision_history
            .get(section_id)
            .map(|h| h.len())
            .unwrap_or(0)
    }
}

/// Typed copy-on-write builder over [`PipelineState`]. Each method sets
/// one field (or applies one monotone counter change) on a private
/// clone; `finish` releases it. Field names are checked at compile time
/// rather than merged from an untyped map.
pub struct StateUpdate {
    next: PipelineState,
}

impl StateUpdate {
    pub fn documents(mut self, documents: Vec<String>) -> Self {
        self.next.documents = documents;
        self
    }

    pub fn content_summary(mut self, summary: impl Into<String>) -> Self {
        self.next.content_summary = Some(summary.into());
        self
    }

    pub fn research_queries(mut self, queries: Vec<String>) -> Self {
        self.next.research_queries = queries;
        self
    }

    pub fn research_plan(mut self, plan: ResearchPlan) -> Self {
        self.next.research_plan = Some(plan);
        self
    }

    pub fn research(mut self, research: ResearchContext) -> Self {
        self.next.research = research;
        self
    }

    pub fn sections(mut self, sections: Vec<Section>) -> Self {
        self.next.sections = sections;
        self
    }

    pub fn current_section(mut self, section: Option<Section>) -> Self {
        self.next.current_section = section;
        self
    }

    pub fn set_draft(mut self, section_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.next.section_drafts.insert(section_id.into(), text.into());
        self
    }

    pub fn record_check(mut self, section_id: impl Into<String>, check: PlagiarismCheck) -> Self {
        self.next.plagiarism_checks.insert(section_id.into(), check);
        self
    }

    pub fn push_revision(mut self, section_id: impl Into<String>, revision: Revision) -> Self {
        self.next
            .revision_history
            .entry(section_id.into())
            .or_default()
            .push(revision);
        self
    }

    pub fn plagiarism_feedback(mut self, feedback: Option<String>) -> Self {
        self.next.plagiarism_feedback = feedback;
        self
    }

    pub fn needs_rewrite(mut self, needs: bool) -> Self {
        self.next.needs_rewrite = needs;
        self
    }

    /// Fold a generation call's token usage into the per-model counter.
    pub fn record_usage(mut self, model: &str, usage: &TokenUsage) -> Self {
        *self.next.token_usage.entry(model.to_string()).or_insert(0) += usage.total;
        self
    }

    /// Spend one credit. Saturates at zero.
    pub fn spend_credit(mut self) -> Self {
        self.next.free_tier_credits = self.next.free_tier_credits.saturating_sub(1);
        self
    }

    pub fn add_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.next.content_fingerprints.insert(fingerprint.into());
        self
    }

    pub fn completion_summary(mut self, summary: CompletionSummary) -> Self {
        self.next.completion_summary = Some(summary);
        self
    }

    pub fn final_document(mut self, document: impl Into<String>) -> Self {
        self.next.final_document = Some(document.into());
        self
    }

    pub fn next_action(mut self, action: Action) -> Self {
        self.next.next_action = action;
        self
    }

    pub fn finish(self) -> PipelineState {
        self.next
    }
}
