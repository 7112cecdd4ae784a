//! The workflow nodes. Each node is a pure `&PipelineState ->
//! PipelineState` step that also sets the routing key the engine reads.

mod completion;
mod coordinator;
mod drafting;
mod input;
mod plagiarism;
mod processing;
mod researcher;
mod structuring;
mod synthesis;

pub use completion::CompletionNode;
pub use coordinator::ResearchCoordinatorNode;
pub use drafting::DraftSectionNode;
pub use input::{ProcessInputsNode, RouteInputsNode};
pub use plagiarism::{EvaluatePlagiarismNode, PlagiarismCheckNode, RewriteSectionNode};
pub use processing::{ProcessBothNode, ProcessCodeNode, ProcessDocsNode};
pub use researcher::ConductResearchNode;
pub use structuring::BlogStructuringNode;
pub use synthesis::{ConditionalSynthesisNode, IntroductionSynthesisNode};

/// Node identifiers. These double as the routing keys nodes set through
/// [`crate::state::Action`], so the two sets must stay aligned.
pub mod ids {
    pub const PROCESS_INPUTS: &str = "process_inputs";
    pub const ROUTE_INPUTS: &str = "route_inputs";
    pub const PROCESS_CODE: &str = "process_code";
    pub const PROCESS_DOCS: &str = "process_docs";
    pub const PROCESS_BOTH: &str = "process_both";
    pub const RESEARCH_COORDINATOR: &str = "research_coordinator";
    pub const CONDUCT_RESEARCH: &str = "conduct_research";
    pub const BLOG_STRUCTURING: &str = "blog_structuring";
    pub const CONDITIONAL_SYNTHESIS: &str = "conditional_synthesis";
    pub const INTRODUCTION_SYNTHESIS: &str = "introduction_synthesis";
    pub const DRAFT_SECTION: &str = "draft_section";
    pub const PLAGIARISM_CHECK: &str = "plagiarism_check";
    pub const EVALUATE_PLAGIARISM: &str = "evaluate_plagiarism";
    pub const REWRITE_SECTION: &str = "rewrite_section";
    pub const COMPLETION: &str = "completion";
}
