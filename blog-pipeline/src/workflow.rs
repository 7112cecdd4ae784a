//! Graph wiring: the fifteen nodes, the fixed edges, and the three
//! conditional routes.
//!
//! Routing rule, applied uniformly: a node with exactly one successor
//! gets a fixed edge; any node that chooses (input routing, the
//! coordinator's research-vs-skip decision, the plagiarism verdict)
//! gets a conditional edge keyed on the action it wrote into the state.
//! There is no skip sentinel and fixed edges are never overridden.

use std::sync::Arc;

use stategraph::{END, Graph, GraphBuilder};

use crate::analysis::OriginalityChecker;
use crate::config::PipelineConfig;
use crate::extract::DocumentExtractor;
use crate::generation::TextGenerator;
use crate::nodes::{
    BlogStructuringNode, CompletionNode, ConditionalSynthesisNode, ConductResearchNode,
    DraftSectionNode, EvaluatePlagiarismNode, IntroductionSynthesisNode, PlagiarismCheckNode,
    ProcessBothNode, ProcessCodeNode, ProcessDocsNode, ProcessInputsNode,
    ResearchCoordinatorNode, RewriteSectionNode, RouteInputsNode, ids,
};
use crate::research::ResearchExecutor;
use crate::state::{Action, PipelineState};

/// Everything the graph needs that crosses an external boundary.
pub struct WorkflowComponents {
    pub generator: Arc<dyn TextGenerator>,
    pub checker: Arc<dyn OriginalityChecker>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub executor: Arc<ResearchExecutor>,
    pub config: Arc<PipelineConfig>,
}

fn routing_key(state: &PipelineState) -> String {
    state.next_action.as_str().to_string()
}

pub fn build_workflow(c: &WorkflowComponents) -> stategraph::Result<Graph<PipelineState>> {
    GraphBuilder::new("blog_pipeline")
        .add_node(Arc::new(ProcessInputsNode::new(c.extractor.clone())))
        .add_node(Arc::new(RouteInputsNode))
        .add_node(Arc::new(ProcessCodeNode::new(c.generator.clone())))
        .add_node(Arc::new(ProcessDocsNode::new(c.generator.clone())))
        .add_node(Arc::new(ProcessBothNode::new(c.generator.clone())))
        .add_node(Arc::new(ResearchCoordinatorNode::new(
            c.generator.clone(),
            c.config.clone(),
        )))
        .add_node(Arc::new(ConductResearchNode::new(
            c.executor.clone(),
            c.config.clone(),
        )))
        .add_node(Arc::new(BlogStructuringNode::new(c.generator.clone())))
        .add_node(Arc::new(ConditionalSynthesisNode))
        .add_node(Arc::new(IntroductionSynthesisNode::new(c.generator.clone())))
        .add_node(Arc::new(DraftSectionNode::new(
            c.generator.clone(),
            c.config.clone(),
        )))
        .add_node(Arc::new(PlagiarismCheckNode::new(
            c.generator.clone(),
            c.checker.clone(),
        )))
        .add_node(Arc::new(EvaluatePlagiarismNode::new(c.config.clone())))
        .add_node(Arc::new(RewriteSectionNode::new(c.generator.clone())))
        .add_node(Arc::new(CompletionNode::new(c.generator.clone())))
        .set_start(ids::PROCESS_INPUTS)
        .add_edge(ids::PROCESS_INPUTS, ids::ROUTE_INPUTS)
        .add_conditional_edge(
            ids::ROUTE_INPUTS,
            routing_key,
            [
                (Action::ProcessCode.as_str(), ids::PROCESS_CODE),
                (Action::ProcessDocs.as_str(), ids::PROCESS_DOCS),
                (Action::ProcessBoth.as_str(), ids::PROCESS_BOTH),
            ],
        )
        .add_edge(ids::PROCESS_CODE, ids::RESEARCH_COORDINATOR)
        .add_edge(ids::PROCESS_DOCS, ids::RESEARCH_COORDINATOR)
        .add_edge(ids::PROCESS_BOTH, ids::RESEARCH_COORDINATOR)
        .add_conditional_edge(
            ids::RESEARCH_COORDINATOR,
            routing_key,
            [
                (Action::ConductResearch.as_str(), ids::CONDUCT_RESEARCH),
                (Action::BlogStructuring.as_str(), ids::BLOG_STRUCTURING),
            ],
        )
        .add_edge(ids::CONDUCT_RESEARCH, ids::BLOG_STRUCTURING)
        .add_edge(ids::BLOG_STRUCTURING, ids::CONDITIONAL_SYNTHESIS)
        .add_edge(ids::CONDITIONAL_SYNTHESIS, ids::INTRODUCTION_SYNTHESIS)
        .add_edge(ids::INTRODUCTION_SYNTHESIS, ids::DRAFT_SECTION)
        .add_edge(ids::DRAFT_SECTION, ids::PLAGIARISM_CHECK)
        .add_edge(ids::PLAGIARISM_CHECK, ids::EVALUATE_PLAGIARISM)
        .add_conditional_edge(
            ids::EVALUATE_PLAGIARISM,
            routing_key,
            [
                (Action::RewriteSection.as_str(), ids::REWRITE_SECTION),
                (Action::DraftSection.as_str(), ids::DRAFT_SECTION),
                (Action::Completion.as_str(), ids::COMPLETION),
            ],
        )
        // the rewrite cycle
        .add_edge(ids::REWRITE_SECTION, ids::PLAGIARISM_CHECK)
        .add_edge(ids::COMPLETION, END)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SimulatedChecker;
    use crate::extract::PlainTextExtractor;
    use crate::testutil::MockGenerator;
    use std::time::Duration;

    fn components() -> WorkflowComponents {
        WorkflowComponents {
            generator: Arc::new(MockGenerator::new("reply")),
            checker: Arc::new(SimulatedChecker),
            extractor: Arc::new(PlainTextExtractor),
            executor: Arc::new(ResearchExecutor::new(vec![], Duration::from_secs(1))),
            config: Arc::new(PipelineConfig::default()),
        }
    }

    #[test]
    fn workflow_builds_and_starts_at_input_processing() {
        let graph = build_workflow(&components()).unwrap();
        assert_eq!(graph.start_node(), ids::PROCESS_INPUTS);
        assert_eq!(graph.node_ids().len(), 15);
    }

    /// Every action a node can emit must resolve through the edge
    /// table. The emit sets below mirror each node's implementation.
    #[test]
    fn every_emittable_action_has_a_route() {
        let graph = build_workflow(&components()).unwrap();

        let emits: [(&str, &[Action]); 15] = [
            (ids::PROCESS_INPUTS, &[Action::RouteInputs]),
            (
                ids::ROUTE_INPUTS,
                &[Action::ProcessCode, Action::ProcessDocs, Action::ProcessBoth],
            ),
            (ids::PROCESS_CODE, &[Action::ResearchCoordinator]),
            (ids::PROCESS_DOCS, &[Action::ResearchCoordinator]),
            (ids::PROCESS_BOTH, &[Action::ResearchCoordinator]),
            (
                ids::RESEARCH_COORDINATOR,
                &[Action::ConductResearch, Action::BlogStructuring],
            ),
            (ids::CONDUCT_RESEARCH, &[Action::BlogStructuring]),
            (ids::BLOG_STRUCTURING, &[Action::DraftSection]),
            (ids::CONDITIONAL_SYNTHESIS, &[Action::IntroductionSynthesis]),
            (ids::INTRODUCTION_SYNTHESIS, &[Action::DraftSection]),
            (
                ids::DRAFT_SECTION,
                &[Action::PlagiarismCheck, Action::Completion],
            ),
            (
                ids::PLAGIARISM_CHECK,
                &[Action::EvaluatePlagiarism, Action::Completion],
            ),
            (
                ids::EVALUATE_PLAGIARISM,
                &[Action::RewriteSection, Action::DraftSection, Action::Completion],
            ),
            (
                ids::REWRITE_SECTION,
                &[Action::PlagiarismCheck, Action::Completion],
            ),
            (ids::COMPLETION, &[Action::End]),
        ];

        for (node, actions) in emits {
            for action in actions {
                assert!(
                    graph.route_for_key(node, action.as_str()).is_some(),
                    "no route for action '{action}' leaving node '{node}'"
                );
            }
        }
    }

    #[test]
    fn rewrite_cycle_loops_back_to_the_check() {
        let graph = build_workflow(&components()).unwrap();
        assert_eq!(
            graph
                .route_for_key(ids::REWRITE_SECTION, Action::PlagiarismCheck.as_str())
                .as_deref(),
            Some(ids::PLAGIARISM_CHECK)
        );
        assert_eq!(
            graph
                .route_for_key(ids::EVALUATE_PLAGIARISM, Action::RewriteSection.as_str())
                .as_deref(),
            Some(ids::REWRITE_SECTION)
        );
        assert_eq!(
            graph.route_for_key(ids::COMPLETION, "anything").as_deref(),
            Some(END)
        );
    }
}
