use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use stategraph::{GraphError, Node, Result};
use tracing::info;

use crate::extract::DocumentExtractor;
use crate::state::{Action, PipelineState};

use super::ids;

/// Extracts text from every uploaded file. Unreadable files simply
/// contribute nothing.
pub struct ProcessInputsNode {
    extractor: Arc<dyn DocumentExtractor>,
}

impl ProcessInputsNode {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Node<PipelineState> for ProcessInputsNode {
    fn id(&self) -> &str {
        ids::PROCESS_INPUTS
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let mut documents = Vec::new();
        for path in &state.uploaded_files {
            let text = self.extractor.extract_text(Path::new(path)).await;
            if !text.is_empty() {
                documents.push(text);
            }
        }
        info!(
            uploaded = state.uploaded_files.len(),
            extracted = documents.len(),
            "processed uploaded documents"
        );

        Ok(state
            .update()
            .documents(documents)
            .next_action(Action::RouteInputs)
            .finish())
    }
}

/// Routes on input availability. Having neither code nor documents is a
/// fatal error, not a degradable one.
pub struct RouteInputsNode;

#[async_trait]
impl Node<PipelineState> for RouteInputsNode {
    fn id(&self) -> &str {
        ids::ROUTE_INPUTS
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let has_code = state
            .source_code
            .as_deref()
            .is_some_and(|code| !code.trim().is_empty());
        let has_docs = !state.documents.is_empty();

        let action = match (has_code, has_docs) {
            (true, true) => Action::ProcessBoth,
            (true, false) => Action::ProcessCode,
            (false, true) => Action::ProcessDocs,
            (false, false) => {
                return Err(GraphError::MissingInput(
                    "no source code and no documents provided".to_string(),
                ));
            }
        };

        Ok(state.update().next_action(action).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_by_available_inputs() {
        let mut state = PipelineState::new(100);
        state.source_code = Some("fn main() {}".to_string());
        let routed = RouteInputsNode.run(&state).await.unwrap();
        assert_eq!(routed.next_action, Action::ProcessCode);

        state.documents = vec!["a doc".to_string()];
        let routed = RouteInputsNode.run(&state).await.unwrap();
        assert_eq!(routed.next_action, Action::ProcessBoth);

        state.source_code = None;
        let routed = RouteInputsNode.run(&state).await.unwrap();
        assert_eq!(routed.next_action, Action::ProcessDocs);
    }

    #[tokio::test]
    async fn no_inputs_is_fatal() {
        let state = PipelineState::new(100);
        let err = RouteInputsNode.run(&state).await.unwrap_err();
        assert!(matches!(err, GraphError::MissingInput(_)));
    }
}
