use async_trait::async_trait;

use crate::error::Result;

/// Core trait that all workflow nodes implement.
///
/// A node receives the current state by shared reference and returns the
/// next state. The engine owns the state exclusively between steps, so a
/// node must derive its output from the input rather than mutate it in
/// place; this is what keeps runs replayable.
#[async_trait]
pub trait Node<S>: Send + Sync {
    /// Unique identifier for this node within a graph.
    fn id(&self) -> &str;

    /// Execute the node against the current state.
    async fn run(&self, state: &S) -> Result<S>;
}
