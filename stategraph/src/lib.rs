pub mod error;
pub mod graph;
pub mod node;

// Re-export commonly used types
pub use error::{GraphError, Result};
pub use graph::{END, Graph, GraphBuilder, Router};
pub use node::Node;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct CounterState {
        count: u32,
        route: String,
    }

    struct IncrementNode {
        id: String,
        route_to: String,
    }

    #[async_trait]
    impl Node<CounterState> for IncrementNode {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, state: &CounterState) -> Result<CounterState> {
            Ok(CounterState {
                count: state.count + 1,
                route: self.route_to.clone(),
            })
        }
    }

    fn increment(id: &str, route_to: &str) -> Arc<IncrementNode> {
        Arc::new(IncrementNode {
            id: id.to_string(),
            route_to: route_to.to_string(),
        })
    }

    fn route(state: &CounterState) -> String {
        state.route.clone()
    }

    #[tokio::test]
    async fn fixed_edges_run_to_the_sink() {
        let graph = GraphBuilder::new("test")
            .add_node(increment("first", ""))
            .add_node(increment("second", ""))
            .add_edge("first", "second")
            .add_edge("second", END)
            .build()
            .unwrap();

        let initial = CounterState {
            count: 0,
            route: String::new(),
        };
        let result = graph.run(initial.clone(), 10).await.unwrap();
        assert_eq!(result.count, 2);
        // input untouched by the run
        assert_eq!(initial.count, 0);
    }

    #[tokio::test]
    async fn conditional_edge_follows_routing_key() {
        let graph = GraphBuilder::new("test")
            .add_node(increment("decide", "right"))
            .add_node(increment("left", ""))
            .add_node(increment("right", ""))
            .add_conditional_edge("decide", route, [("left", "left"), ("right", "right")])
            .add_edge("left", END)
            .add_edge("right", END)
            .build()
            .unwrap();

        let result = graph
            .run(
                CounterState {
                    count: 0,
                    route: String::new(),
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(result.count, 2);
    }

    #[tokio::test]
    async fn cycle_trips_the_step_ceiling() {
        // a <-> b forever; the ceiling must fire, not hang
        let graph = GraphBuilder::new("test")
            .add_node(increment("a", ""))
            .add_node(increment("b", ""))
            .add_edge("a", "b")
            .add_edge("b", "a")
            .build()
            .unwrap();

        let err = graph
            .run(
                CounterState {
                    count: 0,
                    route: String::new(),
                },
                7,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::StepLimitExceeded { max_steps: 7, .. }
        ));
    }

    #[tokio::test]
    async fn unmapped_routing_key_is_fatal() {
        let graph = GraphBuilder::new("test")
            .add_node(increment("decide", "nowhere"))
            .add_node(increment("left", ""))
            .add_conditional_edge("decide", route, [("left", "left")])
            .add_edge("left", END)
            .build()
            .unwrap();

        let err = graph
            .run(
                CounterState {
                    count: 0,
                    route: String::new(),
                },
                10,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownRoutingKey { ref node, ref key } if node == "decide" && key == "nowhere"
        ));
    }

    #[test]
    fn build_rejects_unknown_edge_targets() {
        let err = GraphBuilder::new("test")
            .add_node(increment("only", ""))
            .add_edge("only", "missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidGraph(_)));
    }

    #[test]
    fn build_rejects_nodes_without_edges() {
        let err = GraphBuilder::<CounterState>::new("test")
            .add_node(increment("only", ""))
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidGraph(_)));
    }

    #[test]
    fn route_for_key_exposes_the_table() {
        let graph = GraphBuilder::new("test")
            .add_node(increment("decide", "left"))
            .add_node(increment("left", ""))
            .add_conditional_edge("decide", route, [("left", "left")])
            .add_edge("left", END)
            .build()
            .unwrap();

        assert_eq!(graph.route_for_key("decide", "left").as_deref(), Some("left"));
        assert_eq!(graph.route_for_key("decide", "other"), None);
        // fixed edges resolve for any key
        assert_eq!(graph.route_for_key("left", "anything").as_deref(), Some(END));
    }
}
