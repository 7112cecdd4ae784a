use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::{
    error::{GraphError, Result},
    node::Node,
};

/// Routing-key extractor used by conditional edges.
pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Terminal sink. An edge that targets `END` finishes the run.
pub const END: &str = "end";

/// Outgoing edge of a node. Every node has exactly one.
enum Routing<S> {
    /// Always taken, regardless of state content.
    Fixed(String),
    /// Chosen by looking up the router's key in the table. A key with no
    /// entry is a fatal routing error.
    Conditional {
        router: Router<S>,
        table: HashMap<String, String>,
    },
}

/// A directed graph of nodes driven by a single state value.
///
/// The graph may contain cycles; termination is guaranteed by the step
/// ceiling passed to [`Graph::run`] rather than by the topology.
pub struct Graph<S> {
    pub id: String,
    nodes: DashMap<String, Arc<dyn Node<S>>>,
    routing: HashMap<String, Routing<S>>,
    start: String,
}

impl<S> std::fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("routing", &self.routing.keys().collect::<Vec<_>>())
            .field("start", &self.start)
            .finish()
    }
}

impl<S: Send + Sync> Graph<S> {
    /// Drive the state through the graph until an edge targets [`END`].
    ///
    /// Fails with [`GraphError::StepLimitExceeded`] once `max_steps`
    /// node executions have happened without reaching the sink. Node
    /// errors propagate unchanged.
    pub async fn run(&self, initial: S, max_steps: usize) -> Result<S> {
        let mut state = initial;
        let mut current = self.start.clone();

        for step in 1..=max_steps {
            let node = self
                .nodes
                .get(&current)
                .map(|entry| entry.clone())
                .ok_or_else(|| GraphError::NodeNotFound(current.clone()))?;

            debug!(graph = %self.id, node = %current, step, "executing node");
            state = node.run(&state).await.inspect_err(|e| {
                error!(graph = %self.id, node = %current, error = %e, "node failed");
            })?;

            let target = self.next_target(&current, &state)?;
            if target == END {
                debug!(graph = %self.id, steps = step, "run completed");
                return Ok(state);
            }
            current = target;
        }

        Err(GraphError::StepLimitExceeded {
            node: current,
            max_steps,
        })
    }

    /// Resolve the edge leaving `from` for the given state.
    fn next_target(&self, from: &str, state: &S) -> Result<String> {
        match self.routing.get(from) {
            None => Err(GraphError::NoRouteFrom(from.to_string())),
            Some(Routing::Fixed(to)) => Ok(to.clone()),
            Some(Routing::Conditional { router, table }) => {
                let key = router(state);
                table
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownRoutingKey {
                        node: from.to_string(),
                        key,
                    })
            }
        }
    }

    /// Target for a routing key leaving `from`, ignoring the router.
    /// Fixed edges resolve for any key. Used by routing-completeness
    /// checks.
    pub fn route_for_key(&self, from: &str, key: &str) -> Option<String> {
        match self.routing.get(from)? {
            Routing::Fixed(to) => Some(to.clone()),
            Routing::Conditional { table, .. } => table.get(key).cloned(),
        }
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn start_node(&self) -> &str {
        &self.start
    }
}

/// Builder for creating graphs.
///
/// `build` validates the topology: every edge must leave a registered
/// node, every target must be a registered node or [`END`], and every
/// node must have exactly one outgoing edge construct. An incomplete
/// routing table is a construction-time failure, not a runtime surprise.
pub struct GraphBuilder<S> {
    id: String,
    nodes: Vec<Arc<dyn Node<S>>>,
    routing: Vec<(String, Routing<S>)>,
    start: Option<String>,
}

impl<S: Send + Sync> GraphBuilder<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            routing: Vec::new(),
            start: None,
        }
    }

    pub fn add_node(mut self, node: Arc<dyn Node<S>>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a fixed edge, always taken regardless of state content.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.routing
            .push((from.into(), Routing::Fixed(to.into())));
        self
    }

    /// Add a conditional edge: the router derives a key from the state
    /// and the table maps each key to a target node.
    pub fn add_conditional_edge<F, I, K, V>(
        mut self,
        from: impl Into<String>,
        router: F,
        table: I,
    ) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table = table
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.routing.push((
            from.into(),
            Routing::Conditional {
                router: Arc::new(router),
                table,
            },
        ));
        self
    }

    pub fn set_start(mut self, node_id: impl Into<String>) -> Self {
        self.start = Some(node_id.into());
        self
    }

    pub fn build(self) -> Result<Graph<S>> {
        let nodes: DashMap<String, Arc<dyn Node<S>>> = DashMap::new();
        let mut first_id = None;
        for node in self.nodes {
            let id = node.id().to_string();
            if first_id.is_none() {
                first_id = Some(id.clone());
            }
            if nodes.insert(id.clone(), node).is_some() {
                return Err(GraphError::InvalidGraph(format!(
                    "duplicate node id '{id}'"
                )));
            }
        }

        let mut routing = HashMap::new();
        for (from, edge) in self.routing {
            if !nodes.contains_key(&from) {
                return Err(GraphError::InvalidGraph(format!(
                    "edge leaves unknown node '{from}'"
                )));
            }
            let targets: Vec<&String> = match &edge {
                Routing::Fixed(to) => vec![to],
                Routing::Conditional { table, .. } => table.values().collect(),
            };
            for to in targets {
                if to.as_str() != END && !nodes.contains_key(to) {
                    return Err(GraphError::InvalidGraph(format!(
                        "edge from '{from}' targets unknown node '{to}'"
                    )));
                }
            }
            if routing.insert(from.clone(), edge).is_some() {
                return Err(GraphError::InvalidGraph(format!(
                    "node '{from}' already has an outgoing edge"
                )));
            }
        }

        for entry in nodes.iter() {
            if !routing.contains_key(entry.key()) {
                return Err(GraphError::InvalidGraph(format!(
                    "node '{}' has no outgoing edge",
                    entry.key()
                )));
            }
        }

        let start = self
            .start
            .or(first_id)
            .ok_or_else(|| GraphError::InvalidGraph("graph has no nodes".to_string()))?;
        if !nodes.contains_key(&start) {
            return Err(GraphError::InvalidGraph(format!(
                "start node '{start}' is not registered"
            )));
        }

        Ok(Graph {
            id: self.id,
            nodes,
            routing,
            start,
        })
    }
}
