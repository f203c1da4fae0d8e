//! The result graph produced by a traversal, and its JSON output shape.

use crate::aggregate::Appender;
use crate::object::ObjectRef;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One query evaluated on an edge, and how many objects it returned from the
/// store (before the goal node's own cross-query de-duplication).
#[derive(Debug, Clone, Serialize)]
pub struct EdgeQuery {
    pub query: String,
    pub count: usize,
}

/// A traversed edge: the rule that produced it, and the ordered list of
/// distinct queries it evaluated to, each with its own result count.
pub struct EdgeResult {
    pub rule_name: String,
    pub start: String,
    pub goal: String,
    pub queries: Vec<EdgeQuery>,
}

/// A node in the result graph: the de-duplicated object set for one class,
/// plus whether it was capped by a `--max-objects`-style limit.
pub struct NodeResult {
    pub class: String,
    pub appender: Arc<Appender>,
}

impl NodeResult {
    pub fn count(&self) -> usize {
        self.appender.count()
    }

    pub fn objects(&self) -> Vec<ObjectRef> {
        self.appender.list()
    }

    pub fn truncated(&self) -> bool {
        self.appender.truncated()
    }
}

/// The output of a single traversal: every node that ended up with at least
/// one object, and every edge that produced at least one query.
#[derive(Default)]
pub struct ResultGraph {
    pub nodes: HashMap<String, NodeResult>,
    pub edges: Vec<EdgeResult>,
}

impl ResultGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, full_class_name: &str) -> Option<&NodeResult> {
        self.nodes.get(full_class_name)
    }

    /// Renders the JSON shape:
    /// `nodes: [{class, count, queries: [{query, count}]}]`
    /// `edges: [{start, goal, rules?: [{name, queries: [{query, count}]}]}]`
    pub fn to_view(&self) -> GraphView {
        let nodes = self
            .nodes
            .values()
            .map(|n| NodeView {
                class: n.class.clone(),
                count: n.count(),
                truncated: n.truncated(),
            })
            .collect();

        let mut by_pair: HashMap<(String, String), Vec<RuleView>> = HashMap::new();
        for edge in &self.edges {
            by_pair
                .entry((edge.start.clone(), edge.goal.clone()))
                .or_default()
                .push(RuleView {
                    name: edge.rule_name.clone(),
                    queries: edge.queries.clone(),
                });
        }

        let edges = by_pair
            .into_iter()
            .map(|((start, goal), rules)| EdgeView { start, goal, rules })
            .collect();

        GraphView { nodes, edges }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub class: String,
    pub count: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub name: String,
    pub queries: Vec<EdgeQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub start: String,
    pub goal: String,
    pub rules: Vec<RuleView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}
