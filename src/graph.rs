//! The directed multigraph of classes (nodes) and rules (edges)

use crate::class::Class;
use crate::rule::Rule;
use std::collections::{HashMap, HashSet, VecDeque};

/// One directed edge: a rule from `from` to `to`. Multiple edges between the
/// same class pair are permitted (e.g. two rules both mapping `k8s:Pod` to
/// `log:application` via different templates).
#[derive(Debug, Clone)]
pub struct Edge {
    pub rule: Rule,
    pub from: String,
    pub to: String,
}

/// A directed multigraph over the transitive closure of classes mentioned by
/// any rule, plus the start class. Built once from a compiled rule set and
/// traversed read-only afterwards.
#[derive(Default, Clone)]
pub struct ClassGraph {
    nodes: HashMap<String, Class>,
    edges: Vec<Edge>,
    // Edge indices per source class, in rule-registration order.
    out_edges: HashMap<String, Vec<usize>>,
}

impl ClassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from the engine's compiled rules, in registration
    /// order (so `out_edges` iteration order is deterministic).
    pub fn from_rules(rules: &[Rule]) -> Self {
        let mut graph = ClassGraph::new();
        for rule in rules {
            graph.add_rule(rule.clone());
        }
        graph
    }

    fn add_rule(&mut self, rule: Rule) {
        let from = rule.start.full_name();
        let to = rule.goal.full_name();
        self.nodes.entry(from.clone()).or_insert_with(|| rule.start.clone());
        self.nodes.entry(to.clone()).or_insert_with(|| rule.goal.clone());
        let idx = self.edges.len();
        self.edges.push(Edge {
            rule,
            from: from.clone(),
            to,
        });
        self.out_edges.entry(from).or_default().push(idx);
    }

    /// Ensures a class participates in the graph even if no rule currently
    /// references it (e.g. the caller's start class).
    pub fn ensure_node(&mut self, class: &Class) {
        self.nodes.entry(class.full_name()).or_insert_with(|| class.clone());
    }

    pub fn node_for(&self, full_class_name: &str) -> Option<&Class> {
        self.nodes.get(full_class_name)
    }

    /// Out-edges from `full_class_name`, in rule-registration order.
    pub fn out_edges(&self, full_class_name: &str) -> impl Iterator<Item = &Edge> {
        self.out_edges
            .get(full_class_name)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.edges[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Class> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// BFS over edges, ignoring multiplicity, returning the induced subgraph
    /// of every edge that lies on *some* shortest path from `start` to *any*
    /// class in `goals`. Used to prune the rule graph before a goals
    /// traversal, keeping it strictly forward.
    ///
    /// If `start` cannot reach any goal, the returned graph contains only
    /// `start` as an isolated node.
    pub fn shortest_paths(&self, start: &str, goals: &HashSet<String>) -> ClassGraph {
        // distance[node] = hop count from start, via BFS over unique (from,to)
        // adjacency (multiplicity doesn't change shortest-path distance).
        let mut distance: HashMap<&str, usize> = HashMap::new();
        distance.insert(start, 0);
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            let d = distance[node];
            for edge in self.out_edges(node) {
                if !distance.contains_key(edge.to.as_str()) {
                    distance.insert(&edge.to, d + 1);
                    queue.push_back(&edge.to);
                }
            }
        }

        let mut pruned = ClassGraph::new();
        if let Some(class) = self.nodes.get(start) {
            pruned.ensure_node(class);
        }

        // The length of the shortest path from `start` to any goal it can
        // actually reach; an edge only survives if it lies on a path of
        // exactly this length.
        let target_distance = goals.iter().filter_map(|g| distance.get(g.as_str()).copied()).min();
        let Some(target_distance) = target_distance else {
            return pruned;
        };

        // goal_distance[v] = hop count from v to the nearest goal, via BFS
        // over the reverse adjacency of the *whole* graph (not just the part
        // forward-reachable from `start`). Forward distance alone isn't
        // enough to prune correctly: an edge u -> v with dist(v) == dist(u) +
        // 1 only proves v is as close as possible to `start`, not that v is
        // still headed toward a goal (a dead-end branch off the true
        // shortest path satisfies that check too). Requiring dist(u) + 1 +
        // goal_distance(v) == target_distance additionally proves the edge
        // lies on a path that actually reaches a goal at the shortest
        // possible length.
        let mut reverse_adj: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            reverse_adj.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
        }
        let mut goal_distance: HashMap<&str, usize> = HashMap::new();
        let mut rqueue = VecDeque::new();
        for goal in goals {
            if self.nodes.contains_key(goal.as_str()) && !goal_distance.contains_key(goal.as_str()) {
                goal_distance.insert(goal.as_str(), 0);
                rqueue.push_back(goal.as_str());
            }
        }
        while let Some(node) = rqueue.pop_front() {
            let d = goal_distance[node];
            for &pred in reverse_adj.get(node).into_iter().flatten() {
                if !goal_distance.contains_key(pred) {
                    goal_distance.insert(pred, d + 1);
                    rqueue.push_back(pred);
                }
            }
        }

        for edge in &self.edges {
            let (Some(&du), Some(&dv)) = (distance.get(edge.from.as_str()), distance.get(edge.to.as_str())) else {
                continue;
            };
            if dv != du + 1 {
                continue;
            }
            let Some(&gv) = goal_distance.get(edge.to.as_str()) else {
                continue;
            };
            if du + 1 + gv == target_distance {
                pruned.add_rule(edge.rule.clone());
            }
        }
        pruned
    }

    /// BFS bounded by hop count `depth`, returning the induced subgraph of
    /// every node reachable within `depth` hops and *every* edge whose
    /// source is within that budget. Unlike [`ClassGraph::shortest_paths`],
    /// a node's distance from one path doesn't exclude a longer path to the
    /// same node; Neighbourhood does no shortest-path pruning, only a
    /// hop-count bound.
    pub fn neighbourhood(&self, start: &str, depth: usize) -> ClassGraph {
        let mut distance: HashMap<&str, usize> = HashMap::new();
        distance.insert(start, 0);
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            let d = distance[node];
            if d >= depth {
                continue;
            }
            for edge in self.out_edges(node) {
                if !distance.contains_key(edge.to.as_str()) {
                    distance.insert(&edge.to, d + 1);
                    queue.push_back(&edge.to);
                }
            }
        }

        let mut pruned = ClassGraph::new();
        if let Some(class) = self.nodes.get(start) {
            pruned.ensure_node(class);
        }
        for edge in &self.edges {
            if let Some(&du) = distance.get(edge.from.as_str()) {
                if du < depth {
                    pruned.add_rule(edge.rule.clone());
                }
            }
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, start: &str, goal: &str) -> Rule {
        Rule {
            name: name.to_string(),
            start: Class::new("mock", start, ""),
            goal: Class::new("mock", goal, ""),
            template: "{{.}}".to_string(),
        }
    }

    #[test]
    fn shortest_paths_prunes_unreachable_edges() {
        // a -> b -> c, and a -> c directly; goal = c.
        let rules = vec![rule("ab", "a", "b"), rule("bc", "b", "c"), rule("ac", "a", "c")];
        let graph = ClassGraph::from_rules(&rules);
        let goals: HashSet<String> = ["mock:c".to_string()].into_iter().collect();
        let pruned = graph.shortest_paths("mock:a", &goals);
        // Both paths a->c (direct) and a->b->c are shortest-path-reachable
        // only if they have equal length; here a->c (len 1) is strictly
        // shorter than a->b->c (len 2), so only the direct edge survives.
        assert_eq!(pruned.edges().len(), 1);
        assert_eq!(pruned.edges()[0].to, "mock:c");
    }

    #[test]
    fn shortest_paths_keeps_equal_length_paths() {
        let rules = vec![rule("ab", "a", "b"), rule("ac", "a", "c")];
        let graph = ClassGraph::from_rules(&rules);
        let goals: HashSet<String> = ["mock:b".to_string(), "mock:c".to_string()].into_iter().collect();
        let pruned = graph.shortest_paths("mock:a", &goals);
        assert_eq!(pruned.edges().len(), 2);
    }

    #[test]
    fn shortest_paths_drops_dead_end_branch_off_the_shortest_path() {
        // a -> b, a -> goal, b -> x; goal = goal. The direct edge a->goal is
        // the only shortest path; a->b and b->x dangle off a dead end and
        // must not survive pruning even though dist(b) == dist(a) + 1.
        let rules = vec![rule("ab", "a", "b"), rule("ag", "a", "goal"), rule("bx", "b", "x")];
        let graph = ClassGraph::from_rules(&rules);
        let goals: HashSet<String> = ["mock:goal".to_string()].into_iter().collect();
        let pruned = graph.shortest_paths("mock:a", &goals);
        assert_eq!(pruned.edges().len(), 1);
        assert_eq!(pruned.edges()[0].to, "mock:goal");
    }

    #[test]
    fn shortest_paths_with_no_goal_reachable_yields_isolated_start() {
        let rules = vec![rule("ab", "a", "b")];
        let graph = ClassGraph::from_rules(&rules);
        let goals: HashSet<String> = ["mock:z".to_string()].into_iter().collect();
        let pruned = graph.shortest_paths("mock:a", &goals);
        assert!(pruned.edges().is_empty());
        assert!(pruned.node_for("mock:a").is_some());
    }

    #[test]
    fn neighbourhood_bounds_by_hop_count() {
        let rules = vec![rule("ab", "a", "b"), rule("bc", "b", "c")];
        let graph = ClassGraph::from_rules(&rules);
        let depth0 = graph.neighbourhood("mock:a", 0);
        assert!(depth0.edges().is_empty());
        assert!(depth0.node_for("mock:a").is_some());

        let depth1 = graph.neighbourhood("mock:a", 1);
        assert_eq!(depth1.edges().len(), 1);

        let depth2 = graph.neighbourhood("mock:a", 2);
        assert_eq!(depth2.edges().len(), 2);
    }

    #[test]
    fn out_edges_preserve_registration_order() {
        let rules = vec![rule("r1", "a", "b"), rule("r2", "a", "c"), rule("r3", "a", "b")];
        let graph = ClassGraph::from_rules(&rules);
        let names: Vec<_> = graph.out_edges("mock:a").map(|e| e.rule.name.clone()).collect();
        assert_eq!(names, vec!["r1", "r2", "r3"]);
    }
}
