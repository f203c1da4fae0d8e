//! Goals and Neighbourhood correlation traversal.

use crate::aggregate::Appender;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::graph::{ClassGraph, Edge};
use crate::object::ObjectRef;
use crate::query::{Constraint, Query};
use crate::result::{EdgeQuery, EdgeResult, NodeResult, ResultGraph};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables for a single traversal run.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Bounded fan-out size for concurrent edge-query execution within a
    /// layer. Ignored when `synchronous` is set.
    pub concurrency: usize,
    /// Serialises all fan-out (rule order = registration order, store
    /// fan-out = registration order) for deterministic tests,
    pub synchronous: bool,
    /// When set, any edge error aborts the whole traversal. When unset
    /// (default), a recoverable error is logged and the edge's affected
    /// query is recorded with a count of zero; the traversal continues.
    pub strict: bool,
    /// Per-store-call deadline. `None` means no per-call timeout.
    pub per_store_timeout: Option<Duration>,
    /// Optional per-node cap; excess objects are dropped and the node's
    /// `truncated` flag is set.
    pub max_objects_per_node: Option<usize>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        TraversalConfig {
            concurrency: num_cpus(),
            synchronous: false,
            strict: false,
            per_store_timeout: None,
            max_objects_per_node: None,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// A traversal that didn't run to completion: the graph built before the
/// failure, plus the error that stopped it. Cancellation and, in
/// strict mode, the first edge error both surface this way instead of
/// discarding whatever was already correlated.
#[derive(thiserror::Error)]
#[error("traversal stopped: {source}")]
pub struct TraversalError {
    pub partial: ResultGraph,
    #[source]
    pub source: EngineError,
}

impl std::fmt::Debug for TraversalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalError").field("source", &self.source).finish()
    }
}

/// Runs a Goals traversal: start query, pruned to the shortest-path subgraph
/// reaching any class in `goals`.
pub async fn goals(
    engine: &Engine,
    start_query: Query,
    goal_classes: &HashSet<String>,
    constraint: Option<Constraint>,
    config: TraversalConfig,
    cancel: CancellationToken,
) -> Result<ResultGraph, TraversalError> {
    crate::metrics::TRAVERSALS_TOTAL.with_label_values(&["goals"]).inc();
    let start_class = start_query.full_class_name();
    let pruned = engine.class_graph().shortest_paths(&start_class, goal_classes);
    run(engine, &pruned, start_query, constraint, &config, &cancel).await
}

/// Runs a Neighbourhood traversal: start query, bounded by hop count `depth`,
/// no pruning to any goal set.
pub async fn neighbourhood(
    engine: &Engine,
    start_query: Query,
    depth: usize,
    constraint: Option<Constraint>,
    config: TraversalConfig,
    cancel: CancellationToken,
) -> Result<ResultGraph, TraversalError> {
    crate::metrics::TRAVERSALS_TOTAL.with_label_values(&["neighbourhood"]).inc();
    let start_class = start_query.full_class_name();
    let pruned = engine.class_graph().neighbourhood(&start_class, depth);
    run(engine, &pruned, start_query, constraint, &config, &cancel).await
}

/// One rendered, not-yet-executed query for an edge, plus the shared
/// rule/start/goal identity needed to assemble its [`EdgeResult`].
struct EdgeWork<'g> {
    edge: &'g Edge,
    queries: Vec<Query>,
}

async fn run(
    engine: &Engine,
    graph: &ClassGraph,
    start_query: Query,
    constraint: Option<Constraint>,
    config: &TraversalConfig,
    cancel: &CancellationToken,
) -> Result<ResultGraph, TraversalError> {
    let mut result = ResultGraph::new();
    let start_class = start_query.full_class_name();

    let start_objects = match engine.execute_query(&start_query, constraint.as_ref(), cancel, !config.strict).await {
        Ok(objects) => objects,
        Err(source) => return Err(TraversalError { partial: result, source }),
    };
    insert_node(&mut result, &start_class, constraint.as_ref(), config, start_objects);

    for layer in layered_edges(graph, &start_class) {
        if cancel.is_cancelled() {
            return Err(TraversalError { partial: result, source: EngineError::Cancelled });
        }

        let edge_works = match render_layer(engine, &result, &layer, config) {
            Ok(works) => works,
            Err(source) => return Err(TraversalError { partial: result, source }),
        };
        if edge_works.is_empty() {
            continue;
        }

        let jobs: Vec<(usize, usize, &Query)> = edge_works
            .iter()
            .enumerate()
            .flat_map(|(wi, work)| work.queries.iter().enumerate().map(move |(qi, q)| (wi, qi, q)))
            .collect();

        let outcomes = execute_jobs(engine, jobs, constraint.as_ref(), config, cancel).await;

        let mut counts: Vec<Vec<Option<usize>>> =
            edge_works.iter().map(|w| vec![None; w.queries.len()]).collect();
        let mut cancelled = false;

        for (wi, qi, outcome) in outcomes {
            match outcome {
                Ok(objects) => {
                    crate::metrics::EDGE_QUERIES_TOTAL
                        .with_label_values(&[edge_works[wi].edge.rule.name.as_str(), "ok"])
                        .inc();
                    counts[wi][qi] = Some(objects.len());
                    let to_class = edge_works[wi].edge.to.clone();
                    insert_node(&mut result, &to_class, constraint.as_ref(), config, objects);
                }
                Err(EngineError::Cancelled) => {
                    // Cancellation always aborts, regardless of strict/best-effort:
                    // it's not a per-edge reliability concern, it's "stop now".
                    cancelled = true;
                }
                Err(err) => {
                    crate::metrics::EDGE_QUERIES_TOTAL
                        .with_label_values(&[edge_works[wi].edge.rule.name.as_str(), "error"])
                        .inc();
                    if config.strict {
                        return Err(TraversalError { partial: result, source: err });
                    }
                    tracing::warn!(
                        rule = edge_works[wi].edge.rule.name.as_str(),
                        error = %err,
                        "edge query failed, continuing in best-effort mode"
                    );
                    counts[wi][qi] = Some(0);
                }
            }
        }

        if cancelled {
            return Err(TraversalError { partial: result, source: EngineError::Cancelled });
        }

        for (wi, work) in edge_works.into_iter().enumerate() {
            let queries = work
                .queries
                .iter()
                .zip(counts[wi].iter())
                .map(|(q, c)| EdgeQuery {
                    query: q.to_wire_string(),
                    count: c.unwrap_or(0),
                })
                .collect();
            result.edges.push(EdgeResult {
                rule_name: work.edge.rule.name.clone(),
                start: work.edge.from.clone(),
                goal: work.edge.to.clone(),
                queries,
            });
        }
    }

    Ok(result)
}

fn insert_node(
    result: &mut ResultGraph,
    class_name: &str,
    constraint: Option<&Constraint>,
    config: &TraversalConfig,
    objects: Vec<ObjectRef>,
) {
    let node = result.nodes.entry(class_name.to_string()).or_insert_with(|| {
        let mut node_constraint = constraint.cloned();
        if let Some(max) = config.max_objects_per_node {
            let limit = node_constraint.as_ref().and_then(|c| c.limit).map_or(max, |l| l.min(max));
            let mut c = node_constraint.take().unwrap_or_default();
            c.limit = Some(limit);
            node_constraint = Some(c);
        }
        NodeResult {
            class: class_name.to_string(),
            appender: std::sync::Arc::new(Appender::new(node_constraint)),
        }
    });
    for object in objects {
        node.appender.append(object);
    }
}

/// For each edge in `layer`, renders one query per object currently in the
/// edge's source node (in object insertion order), de-duplicating identical
/// rendered strings, preserving a stable "(object insertion index, rule
/// index)" ordering.
fn render_layer<'g>(
    engine: &Engine,
    result: &ResultGraph,
    layer: &[&'g Edge],
    config: &TraversalConfig,
) -> Result<Vec<EdgeWork<'g>>, EngineError> {
    let mut works = Vec::new();
    for &edge in layer {
        let Some(from_node) = result.node(&edge.from) else {
            continue;
        };
        let objects = from_node.objects();
        if objects.is_empty() {
            continue;
        }

        let mut queries = Vec::new();
        let mut seen = HashSet::new();
        for object in &objects {
            match edge.rule.instantiate(object, engine.templates()) {
                Ok(query) => {
                    if query.body().is_empty() {
                        continue;
                    }
                    if seen.insert(query.to_wire_string()) {
                        queries.push(query);
                    }
                }
                Err(err) => {
                    crate::metrics::TEMPLATE_ERRORS_TOTAL
                        .with_label_values(&[edge.rule.name.as_str()])
                        .inc();
                    if config.strict {
                        return Err(EngineError::Internal(err.to_string()));
                    }
                    tracing::warn!(rule = edge.rule.name.as_str(), error = %err, "rule template failed, skipping object");
                }
            }
        }
        if !queries.is_empty() {
            works.push(EdgeWork { edge, queries });
        }
    }
    Ok(works)
}

async fn execute_jobs<'a>(
    engine: &Engine,
    jobs: Vec<(usize, usize, &'a Query)>,
    constraint: Option<&Constraint>,
    config: &TraversalConfig,
    cancel: &CancellationToken,
) -> Vec<(usize, usize, Result<Vec<ObjectRef>, EngineError>)> {
    if config.synchronous {
        let mut out = Vec::with_capacity(jobs.len());
        for (wi, qi, query) in jobs {
            let outcome = if cancel.is_cancelled() {
                Err(EngineError::Cancelled)
            } else {
                run_one(engine, query, constraint, config, cancel).await
            };
            out.push((wi, qi, outcome));
        }
        out
    } else {
        stream::iter(jobs)
            .map(|(wi, qi, query)| async move {
                let outcome = if cancel.is_cancelled() {
                    Err(EngineError::Cancelled)
                } else {
                    run_one(engine, query, constraint, config, cancel).await
                };
                (wi, qi, outcome)
            })
            .buffer_unordered(config.concurrency.max(1))
            .collect()
            .await
    }
}

async fn run_one(
    engine: &Engine,
    query: &Query,
    constraint: Option<&Constraint>,
    config: &TraversalConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ObjectRef>, EngineError> {
    let fut = engine.execute_query(query, constraint, cancel, !config.strict);
    match config.per_store_timeout {
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::DeadlineExceeded),
        },
        None => fut.await,
    }
}

/// Groups `graph`'s edges by the BFS distance (from `start`) of each edge's
/// source class, giving the topological layers a traversal processes layer
/// by layer as a hard barrier. `graph` is acyclic by construction (edges only
/// ever run from a strictly lower to a strictly higher distance), so this
/// always
/// terminates and every edge is assigned to exactly one layer.
fn layered_edges<'g>(graph: &'g ClassGraph, start: &str) -> Vec<Vec<&'g Edge>> {
    let mut distance: HashMap<String, usize> = HashMap::new();
    distance.insert(start.to_string(), 0);
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());

    while let Some(node) = queue.pop_front() {
        let d = distance[&node];
        for edge in graph.out_edges(&node) {
            if !distance.contains_key(edge.to.as_str()) {
                distance.insert(edge.to.clone(), d + 1);
                queue.push_back(edge.to.clone());
            }
        }
    }

    let mut layers: Vec<Vec<&Edge>> = Vec::new();
    for edge in graph.edges() {
        if let Some(&d) = distance.get(edge.from.as_str()) {
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(edge);
        }
    }
    layers
}
