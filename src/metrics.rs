use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    pub static ref TRAVERSALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "correlate_engine_traversals_total",
        "total number of traversals started, by kind",
        &["kind"]
    )
    .unwrap();
    pub static ref EDGE_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "correlate_engine_edge_queries_total",
        "total number of unique edge queries executed, by rule and outcome",
        &["rule", "outcome"]
    )
    .unwrap();
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "correlate_engine_store_errors_total",
        "total number of store errors, by domain and error kind",
        &["domain", "kind"]
    )
    .unwrap();
    pub static ref TEMPLATE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "correlate_engine_template_errors_total",
        "total number of rule template render failures, by rule",
        &["rule"]
    )
    .unwrap();
    pub static ref EDGE_QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "correlate_engine_edge_query_duration_seconds",
        "wall-clock time to execute a single edge query against its stores",
        &["domain"]
    )
    .unwrap();
}
