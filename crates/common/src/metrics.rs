use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Orchestrator metrics
    pub static ref ORDERS_PROCESSED: CounterVec = register_counter_vec!(
        "orders_processed_total",
        "Total number of orders handed to the orchestrator",
        &["status"]
    )
    .expect("metric cannot be created");

    // Store metrics
    pub static ref STORE_OPERATIONS: CounterVec = register_counter_vec!(
        "order_store_operations_total",
        "Total number of order store operations",
        &["operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "order_store_duration_seconds",
        "Order store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("metric cannot be created");

    // Cache metrics
    pub static ref CACHE_REQUESTS: CounterVec = register_counter_vec!(
        "cache_requests_total",
        "Total number of order cache lookups",
        &["status"]
    )
    .expect("metric cannot be created");

    pub static ref CACHE_ENTRIES: IntGauge = register_int_gauge!(
        "cache_entries",
        "Number of orders currently held in the cache"
    )
    .expect("metric cannot be created");

    // Query surface metrics
    pub static ref HTTP_QUERIES: CounterVec = register_counter_vec!(
        "http_queries_total",
        "Total number of order lookups served over HTTP",
        &["status"]
    )
    .expect("metric cannot be created");

    // Consumer metrics
    pub static ref CONSUMER_MESSAGES: CounterVec = register_counter_vec!(
        "consumer_messages_total",
        "Total number of consumed messages by outcome",
        &["outcome"]
    )
    .expect("metric cannot be created");
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// `status` is one of `persisted`, `replayed`, `duplicate_transaction`, `rejected` or `failed`
pub fn record_order_processed(status: &str) {
    ORDERS_PROCESSED.with_label_values(&[status]).inc();
}

pub fn record_store_operation(operation: &str, status: &str, duration_secs: f64) {
    STORE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    STORE_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

pub fn record_cache_request(hit: bool) {
    let status = if hit { "hit" } else { "miss" };
    CACHE_REQUESTS.with_label_values(&[status]).inc();
}

pub fn set_cache_entries(entries: usize) {
    CACHE_ENTRIES.set(entries as i64);
}

pub fn record_http_query(status: u16) {
    HTTP_QUERIES
        .with_label_values(&[&status.to_string()])
        .inc();
}

/// `outcome` is one of `committed`, `decode_error`, `process_error` or `commit_error`
pub fn record_consumer_message(outcome: &str) {
    CONSUMER_MESSAGES.with_label_values(&[outcome]).inc();
}
