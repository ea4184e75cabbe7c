use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Learning API (oracle) Metrics
    pub static ref ORACLE_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "oracle_calls_total",
        "Total number of learning API calls",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref ORACLE_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "oracle_call_duration_seconds",
        "Learning API call duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // Engine Metrics
    pub static ref ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_total",
        "Total number of judged answer attempts",
        &["unit", "outcome"]
    )
    .unwrap();

    pub static ref DISCLOSURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "disclosures_total",
        "Total number of hint/solution disclosures",
        &["kind", "trigger"]
    )
    .unwrap();

    pub static ref FORCED_DISCLOSURE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "forced_disclosure_failures_total",
        "Forced solution disclosures whose recording call failed"
    )
    .unwrap();

    pub static ref REPORTS_FILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reports_filed_total",
        "Total number of problem reports filed",
        &["unit"]
    )
    .unwrap();

    pub static ref REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rejections_total",
        "Operations refused by the engine",
        &["reason"]
    )
    .unwrap();

    pub static ref EPISODES_ADVANCED_TOTAL: IntCounter = register_int_counter!(
        "episodes_advanced_total",
        "Total number of case episode advances"
    )
    .unwrap();

    pub static ref CASES_COMPLETED_TOTAL: IntCounter = register_int_counter!(
        "cases_completed_total",
        "Total number of completed cases"
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of interaction sessions currently held in memory"
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sse_connections_active",
        "Number of active SSE connections"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a learning API call with metrics
pub async fn track_oracle_call<F, T, E>(operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    ORACLE_CALLS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    ORACLE_CALL_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

/// Record an operation the engine refused
pub fn record_rejection(reason: &str) {
    REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = ATTEMPTS_TOTAL
            .with_label_values(&["task", "correct"])
            .get();
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let result = render_metrics();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("http_requests_total"));
    }

    #[tokio::test]
    async fn track_oracle_call_counts_failures() {
        let before = ORACLE_CALLS_TOTAL
            .with_label_values(&["metrics_test", "error"])
            .get();

        let result: Result<(), &str> = track_oracle_call("metrics_test", async { Err("down") }).await;

        assert!(result.is_err());
        assert_eq!(
            ORACLE_CALLS_TOTAL
                .with_label_values(&["metrics_test", "error"])
                .get(),
            before + 1
        );
    }
}
