use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, CounterVec, Encoder, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP
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

    // AI generation
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_requests_total",
        "Total number of AI completion requests",
        &["kind", "status"]
    )
    .unwrap();

    pub static ref AI_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ai_request_duration_seconds",
        "AI completion duration in seconds",
        &["kind"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0]
    )
    .unwrap();

    /// Hits are questions served from the dialogue history without an AI call.
    pub static ref QUESTION_CACHE: CounterVec = register_counter_vec!(
        "question_cache",
        "Question cache hits and misses",
        &["result"]
    )
    .unwrap();

    // Business
    pub static ref ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_total",
        "Attempt lifecycle events",
        &["event"]
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounter = register_int_counter!(
        "answers_submitted_total",
        "Total number of answers submitted"
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

pub fn record_cache_hit() {
    QUESTION_CACHE.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    QUESTION_CACHE.with_label_values(&["miss"]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_in_text_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .inc();
        record_cache_hit();

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("question_cache"));
    }
}
