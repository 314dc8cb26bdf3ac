use crate::types::AttemptOutcome;
use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Cascade metrics
    pub static ref PROVIDER_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("provider_attempts_total", "Total vision provider attempts by outcome"),
        &["provider", "outcome"]
    ).unwrap();

    pub static ref PROVIDER_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "provider_attempt_duration_seconds",
            "Vision provider attempt latency in seconds"
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0]),
        &["provider"]
    ).unwrap();

    // Edge classifier metrics
    pub static ref EDGE_INFERENCES: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_inferences_total", "Total local classifier inferences by result"),
        &["result"]
    ).unwrap();

    pub static ref EDGE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "edge_inference_duration_seconds",
            "Local classifier inference latency in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5])
    ).unwrap();

    // Request-level metrics
    pub static ref DIAGNOSES: IntCounterVec = IntCounterVec::new(
        Opts::new("diagnoses_total", "Total diagnosis requests by result source"),
        &["source"]
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PROVIDER_ATTEMPTS.clone()),
        Box::new(PROVIDER_LATENCY.clone()),
        Box::new(EDGE_INFERENCES.clone()),
        Box::new(EDGE_LATENCY.clone()),
        Box::new(DIAGNOSES.clone()),
    ];

    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            tracing::warn!("Metric registration skipped: {}", e);
        }
    }

    tracing::info!("Metrics registry initialized with {} collectors", REGISTRY.gather().len());
}

pub fn record_attempt(provider: &str, outcome: AttemptOutcome, elapsed: Duration) {
    PROVIDER_ATTEMPTS
        .with_label_values(&[provider, outcome.as_str()])
        .inc();
    PROVIDER_LATENCY
        .with_label_values(&[provider])
        .observe(elapsed.as_secs_f64());
}

pub fn record_edge(result: &str, elapsed: Option<Duration>) {
    EDGE_INFERENCES.with_label_values(&[result]).inc();
    if let Some(elapsed) = elapsed {
        EDGE_LATENCY.observe(elapsed.as_secs_f64());
    }
}

pub fn record_diagnosis(source: &str) {
    DIAGNOSES.with_label_values(&[source]).inc();
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
