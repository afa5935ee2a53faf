use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SAMPLES_GENERATED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_samples_generated_total",
        "Total telemetry samples produced by the generator"
    ))
    .unwrap();
    pub static ref SAMPLES_PERSISTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_samples_persisted_total",
        "Total samples accepted by the store"
    ))
    .unwrap();
    pub static ref SAMPLES_DROPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_samples_dropped_total",
        "Total samples dropped because persistence failed"
    ))
    .unwrap();
    pub static ref APPEND_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gcs_append_latency_seconds",
            "Time taken to persist one sample"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
    pub static ref DELIVERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_deliveries_total",
        "Total samples handed to live subscribers"
    ))
    .unwrap();
    pub static ref DELIVERY_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_delivery_failures_total",
        "Total per-subscriber delivery failures (lagging or disconnected)"
    ))
    .unwrap();
    pub static ref SUBSCRIBERS: Gauge = Gauge::with_opts(Opts::new(
        "gcs_subscribers",
        "Currently connected live subscribers"
    ))
    .unwrap();
    pub static ref RANGE_QUERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_range_queries_total",
        "Total range queries served"
    ))
    .unwrap();
    pub static ref RANGE_QUERIES_REJECTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gcs_range_queries_rejected_total",
        "Total range queries rejected for malformed parameters"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(SAMPLES_GENERATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SAMPLES_PERSISTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SAMPLES_DROPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APPEND_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(DELIVERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DELIVERY_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIBERS.clone()))?;
    REGISTRY.register(Box::new(RANGE_QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RANGE_QUERIES_REJECTED_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
