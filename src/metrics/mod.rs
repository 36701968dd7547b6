//! Prometheus metrics for the publish queue
//!
//! This module provides metrics tracking for:
//! - Queue: items settled per outcome, whether a batch is active
//! - Approval: operator decisions
//! - Publishing: publish call duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all queue metrics
struct QueueMetrics {
    items: CounterVec,
    active: Gauge,
    decisions: CounterVec,
    publish_duration: Histogram,
}

/// Global storage for queue metrics
static QUEUE_METRICS: OnceLock<QueueMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = autopost::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = QueueMetrics {
        items: register_counter_vec!(
            "autopost_queue_items_total",
            "Work items settled, by outcome",
            &["outcome"]
        )?,
        active: register_gauge!(
            "autopost_queue_active",
            "Whether a batch is currently active (1 = yes, 0 = no)"
        )?,
        decisions: register_counter_vec!(
            "autopost_approval_decisions_total",
            "Operator decisions received, by decision",
            &["decision"]
        )?,
        publish_duration: register_histogram!(
            "autopost_publish_duration_seconds",
            "Time spent in the publish target in seconds",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
    };

    QUEUE_METRICS
        .set(metrics)
        .map_err(|_| "Queue metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    QUEUE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a settled work item
pub fn record_item(outcome: &str) {
    if let Some(m) = QUEUE_METRICS.get() {
        m.items.with_label_values(&[outcome]).inc();
    }
}

/// Update the active-batch gauge
pub fn set_queue_active(active: bool) {
    if let Some(m) = QUEUE_METRICS.get() {
        m.active.set(if active { 1.0 } else { 0.0 });
    }
}

/// Record an operator decision
pub fn record_decision(decision: &str) {
    if let Some(m) = QUEUE_METRICS.get() {
        m.decisions.with_label_values(&[decision]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a publish timer
pub fn start_publish_timer() -> MetricsTimer {
    match QUEUE_METRICS.get() {
        Some(m) => MetricsTimer::new(m.publish_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
