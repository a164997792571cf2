use anyhow::Result;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metrics collection and management
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Store metrics
    pub store_operations_total: &'static str,
    pub store_operation_duration: &'static str,
    pub warranties_loaded: &'static str,
    pub warranties_created_total: &'static str,

    // Image upload metrics
    pub uploads_total: &'static str,
    pub upload_size_bytes: &'static str,

    // Reminder metrics
    pub reminders_total: &'static str,

    // Realtime metrics
    pub realtime_transitions_total: &'static str,
    pub realtime_refetches_total: &'static str,

    // Error metrics
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            store_operations_total: "warranty_watch_store_operations_total",
            store_operation_duration: "warranty_watch_store_operation_duration_seconds",
            warranties_loaded: "warranty_watch_warranties_loaded",
            warranties_created_total: "warranty_watch_warranties_created_total",

            uploads_total: "warranty_watch_uploads_total",
            upload_size_bytes: "warranty_watch_upload_size_bytes",

            reminders_total: "warranty_watch_reminders_total",

            realtime_transitions_total: "warranty_watch_realtime_transitions_total",
            realtime_refetches_total: "warranty_watch_realtime_refetches_total",

            errors_total: "warranty_watch_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Initialize metrics collection
    pub fn init() -> Result<()> {
        metrics::set_global_recorder(metrics::NoopRecorder)
            .map_err(|e| anyhow::anyhow!("Failed to initialize metrics recorder: {}", e))?;

        Ok(())
    }

    /// Record a repository round trip. Failures are counted in
    /// `errors_total` by the caller, not here.
    pub fn record_store_operation(&self, operation: &str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };

        counter!(self.store_operations_total, "operation" => operation.to_string(), "status" => status)
            .increment(1);
        histogram!(self.store_operation_duration, "operation" => operation.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record the size of the in-memory collection after a load
    pub fn record_loaded(&self, count: usize) {
        gauge!(self.warranties_loaded).set(count as f64);
    }

    /// Record a completed create workflow
    pub fn record_created(&self, with_image: bool) {
        counter!(self.warranties_created_total, "image" => if with_image { "yes" } else { "no" })
            .increment(1);
    }

    /// Record a successful image upload
    pub fn record_upload(&self, size_bytes: usize) {
        counter!(self.uploads_total).increment(1);
        histogram!(self.upload_size_bytes).record(size_bytes as f64);
    }

    /// Record a reminder outcome: scheduled, skipped or failed
    pub fn record_reminder(&self, outcome: &'static str) {
        counter!(self.reminders_total, "outcome" => outcome).increment(1);
    }

    /// Record a realtime connection-state transition
    pub fn record_realtime_transition(&self, state: &'static str) {
        counter!(self.realtime_transitions_total, "state" => state).increment(1);
    }

    /// Record a refetch triggered by a change event
    pub fn record_realtime_refetch(&self) {
        counter!(self.realtime_refetches_total).increment(1);
    }

    /// Record error metrics
    pub fn record_error(&self, error_type: &str, operation: &str) {
        counter!(
            self.errors_total,
            "type" => error_type.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

/// Performance timing wrapper for metrics
pub struct MetricsTimer {
    collector: MetricsCollector,
    operation: &'static str,
    start: std::time::Instant,
}

impl MetricsTimer {
    pub fn new(collector: MetricsCollector, operation: &'static str) -> Self {
        Self {
            collector,
            operation,
            start: std::time::Instant::now(),
        }
    }

    pub fn finish(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        self.collector
            .record_store_operation(self.operation, duration, success);
        duration
    }
}
