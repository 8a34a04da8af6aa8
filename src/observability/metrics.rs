//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const COMMANDS_PROCESSED: &str = "mediacomp_commands_processed";
const COMMANDS_FAILED: &str = "mediacomp_commands_failed";
const DATA_NOTIFICATIONS: &str = "mediacomp_data_notifications";
const BUFFERS_SUBMITTED: &str = "mediacomp_buffers_submitted";
const BUFFERS_RETURNED: &str = "mediacomp_buffers_returned";
const ERRORS_ESCALATED: &str = "mediacomp_errors_escalated";
const COMMANDS_QUEUED: &str = "mediacomp_commands_queued";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        COMMANDS_PROCESSED,
        Unit::Count,
        "Commands executed by the component worker"
    );
    metrics::describe_counter!(
        COMMANDS_FAILED,
        Unit::Count,
        "Commands whose execution ended in an error event"
    );
    metrics::describe_counter!(
        DATA_NOTIFICATIONS,
        Unit::Count,
        "Data notifications delivered to the processor"
    );
    metrics::describe_counter!(
        BUFFERS_SUBMITTED,
        Unit::Count,
        "Buffers queued into a port by the client"
    );
    metrics::describe_counter!(
        BUFFERS_RETURNED,
        Unit::Count,
        "Buffers handed back to the client"
    );
    metrics::describe_counter!(
        ERRORS_ESCALATED,
        Unit::Count,
        "Error events raised to the client"
    );
    metrics::describe_gauge!(
        COMMANDS_QUEUED,
        Unit::Count,
        "Commands waiting for the worker"
    );
}

/// Metrics handles for one component, labelled with its name.
#[derive(Clone)]
pub struct ComponentMetrics {
    commands_processed: Counter,
    commands_failed: Counter,
    data_notifications: Counter,
    buffers_submitted: Counter,
    buffers_returned: Counter,
    errors_escalated: Counter,
    commands_queued: Gauge,
}

impl ComponentMetrics {
    /// Create the handles for a component.
    pub fn new(component: &str) -> Self {
        Self {
            commands_processed: counter!(COMMANDS_PROCESSED, "component" => component.to_string()),
            commands_failed: counter!(COMMANDS_FAILED, "component" => component.to_string()),
            data_notifications: counter!(DATA_NOTIFICATIONS, "component" => component.to_string()),
            buffers_submitted: counter!(BUFFERS_SUBMITTED, "component" => component.to_string()),
            buffers_returned: counter!(BUFFERS_RETURNED, "component" => component.to_string()),
            errors_escalated: counter!(ERRORS_ESCALATED, "component" => component.to_string()),
            commands_queued: gauge!(COMMANDS_QUEUED, "component" => component.to_string()),
        }
    }

    /// Record a command run to completion.
    #[inline]
    pub fn record_command(&self, ok: bool) {
        self.commands_processed.increment(1);
        if !ok {
            self.commands_failed.increment(1);
        }
    }

    /// Record a data notification.
    #[inline]
    pub fn record_data_notify(&self) {
        self.data_notifications.increment(1);
    }

    /// Record a client submission.
    #[inline]
    pub fn record_submitted(&self) {
        self.buffers_submitted.increment(1);
    }

    /// Record a buffer handed back to the client.
    #[inline]
    pub fn record_returned(&self) {
        self.buffers_returned.increment(1);
    }

    /// Record an escalated error.
    #[inline]
    pub fn record_error(&self) {
        self.errors_escalated.increment(1);
    }

    /// Record the command queue depth.
    #[inline]
    pub fn record_queue_depth(&self, depth: usize) {
        self.commands_queued.set(depth as f64);
    }
}

impl std::fmt::Debug for ComponentMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_recording_without_recorder() {
        let m = ComponentMetrics::new("test");
        m.record_command(true);
        m.record_command(false);
        m.record_data_notify();
        m.record_submitted();
        m.record_returned();
        m.record_error();
        m.record_queue_depth(3);
    }
}
