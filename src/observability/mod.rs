//! Observability: metrics and tracing.
//!
//! - **Metrics**: counters and gauges via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `mediacomp_commands_processed` | Counter | Commands executed by the worker |
//! | `mediacomp_commands_failed` | Counter | Commands that ended in an error event |
//! | `mediacomp_data_notifications` | Counter | Data notifications delivered to the processor |
//! | `mediacomp_buffers_submitted` | Counter | Buffers queued by the client |
//! | `mediacomp_buffers_returned` | Counter | Buffers handed back to the client |
//! | `mediacomp_errors_escalated` | Counter | Error events raised to the client |
//! | `mediacomp_commands_queued` | Gauge | Commands waiting for the worker |
//!
//! Every metric carries a `component` label.
//!
//! ## Tracing
//!
//! The worker thread runs inside a `component` span and each command inside
//! a `command` span.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mediacomp::observability::init_metrics;
//!
//! // Component::new calls this too; calling it first is harmless.
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{ComponentMetrics, init_metrics};
pub use tracing_support::{instrument_component, span_command, span_component};
