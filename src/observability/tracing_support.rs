//! Tracing spans for the component worker.

use tracing::{Level, Span, span};

/// Create a span for a component's worker thread.
///
/// # Example
///
/// ```rust,ignore
/// use mediacomp::observability::span_component;
///
/// let span = span_component("vdec", 1);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_component(name: &str, instance: u64) -> Span {
    span!(Level::INFO, "component", name = %name, instance = instance)
}

/// Create a span for one command execution.
#[inline]
pub fn span_command(kind: &str, param: u32) -> Span {
    span!(Level::DEBUG, "command", kind = %kind, param = param)
}

/// Enter a component span and return the guard.
pub fn instrument_component(name: &str, instance: u64) -> tracing::span::EnteredSpan {
    span_component(name, instance).entered()
}
