//! Data trigger predicate.
//!
//! Decides whether the worker should run one unit of media processing. The
//! decision is computed from per-port occupancy snapshots rather than
//! signalled blindly, so a trigger never fires on a half-finished port
//! transition.

use crate::port::PortDirection;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// How port readiness is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    /// Every qualifying port must reach its watermark.
    #[default]
    All,
    /// One qualifying port at its watermark is enough.
    Any,
}

/// Occupancy snapshot of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortReadiness {
    /// Port direction.
    pub direction: PortDirection,
    /// Whether the port is enabled.
    pub enabled: bool,
    /// Whether an enable, disable or flush is outstanding.
    pub in_transition: bool,
    /// Buffers available for dequeue.
    pub available: usize,
    /// Buffers required before the port counts as ready.
    pub watermark: usize,
    /// End of stream observed on the port.
    pub eos: bool,
}

impl PortReadiness {
    /// Whether the port takes part in the decision.
    pub fn qualifies(&self) -> bool {
        self.enabled && !self.in_transition
    }

    /// Whether the port reached its watermark.
    pub fn at_watermark(&self) -> bool {
        self.available >= self.watermark
    }
}

/// Evaluate the trigger predicate over all ports.
///
/// End of stream on a qualifying input port always fires so remaining data
/// drains. With no qualifying port the trigger never fires.
pub fn should_notify(ports: &[PortReadiness], mode: NotifyMode) -> bool {
    let mut qualifying = ports.iter().filter(|p| p.qualifies()).peekable();
    if qualifying.peek().is_none() {
        return false;
    }

    let mut any_ready = false;
    let mut all_ready = true;
    for port in qualifying {
        if port.eos && port.direction == PortDirection::Input {
            return true;
        }
        if port.at_watermark() {
            any_ready = true;
        } else {
            all_ready = false;
        }
    }

    match mode {
        NotifyMode::Any => any_ready,
        NotifyMode::All => all_ready,
    }
}

/// One-shot override that fires the trigger once regardless of occupancy.
///
/// Set from any thread, consumed by the worker.
#[derive(Debug, Default)]
pub struct ForceNotify(AtomicBool);

impl ForceNotify {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Arm the override.
    pub fn arm(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the override is armed.
    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Consume the override. Returns true at most once per `arm`.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(available: usize, watermark: usize) -> PortReadiness {
        PortReadiness {
            direction: PortDirection::Input,
            enabled: true,
            in_transition: false,
            available,
            watermark,
            eos: false,
        }
    }

    #[test]
    fn test_all_mode_requires_every_port() {
        let ports = [port(1, 1), port(2, 2)];
        assert!(should_notify(&ports, NotifyMode::All));

        let ports = [port(1, 1), port(1, 2)];
        assert!(!should_notify(&ports, NotifyMode::All));
    }

    #[test]
    fn test_any_mode_needs_one_port() {
        let ports = [port(0, 1), port(2, 2)];
        assert!(should_notify(&ports, NotifyMode::Any));

        let ports = [port(0, 1), port(1, 2)];
        assert!(!should_notify(&ports, NotifyMode::Any));
    }

    #[test]
    fn test_non_qualifying_ports_ignored() {
        let mut disabled = port(0, 1);
        disabled.enabled = false;
        let mut moving = port(0, 1);
        moving.in_transition = true;

        assert!(should_notify(&[port(1, 1), disabled, moving], NotifyMode::All));
        assert!(!should_notify(&[disabled, moving], NotifyMode::Any));
        assert!(!should_notify(&[], NotifyMode::All));
    }

    #[test]
    fn test_input_eos_always_fires() {
        let mut eos = port(0, 4);
        eos.eos = true;
        assert!(should_notify(&[eos, port(0, 1)], NotifyMode::All));
        assert!(should_notify(&[eos], NotifyMode::Any));
    }

    #[test]
    fn test_output_eos_does_not_force() {
        let mut out = port(0, 1);
        out.direction = PortDirection::Output;
        out.eos = true;
        assert!(!should_notify(&[out], NotifyMode::All));
    }

    #[test]
    fn test_eos_on_disabled_port_ignored() {
        let mut eos = port(0, 1);
        eos.eos = true;
        eos.enabled = false;
        assert!(!should_notify(&[eos, port(0, 1)], NotifyMode::Any));
    }

    #[test]
    fn test_single_port_below_watermark_suppresses() {
        // Every combination of three ports, each either at or below watermark.
        for mask in 0u8..8 {
            let ports: Vec<_> = (0..3)
                .map(|i| if mask & (1 << i) != 0 { port(2, 2) } else { port(1, 2) })
                .collect();
            assert_eq!(should_notify(&ports, NotifyMode::All), mask == 0b111);
            assert_eq!(should_notify(&ports, NotifyMode::Any), mask != 0);
        }
    }

    #[test]
    fn test_force_notify_is_one_shot() {
        let force = ForceNotify::new();
        assert!(!force.take());
        force.arm();
        assert!(force.is_armed());
        assert!(force.take());
        assert!(!force.take());
    }
}
