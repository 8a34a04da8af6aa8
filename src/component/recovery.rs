//! Error recovery for failed commands and data passes.
//!
//! A failed command first undoes whatever it already changed on its ports,
//! then the failure is escalated as an error event. Resource pressure
//! leaves the component usable; invalid-state and timeout failures move it
//! to `Invalid`.

use super::{Shared, State};
use crate::error::Error;
use crate::event::ComponentEvent;
use crate::port::{PortManager, PortSet};

/// Port changes to undo after a command failed part way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum Rollback {
    /// Nothing was changed.
    #[default]
    None,
    /// Clear the in-transition flag on these ports.
    ClearTransition(PortSet),
    /// Close the transports this command opened.
    CloseTransports(PortSet),
    /// Undo a partial enable: disable `enabled`, close `opened`, clear the
    /// transition flag on `touched`.
    Disable {
        enabled: PortSet,
        opened: PortSet,
        touched: PortSet,
    },
    /// Undo a partial disable: enable `disabled` again, reopening their
    /// transports when `reopen` is set, and clear the transition flag on
    /// `touched`.
    Reenable {
        disabled: PortSet,
        reopen: bool,
        touched: PortSet,
    },
}

impl Rollback {
    /// Ports whose in-transition flag the failed command set.
    fn touched(&self) -> Option<&PortSet> {
        match self {
            Rollback::ClearTransition(touched)
            | Rollback::Disable { touched, .. }
            | Rollback::Reenable { touched, .. } => Some(touched),
            Rollback::None | Rollback::CloseTransports(_) => None,
        }
    }
}

/// A command failure with the undo it requires.
#[derive(Debug)]
pub(crate) struct CommandFailure {
    pub error: Error,
    pub rollback: Rollback,
}

impl CommandFailure {
    pub fn new(error: Error, rollback: Rollback) -> Self {
        Self { error, rollback }
    }
}

impl From<Error> for CommandFailure {
    fn from(error: Error) -> Self {
        Self::new(error, Rollback::None)
    }
}

/// How far an error escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    /// Report only; the client may retry later.
    Soft,
    /// Undo and report.
    Recoverable,
    /// Undo, report and enter `Invalid`.
    Fatal,
}

pub(crate) fn classify(error: &Error) -> Severity {
    match error {
        Error::DynamicResourcesUnavailable(_) => Severity::Soft,
        Error::Invalid(_) | Error::Timeout(_) => Severity::Fatal,
        _ => Severity::Recoverable,
    }
}

fn log_undo(what: &str, index: u32, result: crate::error::Result<()>) {
    if let Err(e) = result {
        tracing::warn!(port = index, "rollback {} failed: {}", what, e);
    }
}

/// Undo port changes.
pub(crate) fn rollback(ports: &PortManager, rollback: Rollback) {
    match rollback {
        Rollback::None => {}
        Rollback::ClearTransition(touched) => ports.set_transition(&touched, false),
        Rollback::CloseTransports(opened) => {
            for index in opened {
                log_undo("close", index, ports.close(index));
            }
        }
        Rollback::Disable {
            enabled,
            opened,
            touched,
        } => {
            for index in enabled {
                log_undo(
                    "disable",
                    index,
                    ports.with_port(index, |port| {
                        port.set_enabled(false);
                        Ok(())
                    }),
                );
            }
            for index in opened {
                log_undo("close", index, ports.close(index));
            }
            ports.set_transition(&touched, false);
        }
        Rollback::Reenable {
            disabled,
            reopen,
            touched,
        } => {
            for index in disabled {
                log_undo(
                    "enable",
                    index,
                    ports.with_port(index, |port| {
                        port.set_enabled(true);
                        Ok(())
                    }),
                );
                if reopen {
                    log_undo("reopen", index, ports.open(index).map(|_| ()));
                }
            }
            ports.set_transition(&touched, false);
        }
    }
}

/// Undo a failed command and build the error event to report.
pub(crate) fn recover(shared: &Shared, failure: CommandFailure) -> ComponentEvent {
    let severity = classify(&failure.error);
    tracing::warn!(severity = ?severity, "command failed: {}", failure.error);
    if severity != Severity::Soft {
        rollback(&shared.ports, failure.rollback);
    } else if let Some(touched) = failure.rollback.touched() {
        // Soft failures keep acquired resources, but the ports rejoin the
        // trigger.
        shared.ports.set_transition(touched, false);
    }
    escalate(shared, failure.error, severity)
}

/// Escalate an error raised outside a command, e.g. by a data pass.
pub(crate) fn recover_data(shared: &Shared, error: Error) -> ComponentEvent {
    let severity = classify(&error);
    tracing::warn!(severity = ?severity, "data processing failed: {}", error);
    escalate(shared, error, severity)
}

fn escalate(shared: &Shared, error: Error, severity: Severity) -> ComponentEvent {
    shared.metrics.record_error();
    if severity == Severity::Fatal && shared.state() != State::Invalid {
        shared.set_state(State::Invalid);
        tracing::error!(component = %shared.config.name, "component entered Invalid: {}", error);
    }
    ComponentEvent::error(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferHeader;
    use crate::config::PortConfig;
    use crate::dio::{DioContext, DioRegistry};
    use crate::port::Port;
    use smallvec::smallvec;
    use std::sync::Arc;

    fn ports(n: u32) -> PortManager {
        let registry = DioRegistry::builtin();
        let ports = (0..n)
            .map(|index| {
                let config = PortConfig::input();
                let dio = registry
                    .create(
                        "ring",
                        DioContext {
                            port_index: index,
                            direction: config.direction,
                            props: config.props.clone(),
                            sink: Arc::new(|_h: BufferHeader| {}),
                        },
                    )
                    .unwrap();
                Port::new(index, &config, dio)
            })
            .collect();
        PortManager::new(0, ports)
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&Error::DynamicResourcesUnavailable("vpu".into())),
            Severity::Soft
        );
        assert_eq!(classify(&Error::Timeout("idle".into())), Severity::Fatal);
        assert_eq!(classify(&Error::Invalid("gone".into())), Severity::Fatal);
        assert_eq!(
            classify(&Error::InsufficientResources("full".into())),
            Severity::Recoverable
        );
    }

    #[test]
    fn test_touched_ports() {
        assert_eq!(Rollback::None.touched(), None);
        assert_eq!(Rollback::CloseTransports(smallvec![0]).touched(), None);
        let rb = Rollback::Reenable {
            disabled: smallvec![],
            reopen: false,
            touched: smallvec![1],
        };
        assert_eq!(rb.touched().map(|t| t.as_slice()), Some(&[1][..]));
    }

    #[test]
    fn test_rollback_close_transports() {
        let mgr = ports(2);
        mgr.open(0).unwrap();
        mgr.open(1).unwrap();
        rollback(&mgr, Rollback::CloseTransports(smallvec![1]));
        assert!(mgr.dio(0).unwrap().is_open());
        assert!(!mgr.dio(1).unwrap().is_open());
    }

    #[test]
    fn test_rollback_disable_restores() {
        let mgr = ports(2);
        mgr.with_port(1, |p| {
            p.set_enabled(false);
            Ok(())
        })
        .unwrap();
        mgr.set_transition(&[0, 1], true);
        mgr.enable_port(1, None, true).unwrap();

        rollback(
            &mgr,
            Rollback::Disable {
                enabled: smallvec![1],
                opened: smallvec![1],
                touched: smallvec![0, 1],
            },
        );
        mgr.with_port(1, |p| {
            assert!(!p.is_enabled());
            assert!(!p.is_in_transition());
            assert!(!p.dio().is_open());
            Ok(())
        })
        .unwrap();
        assert!(mgr.with_port(0, |p| Ok(p.is_enabled())).unwrap());
    }

    #[test]
    fn test_rollback_reenable_reopens() {
        let mgr = ports(1);
        mgr.with_port(0, |p| {
            p.set_enabled(false);
            Ok(())
        })
        .unwrap();
        rollback(
            &mgr,
            Rollback::Reenable {
                disabled: smallvec![0],
                reopen: true,
                touched: smallvec![0],
            },
        );
        mgr.with_port(0, |p| {
            assert!(p.is_enabled());
            assert!(p.dio().is_open());
            Ok(())
        })
        .unwrap();
    }
}
