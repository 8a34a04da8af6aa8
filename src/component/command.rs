//! Commands accepted by `send_command`.

use super::State;
use crate::metadata::MarkData;
use std::fmt;

/// Port parameter value that addresses every port.
pub const ALL_PORTS: u32 = 0xFFFF_FFFF;

/// A single port or all ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortTarget {
    /// One port by index.
    Port(u32),
    /// Every port of the component.
    All,
}

impl PortTarget {
    /// Raw parameter value (`ALL_PORTS` for `All`).
    pub fn as_u32(self) -> u32 {
        match self {
            PortTarget::Port(index) => index,
            PortTarget::All => ALL_PORTS,
        }
    }
}

impl From<u32> for PortTarget {
    fn from(value: u32) -> Self {
        if value == ALL_PORTS {
            PortTarget::All
        } else {
            PortTarget::Port(value)
        }
    }
}

impl fmt::Display for PortTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortTarget::Port(index) => write!(f, "port {}", index),
            PortTarget::All => f.write_str("all ports"),
        }
    }
}

/// Kind of a command, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Change state.
    StateSet,
    /// Disable ports.
    PortDisable,
    /// Enable ports.
    PortEnable,
    /// Flush ports.
    Flush,
    /// Mark the next buffer.
    MarkBuffer,
    /// Command this runtime does not know.
    Vendor,
}

impl CommandKind {
    /// Name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::StateSet => "StateSet",
            CommandKind::PortDisable => "PortDisable",
            CommandKind::PortEnable => "PortEnable",
            CommandKind::Flush => "Flush",
            CommandKind::MarkBuffer => "MarkBuffer",
            CommandKind::Vendor => "Vendor",
        }
    }
}

/// A control operation executed by the component's worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move to a new state.
    StateSet(State),
    /// Disable one or all ports.
    PortDisable(PortTarget),
    /// Enable one or all ports.
    PortEnable(PortTarget),
    /// Return all queued buffers of one or all ports.
    Flush(PortTarget),
    /// Attach a mark to the next buffer processed on a port.
    MarkBuffer {
        /// Port the mark applies to.
        port: u32,
        /// The mark.
        mark: MarkData,
    },
    /// Unrecognized command; logged and ignored.
    Vendor {
        /// Vendor command code.
        code: u32,
        /// Command parameter.
        param: u32,
    },
}

impl Command {
    /// Kind of the command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::StateSet(_) => CommandKind::StateSet,
            Command::PortDisable(_) => CommandKind::PortDisable,
            Command::PortEnable(_) => CommandKind::PortEnable,
            Command::Flush(_) => CommandKind::Flush,
            Command::MarkBuffer { .. } => CommandKind::MarkBuffer,
            Command::Vendor { .. } => CommandKind::Vendor,
        }
    }

    /// Integer parameter: target state ordinal, port index or `ALL_PORTS`.
    pub fn param(&self) -> u32 {
        match self {
            Command::StateSet(state) => *state as u32,
            Command::PortDisable(target) | Command::PortEnable(target) | Command::Flush(target) => {
                target.as_u32()
            }
            Command::MarkBuffer { port, .. } => *port,
            Command::Vendor { param, .. } => *param,
        }
    }

    /// Port target for port commands.
    pub fn port_target(&self) -> Option<PortTarget> {
        match self {
            Command::PortDisable(target) | Command::PortEnable(target) | Command::Flush(target) => {
                Some(*target)
            }
            Command::MarkBuffer { port, .. } => Some(PortTarget::Port(*port)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_target_sentinel() {
        assert_eq!(PortTarget::from(ALL_PORTS), PortTarget::All);
        assert_eq!(PortTarget::from(3), PortTarget::Port(3));
        assert_eq!(PortTarget::All.as_u32(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_command_param() {
        assert_eq!(Command::PortDisable(PortTarget::All).param(), ALL_PORTS);
        assert_eq!(Command::Flush(PortTarget::Port(1)).param(), 1);
        assert_eq!(Command::StateSet(State::Idle).kind(), CommandKind::StateSet);
        let mark = Command::MarkBuffer {
            port: 0,
            mark: MarkData::new("vdec", 1),
        };
        assert_eq!(mark.port_target(), Some(PortTarget::Port(0)));
        assert_eq!(Command::Vendor { code: 0x7F00_0001, param: 9 }.param(), 9);
    }
}
