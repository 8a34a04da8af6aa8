//! Parameter and config records exchanged with the client.

use crate::error::{Error, Result};
use crate::port::{MemoryKind, PortDirection};
use crate::trigger::NotifyMode;
use bytes::Bytes;
use std::fmt;

/// Four-part version record carried by versioned structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Revision.
    pub revision: u8,
    /// Step.
    pub step: u8,
}

impl Version {
    /// Create a version record.
    pub const fn new(major: u8, minor: u8, revision: u8, step: u8) -> Self {
        Self {
            major,
            minor,
            revision,
            step,
        }
    }

    /// Check that a client structure is compatible with this component.
    ///
    /// Major and minor must match; revision and step are informational.
    pub fn check(&self) -> Result<()> {
        if self.major != SPEC_VERSION.major || self.minor != SPEC_VERSION.minor {
            return Err(Error::VersionMismatch(format!(
                "structure version {} incompatible with {}",
                self, SPEC_VERSION
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.step
        )
    }
}

/// Interface version implemented by this runtime.
pub const SPEC_VERSION: Version = Version::new(1, 1, 2, 0);

/// Version of the runtime itself.
pub const COMPONENT_VERSION: Version = Version::new(0, 1, 0, 0);

/// Answer to `get_component_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    /// Component name.
    pub name: String,
    /// Runtime version.
    pub component_version: Version,
    /// Interface version.
    pub spec_version: Version,
    /// Process-unique instance id.
    pub instance_id: u64,
}

/// Definition of one port as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDefinition {
    /// Structure version.
    pub version: Version,
    /// Port index.
    pub port_index: u32,
    /// Direction (read-only).
    pub direction: PortDirection,
    /// Whether the port is enabled (read-only).
    pub enabled: bool,
    /// Whether the port holds its full buffer complement (read-only).
    pub populated: bool,
    /// Buffers currently registered on the port (read-only).
    pub registered: usize,
    /// Buffers the port is populated with.
    pub buffer_count: usize,
    /// Lower bound for `buffer_count` (read-only).
    pub min_buffer_count: usize,
    /// Minimum buffer size in bytes.
    pub buffer_size: usize,
    /// Memory region kind (read-only).
    pub memory: MemoryKind,
}

/// Parameter or config index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamIndex {
    /// Port definition of the given port.
    PortDefinition(u32),
    /// The component's active role.
    ComponentRole,
    /// Trigger combination mode.
    NotifyMode,
    /// Watermark of the given port.
    Watermark(u32),
    /// Index owned by the processing layer.
    Vendor(u32),
}

impl fmt::Display for ParamIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamIndex::PortDefinition(port) => write!(f, "PortDefinition({})", port),
            ParamIndex::ComponentRole => write!(f, "ComponentRole"),
            ParamIndex::NotifyMode => write!(f, "NotifyMode"),
            ParamIndex::Watermark(port) => write!(f, "Watermark({})", port),
            ParamIndex::Vendor(code) => write!(f, "Vendor({:#x})", code),
        }
    }
}

/// Value of a parameter or config index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Port definition.
    PortDefinition(PortDefinition),
    /// Role name.
    ComponentRole(String),
    /// Trigger combination mode.
    NotifyMode(NotifyMode),
    /// Port watermark.
    Watermark(usize),
    /// Opaque processing-layer payload.
    Vendor(Bytes),
}

impl ParamValue {
    /// Whether the value has the shape `index` expects.
    pub fn matches(&self, index: ParamIndex) -> bool {
        matches!(
            (index, self),
            (ParamIndex::PortDefinition(_), ParamValue::PortDefinition(_))
                | (ParamIndex::ComponentRole, ParamValue::ComponentRole(_))
                | (ParamIndex::NotifyMode, ParamValue::NotifyMode(_))
                | (ParamIndex::Watermark(_), ParamValue::Watermark(_))
                | (ParamIndex::Vendor(_), ParamValue::Vendor(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_check() {
        assert!(SPEC_VERSION.check().is_ok());
        assert!(Version::new(1, 1, 0, 9).check().is_ok());
        assert!(matches!(
            Version::new(1, 2, 2, 0).check(),
            Err(Error::VersionMismatch(_))
        ));
        assert!(Version::new(2, 1, 2, 0).check().is_err());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(SPEC_VERSION.to_string(), "1.1.2.0");
    }

    #[test]
    fn test_value_matches_index() {
        assert!(ParamValue::Watermark(2).matches(ParamIndex::Watermark(0)));
        assert!(!ParamValue::Watermark(2).matches(ParamIndex::NotifyMode));
        assert!(ParamValue::Vendor(Bytes::from_static(b"x")).matches(ParamIndex::Vendor(7)));
    }
}
