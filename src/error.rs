//! Error types for mediacomp.

use crate::buffer::BufferHeader;
use thiserror::Error;

/// Result type alias using mediacomp's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for component operations.
///
/// The variants mirror the OMX IL error taxonomy. Errors raised while the
/// worker executes a queued command never reach a caller; they are delivered
/// through the client's error event instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A parameter was out of range or malformed.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// A versioned structure did not match the component's spec version.
    #[error("version mismatch: {0}")]
    VersionMismatch(String),

    /// The call is not valid in the component's or port's current state.
    #[error("incorrect state operation: {0}")]
    IncorrectStateOperation(String),

    /// The requested state transition is not allowed.
    #[error("incorrect state transition: {0}")]
    IncorrectStateTransition(String),

    /// The component is already in the requested state.
    #[error("component already in state {0}")]
    SameState(String),

    /// The parameter value is recognized but not supported.
    #[error("unsupported setting: {0}")]
    UnsupportedSetting(String),

    /// The parameter or config index is not known.
    #[error("unsupported index: {0}")]
    UnsupportedIndex(String),

    /// No port exists at the given index.
    #[error("bad port index: {0}")]
    BadPortIndex(u32),

    /// A bounded resource (queue slot, buffer slot) is exhausted.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// A shared resource is temporarily unavailable; the client may retry.
    #[error("dynamic resources unavailable: {0}")]
    DynamicResourcesUnavailable(String),

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Internal or unexpected failure.
    #[error("undefined error: {0}")]
    Undefined(String),

    /// The component has entered an unrecoverable condition.
    #[error("component invalid: {0}")]
    Invalid(String),
}

impl Error {
    /// OMX IL numeric code for this error kind.
    pub fn code(&self) -> u32 {
        match self {
            Error::InsufficientResources(_) => 0x8000_1000,
            Error::Undefined(_) => 0x8000_1001,
            Error::BadParameter(_) => 0x8000_1005,
            Error::UnsupportedIndex(_) => 0x8000_101A,
            Error::BadPortIndex(_) => 0x8000_101B,
            Error::UnsupportedSetting(_) => 0x8000_1019,
            Error::Invalid(_) => 0x8000_100A,
            Error::Timeout(_) => 0x8000_1011,
            Error::SameState(_) => 0x8000_1012,
            Error::IncorrectStateTransition(_) => 0x8000_1017,
            Error::IncorrectStateOperation(_) => 0x8000_1018,
            Error::VersionMismatch(_) => 0x8000_100F,
            Error::DynamicResourcesUnavailable(_) => 0x8000_1014,
        }
    }

    /// Whether the error is the soft, retryable resource-pressure condition.
    pub fn is_resource_pressure(&self) -> bool {
        matches!(self, Error::DynamicResourcesUnavailable(_))
    }
}

/// A buffer handed to the component that it refused to take.
///
/// Ownership of the header goes back to the caller together with the reason,
/// so a rejected buffer is never silently dropped.
#[derive(Error, Debug)]
#[error("buffer rejected: {error}")]
pub struct BufferRejected {
    /// Why the buffer was refused.
    pub error: Error,
    /// The header, still owned by the caller.
    pub header: BufferHeader,
}

impl BufferRejected {
    /// Bundle a header with the reason it was refused.
    pub fn new(error: Error, header: BufferHeader) -> Self {
        Self { error, header }
    }

    /// Drop the header and keep only the error.
    pub fn into_error(self) -> Error {
        self.error
    }
}

impl From<BufferRejected> for Error {
    fn from(rejected: BufferRejected) -> Self {
        rejected.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            Error::BadParameter(String::new()),
            Error::VersionMismatch(String::new()),
            Error::IncorrectStateOperation(String::new()),
            Error::IncorrectStateTransition(String::new()),
            Error::SameState(String::new()),
            Error::UnsupportedSetting(String::new()),
            Error::UnsupportedIndex(String::new()),
            Error::BadPortIndex(0),
            Error::InsufficientResources(String::new()),
            Error::DynamicResourcesUnavailable(String::new()),
            Error::Timeout(String::new()),
            Error::Undefined(String::new()),
            Error::Invalid(String::new()),
        ];
        let mut codes: Vec<u32> = errors.iter().map(Error::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_resource_pressure() {
        assert!(Error::DynamicResourcesUnavailable("vpu".into()).is_resource_pressure());
        assert!(!Error::InsufficientResources("queue".into()).is_resource_pressure());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Error::BadPortIndex(7)), "bad port index: 7");
    }
}
