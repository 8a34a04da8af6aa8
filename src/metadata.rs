//! Buffer metadata types.

use std::time::Duration;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer marks end of stream.
    pub eos: bool,
    /// Buffer starts at a sync point (keyframe equivalent).
    pub sync_point: bool,
    /// Buffer ends a complete frame.
    pub end_of_frame: bool,
    /// Buffer carries codec configuration rather than media data.
    pub codec_config: bool,
    /// Buffer should be decoded but not rendered.
    pub decode_only: bool,
    /// Buffer data is known to be corrupt.
    pub data_corrupt: bool,
}

impl BufferFlags {
    /// Flags with only EOS set.
    pub fn eos() -> Self {
        Self {
            eos: true,
            ..Self::default()
        }
    }

    /// Check whether no flag is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A mark attached to a buffer by a `MarkBuffer` command.
///
/// When a marked buffer reaches the component named by `target`, that
/// component raises a mark event carrying `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkData {
    /// Name of the component that should report the mark.
    pub target: String,
    /// Opaque value echoed back in the mark event.
    pub payload: u64,
}

impl MarkData {
    /// Create a new mark.
    pub fn new(target: impl Into<String>, payload: u64) -> Self {
        Self {
            target: target.into(),
            payload,
        }
    }
}

/// Timing and flag metadata carried by a buffer header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub timestamp: Option<Duration>,
    /// Sequence number assigned by the producer.
    pub sequence: u64,
    /// Buffer flags.
    pub flags: BufferFlags,
    /// Mark to be reported by a downstream component.
    pub mark: Option<MarkData>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Mark as end of stream.
    pub fn with_eos(mut self) -> Self {
        self.flags.eos = true;
        self
    }

    /// Attach a mark.
    pub fn with_mark(mut self, mark: MarkData) -> Self {
        self.mark = Some(mark);
        self
    }

    /// Check the EOS flag.
    pub fn is_eos(&self) -> bool {
        self.flags.eos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::from_sequence(42)
            .with_timestamp(Duration::from_millis(40))
            .with_eos()
            .with_mark(MarkData::new("vdec", 9));

        assert_eq!(meta.sequence, 42);
        assert_eq!(meta.timestamp, Some(Duration::from_millis(40)));
        assert!(meta.is_eos());
        assert_eq!(meta.mark.as_ref().map(|m| m.payload), Some(9));
    }

    #[test]
    fn test_flags() {
        assert!(BufferFlags::default().is_empty());
        assert!(BufferFlags::eos().eos);
        assert!(!BufferFlags::eos().is_empty());
    }
}
