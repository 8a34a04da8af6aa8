//! Buffer headers and their ownership tag.
//!
//! A [`BufferHeader`] is moved by value between the three parties that can
//! hold it: the client, the component runtime and the codec backend. Holding
//! the value is holding the buffer; the [`Owner`] tag travels with it and is
//! mirrored in the owning port's buffer table so the runtime can answer
//! ownership questions about buffers it does not currently hold.

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use bytes::BytesMut;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a buffer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Which party currently holds a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Held by the component runtime (queued on a port's transport).
    Component,
    /// Held by the external client.
    Client,
    /// Held by the codec backend.
    Codec,
}

impl Owner {
    /// Check whether a hand-off from `self` to `to` is legal.
    ///
    /// Every hand-off goes through the runtime: client and codec never
    /// exchange a buffer directly.
    pub fn can_transfer_to(self, to: Owner) -> bool {
        matches!(
            (self, to),
            (Owner::Client, Owner::Component)
                | (Owner::Component, Owner::Client)
                | (Owner::Component, Owner::Codec)
                | (Owner::Codec, Owner::Component)
        )
    }

    /// Validate a hand-off, returning the new owner.
    pub fn transfer(self, to: Owner) -> Result<Owner> {
        if self.can_transfer_to(to) {
            Ok(to)
        } else {
            Err(Error::IncorrectStateOperation(format!(
                "illegal buffer hand-off {:?} -> {:?}",
                self, to
            )))
        }
    }
}

/// A unit of media data plus its ownership tag.
pub struct BufferHeader {
    id: BufferId,
    port_index: u32,
    data: BytesMut,
    offset: usize,
    filled_len: usize,
    metadata: Metadata,
    owner: Owner,
    allocated: bool,
    platform_handle: Option<u64>,
}

impl BufferHeader {
    /// Wrap client-supplied storage (UseBuffer).
    pub(crate) fn from_client(port_index: u32, data: BytesMut) -> Self {
        Self {
            id: BufferId::next(),
            port_index,
            data,
            offset: 0,
            filled_len: 0,
            metadata: Metadata::new(),
            owner: Owner::Client,
            allocated: false,
            platform_handle: None,
        }
    }

    /// Allocate zeroed storage owned by the component (AllocateBuffer).
    pub(crate) fn allocate(port_index: u32, size: usize) -> Self {
        Self {
            allocated: true,
            ..Self::from_client(port_index, BytesMut::zeroed(size))
        }
    }

    /// Buffer identifier.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Index of the port this buffer belongs to.
    pub fn port_index(&self) -> u32 {
        self.port_index
    }

    /// Current owner.
    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Whether the storage was allocated by the component.
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Total storage capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Offset of valid data within the storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of valid bytes starting at `offset`.
    pub fn filled_len(&self) -> usize {
        self.filled_len
    }

    /// The valid bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.filled_len]
    }

    /// The whole storage, for writers.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Set the range of valid bytes.
    pub fn set_filled(&mut self, offset: usize, len: usize) -> Result<()> {
        if offset + len > self.data.len() {
            return Err(Error::BadParameter(format!(
                "range {}+{} exceeds buffer capacity {}",
                offset,
                len,
                self.data.len()
            )));
        }
        self.offset = offset;
        self.filled_len = len;
        Ok(())
    }

    /// Copy `bytes` into the storage and mark them valid.
    pub fn fill_from(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.data.len() {
            return Err(Error::BadParameter(format!(
                "{} bytes do not fit in buffer of {}",
                bytes.len(),
                self.data.len()
            )));
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.offset = 0;
        self.filled_len = bytes.len();
        Ok(())
    }

    /// Reset the valid range and flags, keeping the storage.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.filled_len = 0;
        self.metadata = Metadata::new();
    }

    /// Buffer metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable buffer metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Backend handle registered by the processing layer, if any.
    pub fn platform_handle(&self) -> Option<u64> {
        self.platform_handle
    }

    /// Set or clear the backend handle.
    pub fn set_platform_handle(&mut self, handle: Option<u64>) {
        self.platform_handle = handle;
    }

    /// Move the ownership tag.
    pub(crate) fn transfer(&mut self, to: Owner) -> Result<()> {
        self.owner = self.owner.transfer(to)?;
        Ok(())
    }
}

impl fmt::Debug for BufferHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHeader")
            .field("id", &self.id)
            .field("port", &self.port_index)
            .field("owner", &self.owner)
            .field("capacity", &self.data.len())
            .field("filled_len", &self.filled_len)
            .field("flags", &self.metadata.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transfers() {
        assert!(Owner::Client.can_transfer_to(Owner::Component));
        assert!(Owner::Component.can_transfer_to(Owner::Client));
        assert!(Owner::Component.can_transfer_to(Owner::Codec));
        assert!(Owner::Codec.can_transfer_to(Owner::Component));
    }

    #[test]
    fn test_client_never_hands_to_codec() {
        assert!(Owner::Client.transfer(Owner::Codec).is_err());
        assert!(Owner::Codec.transfer(Owner::Client).is_err());
        assert!(Owner::Component.transfer(Owner::Component).is_err());
    }

    #[test]
    fn test_header_transfer_updates_tag() {
        let mut header = BufferHeader::allocate(0, 64);
        assert_eq!(header.owner(), Owner::Client);
        header.transfer(Owner::Component).unwrap();
        header.transfer(Owner::Codec).unwrap();
        assert!(header.transfer(Owner::Client).is_err());
        assert_eq!(header.owner(), Owner::Codec);
    }

    #[test]
    fn test_fill_and_payload() {
        let mut header = BufferHeader::allocate(1, 8);
        header.fill_from(b"abcd").unwrap();
        assert_eq!(header.payload(), b"abcd");
        header.set_filled(1, 2).unwrap();
        assert_eq!(header.payload(), b"bc");
        assert!(header.set_filled(4, 5).is_err());
        assert!(header.fill_from(&[0u8; 9]).is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = BufferHeader::allocate(0, 1);
        let b = BufferHeader::from_client(0, BytesMut::zeroed(1));
        assert_ne!(a.id(), b.id());
        assert!(a.is_allocated());
        assert!(!b.is_allocated());
    }
}
