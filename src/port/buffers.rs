//! Per-port buffer table.
//!
//! Records every header registered on a port together with its current
//! owner. The table is the runtime's view of buffers it may not be holding
//! at the moment (client or codec side).

use crate::buffer::{BufferId, Owner};
use crate::error::{Error, Result};

/// One registered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferEntry {
    /// Buffer identifier.
    pub id: BufferId,
    /// Current owner.
    pub owner: Owner,
    /// Storage size in bytes.
    pub size: usize,
    /// Whether the component allocated the storage.
    pub allocated: bool,
}

/// Ownership records for the buffers of one port.
#[derive(Debug, Clone)]
pub struct BufferTable {
    entries: Vec<BufferEntry>,
    capacity: usize,
}

impl BufferTable {
    /// Create an empty table bounded by `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound. Fails if more buffers are already registered.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if self.entries.len() > capacity {
            return Err(Error::IncorrectStateOperation(format!(
                "{} buffers registered, cannot shrink to {}",
                self.entries.len(),
                capacity
            )));
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Number of registered buffers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no buffer is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the table is at capacity.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Register a new buffer. New buffers start out owned by the client.
    pub fn register(&mut self, id: BufferId, size: usize, allocated: bool) -> Result<()> {
        if self.is_full() {
            return Err(Error::InsufficientResources(format!(
                "port already holds {} of {} buffers",
                self.entries.len(),
                self.capacity
            )));
        }
        if self.find(id).is_some() {
            return Err(Error::BadParameter(format!("{} already registered", id)));
        }
        self.entries.push(BufferEntry {
            id,
            owner: Owner::Client,
            size,
            allocated,
        });
        Ok(())
    }

    /// Remove a buffer. Refuses buffers the client does not hold.
    pub fn release(&mut self, id: BufferId) -> Result<BufferEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::BadParameter(format!("{} not registered on port", id)))?;
        let owner = self.entries[pos].owner;
        if owner != Owner::Client {
            return Err(Error::InsufficientResources(format!(
                "{} is owned by {:?} and cannot be freed",
                id, owner
            )));
        }
        Ok(self.entries.remove(pos))
    }

    /// Look up a buffer.
    pub fn find(&self, id: BufferId) -> Option<&BufferEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Owner of a registered buffer.
    pub fn owner(&self, id: BufferId) -> Option<Owner> {
        self.find(id).map(|e| e.owner)
    }

    /// Record a hand-off, checking both the expected current owner and the
    /// legality of the transition.
    pub fn transfer(&mut self, id: BufferId, from: Owner, to: Owner) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::BadParameter(format!("{} not registered on port", id)))?;
        if entry.owner != from {
            return Err(Error::IncorrectStateOperation(format!(
                "{} is owned by {:?}, expected {:?}",
                id, entry.owner, from
            )));
        }
        entry.owner = from.transfer(to)?;
        Ok(())
    }

    /// Number of buffers held by `owner`.
    pub fn count_owned_by(&self, owner: Owner) -> usize {
        self.entries.iter().filter(|e| e.owner == owner).count()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &BufferEntry> {
        self.entries.iter()
    }
}
