//! Ports: the directional data connection points of a component.
//!
//! A [`Port`] owns its transport ([`DioChannel`]), its buffer table and the
//! enable/transition/EOS flags. The [`PortManager`] holds all ports of a
//! component behind one lock and implements enable, disable and flush.

mod buffers;
mod manager;

pub use buffers::{BufferEntry, BufferTable};
pub use manager::{PortManager, PortSet};

use crate::buffer::Owner;
use crate::config::{PortConfig, option_duration_ms};
use crate::dio::DioChannel;
use crate::error::Result;
use crate::param::{PortDefinition, SPEC_VERSION};
use crate::trigger::PortReadiness;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Receives buffers from the client (EmptyThisBuffer).
    Input,
    /// Returns filled buffers to the client (FillThisBuffer).
    Output,
}

/// How the codec accesses buffer memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Codec reads buffer contents.
    #[default]
    Read,
    /// Codec writes buffer contents.
    Write,
    /// Codec reads and writes.
    ReadWrite,
}

/// Kind of memory region backing the port's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Ordinary heap memory.
    #[default]
    Heap,
    /// Memory shared with another process.
    Shared,
    /// Device memory mapped for the codec.
    Device,
}

/// Per-port properties.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortProps {
    /// Buffers that must be available before processing is triggered.
    pub watermark: usize,
    /// Codec access mode.
    pub access_mode: AccessMode,
    /// Memory region kind.
    pub memory: MemoryKind,
    /// Number of buffers the port is populated with.
    pub buffer_count: usize,
    /// Lower bound for `buffer_count`.
    pub min_buffer_count: usize,
    /// Minimum size of each buffer in bytes.
    pub buffer_size: usize,
    /// How long a dequeue waits for a buffer; `None` does not wait.
    #[serde(rename = "dequeue_timeout_ms", with = "option_duration_ms")]
    pub dequeue_timeout: Option<Duration>,
}

impl Default for PortProps {
    fn default() -> Self {
        Self {
            watermark: 1,
            access_mode: AccessMode::default(),
            memory: MemoryKind::default(),
            buffer_count: 2,
            min_buffer_count: 1,
            buffer_size: 4096,
            dequeue_timeout: None,
        }
    }
}

impl PortProps {
    /// Set the watermark.
    pub fn with_watermark(mut self, watermark: usize) -> Self {
        self.watermark = watermark;
        self
    }

    /// Set the buffer count (and clamp the minimum to it).
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self.min_buffer_count = self.min_buffer_count.min(count);
        self
    }

    /// Set the buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the access mode.
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Set the dequeue timeout.
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = Some(timeout);
        self
    }
}

/// One port of a component.
pub struct Port {
    index: u32,
    direction: PortDirection,
    channel: String,
    props: PortProps,
    enabled: bool,
    in_transition: bool,
    eos_received: bool,
    buffers: BufferTable,
    dio: Arc<dyn DioChannel>,
}

impl Port {
    /// Create an enabled, empty port around its transport.
    pub fn new(index: u32, config: &PortConfig, dio: Arc<dyn DioChannel>) -> Self {
        Self {
            index,
            direction: config.direction,
            channel: config.channel.clone(),
            props: config.props.clone(),
            enabled: config.enabled,
            in_transition: false,
            eos_received: false,
            buffers: BufferTable::new(config.props.buffer_count),
            dio,
        }
    }

    /// Port index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Port direction.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Registered transport type name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Port properties.
    pub fn props(&self) -> &PortProps {
        &self.props
    }

    /// Whether the port is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether an enable, disable or flush is outstanding.
    pub fn is_in_transition(&self) -> bool {
        self.in_transition
    }

    /// Whether an end-of-stream buffer was received.
    pub fn eos_received(&self) -> bool {
        self.eos_received
    }

    /// The port's buffer table.
    pub fn buffers(&self) -> &BufferTable {
        &self.buffers
    }

    /// The port's transport.
    pub fn dio(&self) -> &Arc<dyn DioChannel> {
        &self.dio
    }

    /// Buffers the runtime currently holds on this port.
    pub fn held_buffers(&self) -> usize {
        self.buffers.count_owned_by(Owner::Component)
    }

    /// Buffers the codec currently holds on this port.
    pub fn codec_buffers(&self) -> usize {
        self.buffers.count_owned_by(Owner::Codec)
    }

    /// Whether the port has its full buffer complement.
    pub fn is_populated(&self) -> bool {
        self.buffers.len() >= self.props.buffer_count
    }

    /// Whether no buffer is registered.
    pub fn is_depopulated(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Occupancy snapshot for the trigger predicate.
    pub fn readiness(&self) -> Result<PortReadiness> {
        let count = self.dio.count()?;
        Ok(PortReadiness {
            direction: self.direction,
            enabled: self.enabled,
            in_transition: self.in_transition,
            available: count.available(),
            watermark: self.props.watermark,
            eos: self.eos_received || (self.direction == PortDirection::Input && count.is_eos()),
        })
    }

    /// Snapshot as a port definition parameter.
    pub fn definition(&self) -> PortDefinition {
        PortDefinition {
            version: SPEC_VERSION,
            port_index: self.index,
            direction: self.direction,
            enabled: self.enabled,
            populated: self.is_populated(),
            registered: self.buffers.len(),
            buffer_count: self.props.buffer_count,
            min_buffer_count: self.props.min_buffer_count,
            buffer_size: self.props.buffer_size,
            memory: self.props.memory,
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_in_transition(&mut self, in_transition: bool) {
        self.in_transition = in_transition;
    }

    pub(crate) fn set_eos_received(&mut self, eos: bool) {
        self.eos_received = eos;
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut BufferTable {
        &mut self.buffers
    }

    pub(crate) fn props_mut(&mut self) -> &mut PortProps {
        &mut self.props
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("index", &self.index)
            .field("direction", &self.direction)
            .field("channel", &self.channel)
            .field("enabled", &self.enabled)
            .field("in_transition", &self.in_transition)
            .field("eos_received", &self.eos_received)
            .field("buffers", &self.buffers.len())
            .finish()
    }
}
