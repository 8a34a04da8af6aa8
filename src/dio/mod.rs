//! Data input/output (DIO) transports.
//!
//! Every buffer movement in or out of a port goes through the port's
//! [`DioChannel`]:
//!
//! - `queue`: a buffer enters the port (client submission)
//! - `dequeue`: the processing layer takes the next buffer
//! - `send`: a processed buffer leaves the port towards the client
//! - `cancel`: an unprocessed buffer is returned to the client (flush)
//!
//! Concrete transports are selected by name at component construction
//! through a [`DioRegistry`] passed into the component, so there is no
//! process-wide table.
//!
//! Implementations are shared between client threads (submissions) and the
//! worker thread (dequeue/send), so every method takes `&self` and the
//! transport is responsible for its own locking.

mod channel;
mod ring;

pub use channel::ChannelDio;
pub use ring::RingDio;

use crate::buffer::BufferHeader;
use crate::error::{BufferRejected, Error, Result};
use crate::port::{PortDirection, PortProps};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where a transport delivers buffers leaving the port.
pub type BufferSink = Arc<dyn Fn(BufferHeader) + Send + Sync>;

/// Constructor registered for a named transport type.
pub type DioConstructor = fn(DioContext) -> Result<Arc<dyn DioChannel>>;

/// Default number of transport types a registry can hold.
pub const DIO_REGISTRY_CAPACITY: usize = 4;

/// Everything a transport needs to know about the port it serves.
#[derive(Clone)]
pub struct DioContext {
    /// Index of the port.
    pub port_index: u32,
    /// Direction of the port.
    pub direction: PortDirection,
    /// Port properties (buffer count bounds the transport's queue).
    pub props: PortProps,
    /// Destination of `send` and `cancel`.
    pub sink: BufferSink,
}

impl fmt::Debug for DioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DioContext")
            .field("port_index", &self.port_index)
            .field("direction", &self.direction)
            .field("props", &self.props)
            .finish()
    }
}

/// Result of [`DioChannel::count`].
///
/// `EndOfStream` is a warning, not a failure: the count is valid and an
/// end-of-stream buffer was also observed on the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountStatus {
    /// Buffers available for dequeue.
    Ready(usize),
    /// Buffers available for dequeue; end of stream observed.
    EndOfStream(usize),
}

impl CountStatus {
    /// Number of buffers available regardless of the EOS warning.
    pub fn available(&self) -> usize {
        match *self {
            CountStatus::Ready(n) | CountStatus::EndOfStream(n) => n,
        }
    }

    /// Whether end of stream was observed.
    pub fn is_eos(&self) -> bool {
        matches!(self, CountStatus::EndOfStream(_))
    }
}

/// Out-of-band requests to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DioControl {
    /// Enter or leave flushing mode. Blocked dequeues return while flushing.
    SetFlushing(bool),
    /// Clear the sticky end-of-stream observation.
    ResetEos,
    /// Query the queue capacity.
    Capacity,
    /// Resize the queue after the port's buffer count changed.
    SetCapacity(usize),
}

/// Reply to a [`DioControl`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DioReply {
    /// Request applied.
    Done,
    /// Queue capacity.
    Capacity(usize),
}

/// A buffer transport bound to one port.
pub trait DioChannel: Send + Sync {
    /// Registered transport name.
    fn name(&self) -> &'static str;

    /// Open the transport. Opening an open transport is an error; callers
    /// check [`is_open`](Self::is_open) first.
    fn open(&self) -> Result<()>;

    /// Close the transport. Buffers still queued stay queued.
    fn close(&self) -> Result<()>;

    /// Whether the transport is open.
    fn is_open(&self) -> bool;

    /// Accept a buffer into the port.
    fn queue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected>;

    /// Put a buffer taken by [`dequeue`](Self::dequeue) back at the head of
    /// the queue, so it is the next one dequeued.
    fn requeue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected>;

    /// Take the next buffer, waiting up to `wait` if given.
    fn dequeue(&self, wait: Option<Duration>) -> Result<Option<BufferHeader>>;

    /// Deliver a processed buffer out of the port.
    fn send(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected>;

    /// Return an unprocessed buffer out of the port.
    fn cancel(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected>;

    /// Out-of-band request.
    fn control(&self, request: DioControl) -> Result<DioReply>;

    /// Buffers currently available for dequeue.
    fn count(&self) -> Result<CountStatus>;

    /// Release transport resources. Remaining queued buffers are handed back
    /// so the caller can return them.
    fn deinit(&self) -> Vec<BufferHeader>;

    /// Take the next buffer without waiting.
    fn try_dequeue(&self) -> Result<Option<BufferHeader>> {
        self.dequeue(None)
    }
}

/// Name to constructor table for transport types.
#[derive(Clone)]
pub struct DioRegistry {
    entries: SmallVec<[(&'static str, DioConstructor); DIO_REGISTRY_CAPACITY]>,
    capacity: usize,
}

impl DioRegistry {
    /// Create an empty registry with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DIO_REGISTRY_CAPACITY)
    }

    /// Create an empty registry bounded by `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SmallVec::new(),
            capacity,
        }
    }

    /// Create a registry with the built-in `ring` and `channel` transports.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.entries.push((RingDio::NAME, RingDio::create));
        registry.entries.push((ChannelDio::NAME, ChannelDio::create));
        registry
    }

    /// Register a transport type.
    pub fn register(&mut self, name: &'static str, constructor: DioConstructor) -> Result<()> {
        if self.is_registered(name) {
            return Err(Error::BadParameter(format!(
                "transport '{}' already registered",
                name
            )));
        }
        if self.entries.len() >= self.capacity {
            return Err(Error::InsufficientResources(format!(
                "transport registry full ({} entries)",
                self.capacity
            )));
        }
        self.entries.push((name, constructor));
        Ok(())
    }

    /// Check if a transport type is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    /// Registered transport names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    /// Instantiate the transport registered as `name`.
    pub fn create(&self, name: &str, ctx: DioContext) -> Result<Arc<dyn DioChannel>> {
        let (_, constructor) = self
            .entries
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| Error::Undefined(format!("unknown transport type '{}'", name)))?;
        tracing::debug!(port = ctx.port_index, transport = name, "creating transport");
        constructor(ctx)
    }
}

impl Default for DioRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for DioRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DioRegistry")
            .field("names", &self.names())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A context whose sink collects delivered buffers.
    pub fn collecting_context(
        buffer_count: usize,
    ) -> (DioContext, Arc<Mutex<Vec<BufferHeader>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink_target = Arc::clone(&delivered);
        let ctx = DioContext {
            port_index: 0,
            direction: PortDirection::Input,
            props: PortProps::default().with_buffer_count(buffer_count),
            sink: Arc::new(move |header: BufferHeader| sink_target.lock().unwrap().push(header)),
        };
        (ctx, delivered)
    }
}
