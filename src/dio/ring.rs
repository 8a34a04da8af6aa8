//! Ring transport: a bounded in-memory queue guarded by a mutex.
//!
//! Buffers queued by the client wait in a ring until the processing layer
//! dequeues them. Dequeue can block with a timeout; entering flushing mode
//! wakes blocked callers.

use super::{BufferSink, CountStatus, DioChannel, DioContext, DioControl, DioReply};
use crate::buffer::BufferHeader;
use crate::error::{BufferRejected, Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Mutex-and-condvar backed transport.
pub struct RingDio {
    port_index: u32,
    state: Mutex<RingState>,
    not_empty: Condvar,
    sink: BufferSink,
    opened: AtomicBool,
}

struct RingState {
    buffers: VecDeque<BufferHeader>,
    capacity: usize,
    eos: bool,
    flushing: bool,
    total_queued: u64,
    total_dequeued: u64,
}

impl RingDio {
    /// Registered name.
    pub const NAME: &'static str = "ring";

    /// Create a ring sized for the port's buffer count.
    pub fn new(ctx: DioContext) -> Self {
        let capacity = ctx.props.buffer_count.max(1);
        Self {
            port_index: ctx.port_index,
            state: Mutex::new(RingState {
                buffers: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                eos: false,
                flushing: false,
                total_queued: 0,
                total_dequeued: 0,
            }),
            not_empty: Condvar::new(),
            sink: ctx.sink,
            opened: AtomicBool::new(false),
        }
    }

    /// Registry constructor.
    pub fn create(ctx: DioContext) -> Result<Arc<dyn DioChannel>> {
        Ok(Arc::new(Self::new(ctx)))
    }

    /// Total buffers queued and dequeued since creation.
    pub fn totals(&self) -> (u64, u64) {
        let state = self.lock();
        (state.total_queued, state.total_dequeued)
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        if !self.is_open() {
            return Err(BufferRejected::new(
                Error::IncorrectStateOperation(format!(
                    "transport for port {} is closed",
                    self.port_index
                )),
                header,
            ));
        }
        (self.sink)(header);
        Ok(())
    }
}

impl DioChannel for RingDio {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(Error::IncorrectStateOperation(format!(
                "transport for port {} already open",
                self.port_index
            )));
        }
        self.lock().flushing = false;
        tracing::debug!(port = self.port_index, "ring transport opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.opened.swap(false, Ordering::AcqRel) {
            return Err(Error::IncorrectStateOperation(format!(
                "transport for port {} not open",
                self.port_index
            )));
        }
        self.not_empty.notify_all();
        tracing::debug!(port = self.port_index, "ring transport closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    fn queue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        if !self.is_open() {
            return Err(BufferRejected::new(
                Error::IncorrectStateOperation(format!(
                    "transport for port {} is closed",
                    self.port_index
                )),
                header,
            ));
        }
        let mut state = self.lock();
        if state.buffers.len() >= state.capacity {
            drop(state);
            return Err(BufferRejected::new(
                Error::InsufficientResources(format!("ring for port {} is full", self.port_index)),
                header,
            ));
        }
        if header.metadata().is_eos() {
            state.eos = true;
        }
        state.buffers.push_back(header);
        state.total_queued += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    fn requeue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        // The slot was taken by a dequeue, so capacity is not checked again.
        let mut state = self.lock();
        state.buffers.push_front(header);
        state.total_dequeued = state.total_dequeued.saturating_sub(1);
        self.not_empty.notify_one();
        Ok(())
    }

    fn dequeue(&self, wait: Option<Duration>) -> Result<Option<BufferHeader>> {
        let mut state = self.lock();

        if let Some(timeout) = wait {
            while state.buffers.is_empty() && !state.flushing && self.is_open() {
                let (guard, result) = self
                    .not_empty
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
                if result.timed_out() {
                    break;
                }
            }
        }

        let header = state.buffers.pop_front();
        if header.is_some() {
            state.total_dequeued += 1;
        }
        Ok(header)
    }

    fn send(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        self.deliver(header)
    }

    fn cancel(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        // Cancelled buffers leave even while closing; flush runs before close.
        (self.sink)(header);
        Ok(())
    }

    fn control(&self, request: DioControl) -> Result<DioReply> {
        let mut state = self.lock();
        match request {
            DioControl::SetFlushing(flushing) => {
                state.flushing = flushing;
                if flushing {
                    self.not_empty.notify_all();
                }
                Ok(DioReply::Done)
            }
            DioControl::ResetEos => {
                state.eos = false;
                Ok(DioReply::Done)
            }
            DioControl::Capacity => Ok(DioReply::Capacity(state.capacity)),
            DioControl::SetCapacity(capacity) => {
                state.capacity = capacity.max(1);
                Ok(DioReply::Done)
            }
        }
    }

    fn count(&self) -> Result<CountStatus> {
        let state = self.lock();
        let n = state.buffers.len();
        Ok(if state.eos {
            CountStatus::EndOfStream(n)
        } else {
            CountStatus::Ready(n)
        })
    }

    fn deinit(&self) -> Vec<BufferHeader> {
        self.opened.store(false, Ordering::Release);
        let mut state = self.lock();
        state.eos = false;
        self.not_empty.notify_all();
        state.buffers.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dio::test_support::collecting_context;
    use crate::metadata::Metadata;
    use std::thread;

    fn header(seq: u64) -> BufferHeader {
        let mut h = BufferHeader::allocate(0, 16);
        *h.metadata_mut() = Metadata::from_sequence(seq);
        h
    }

    #[test]
    fn test_queue_requires_open() {
        let (ctx, _) = collecting_context(2);
        let ring = RingDio::new(ctx);
        let rejected = ring.queue(header(0)).unwrap_err();
        assert!(matches!(rejected.error, Error::IncorrectStateOperation(_)));
        assert_eq!(rejected.header.metadata().sequence, 0);
    }

    #[test]
    fn test_double_open_rejected() {
        let (ctx, _) = collecting_context(2);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        assert!(ring.open().is_err());
        ring.close().unwrap();
        assert!(ring.close().is_err());
    }

    #[test]
    fn test_fifo_order() {
        let (ctx, _) = collecting_context(4);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        ring.queue(header(0)).unwrap();
        ring.queue(header(1)).unwrap();

        assert_eq!(ring.count().unwrap(), CountStatus::Ready(2));
        let first = ring.try_dequeue().unwrap().unwrap();
        let second = ring.try_dequeue().unwrap().unwrap();
        assert_eq!(first.metadata().sequence, 0);
        assert_eq!(second.metadata().sequence, 1);
        assert!(ring.try_dequeue().unwrap().is_none());
        assert_eq!(ring.totals(), (2, 2));
    }

    #[test]
    fn test_requeue_goes_to_front() {
        let (ctx, _) = collecting_context(2);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        ring.queue(header(0)).unwrap();
        ring.queue(header(1)).unwrap();

        let first = ring.try_dequeue().unwrap().unwrap();
        ring.requeue(first).unwrap();
        assert_eq!(ring.count().unwrap(), CountStatus::Ready(2));
        assert_eq!(ring.try_dequeue().unwrap().unwrap().metadata().sequence, 0);
        assert_eq!(ring.try_dequeue().unwrap().unwrap().metadata().sequence, 1);
        assert_eq!(ring.totals(), (2, 2));
    }

    #[test]
    fn test_full_ring_hands_buffer_back() {
        let (ctx, _) = collecting_context(1);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        ring.queue(header(0)).unwrap();
        let rejected = ring.queue(header(1)).unwrap_err();
        assert!(matches!(rejected.error, Error::InsufficientResources(_)));
        assert_eq!(rejected.header.metadata().sequence, 1);
    }

    #[test]
    fn test_eos_warning_until_reset() {
        let (ctx, _) = collecting_context(2);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        let mut h = header(0);
        h.metadata_mut().flags.eos = true;
        ring.queue(h).unwrap();

        assert_eq!(ring.count().unwrap(), CountStatus::EndOfStream(1));
        ring.try_dequeue().unwrap();
        assert_eq!(ring.count().unwrap(), CountStatus::EndOfStream(0));
        ring.control(DioControl::ResetEos).unwrap();
        assert_eq!(ring.count().unwrap(), CountStatus::Ready(0));
    }

    #[test]
    fn test_send_and_cancel_reach_sink() {
        let (ctx, delivered) = collecting_context(2);
        let ring = RingDio::new(ctx);
        assert!(ring.send(header(0)).is_err());
        ring.cancel(header(1)).unwrap();
        ring.open().unwrap();
        ring.send(header(2)).unwrap();

        let seqs: Vec<u64> = delivered
            .lock()
            .unwrap()
            .iter()
            .map(|h| h.metadata().sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_blocking_dequeue_woken_by_queue() {
        let (ctx, _) = collecting_context(2);
        let ring = Arc::new(RingDio::new(ctx));
        ring.open().unwrap();

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.dequeue(Some(Duration::from_secs(2))).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        ring.queue(header(5)).unwrap();

        let got = consumer.join().unwrap();
        assert_eq!(got.map(|h| h.metadata().sequence), Some(5));
    }

    #[test]
    fn test_flushing_wakes_blocked_dequeue() {
        let (ctx, _) = collecting_context(2);
        let ring = Arc::new(RingDio::new(ctx));
        ring.open().unwrap();

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.dequeue(Some(Duration::from_secs(5))).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        ring.control(DioControl::SetFlushing(true)).unwrap();

        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_deinit_returns_queued() {
        let (ctx, _) = collecting_context(2);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        ring.queue(header(0)).unwrap();
        let left = ring.deinit();
        assert_eq!(left.len(), 1);
        assert!(!ring.is_open());
        assert_eq!(ring.control(DioControl::Capacity).unwrap(), DioReply::Capacity(2));
    }

    #[test]
    fn test_set_capacity() {
        let (ctx, _) = collecting_context(1);
        let ring = RingDio::new(ctx);
        ring.open().unwrap();
        ring.queue(header(0)).unwrap();
        assert!(ring.queue(header(0)).is_err());
        ring.control(DioControl::SetCapacity(2)).unwrap();
        ring.queue(header(0)).unwrap();
        assert_eq!(ring.count().unwrap().available(), 2);
    }
}
