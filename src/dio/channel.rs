//! Channel transport: buffers cross the port through a kanal channel.
//!
//! Submissions from client threads are sent into the channel and the
//! processing layer receives them, so producers and the consumer never
//! share a lock. The channel itself is unbounded; the port's buffer count
//! is enforced on the producer side. Requeued buffers wait in a small
//! stash that is drained before the channel.

use super::{BufferSink, CountStatus, DioChannel, DioContext, DioControl, DioReply};
use crate::buffer::BufferHeader;
use crate::error::{BufferRejected, Error, Result};
use kanal::{Receiver, ReceiveErrorTimeout, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// kanal-backed transport.
pub struct ChannelDio {
    port_index: u32,
    capacity: AtomicUsize,
    tx: Sender<BufferHeader>,
    rx: Receiver<BufferHeader>,
    requeued: Mutex<VecDeque<BufferHeader>>,
    // Serializes the capacity check with the send.
    admit: Mutex<()>,
    sink: BufferSink,
    opened: AtomicBool,
    eos: AtomicBool,
    flushing: AtomicBool,
}

impl ChannelDio {
    /// Registered name.
    pub const NAME: &'static str = "channel";

    /// Create a channel sized for the port's buffer count.
    pub fn new(ctx: DioContext) -> Self {
        let (tx, rx) = kanal::unbounded();
        Self {
            port_index: ctx.port_index,
            capacity: AtomicUsize::new(ctx.props.buffer_count.max(1)),
            tx,
            rx,
            requeued: Mutex::new(VecDeque::new()),
            admit: Mutex::new(()),
            sink: ctx.sink,
            opened: AtomicBool::new(false),
            eos: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
        }
    }

    /// Registry constructor.
    pub fn create(ctx: DioContext) -> Result<Arc<dyn DioChannel>> {
        Ok(Arc::new(Self::new(ctx)))
    }

    fn requeued(&self) -> MutexGuard<'_, VecDeque<BufferHeader>> {
        self.requeued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queued(&self) -> usize {
        self.rx.len() + self.requeued().len()
    }

    fn closed_error(&self) -> Error {
        Error::IncorrectStateOperation(format!("transport for port {} is closed", self.port_index))
    }
}

impl DioChannel for ChannelDio {
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
        self.flushing.store(false, Ordering::Release);
        tracing::debug!(port = self.port_index, "channel transport opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.opened.swap(false, Ordering::AcqRel) {
            return Err(Error::IncorrectStateOperation(format!(
                "transport for port {} not open",
                self.port_index
            )));
        }
        tracing::debug!(port = self.port_index, "channel transport closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    fn queue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        if !self.is_open() {
            return Err(BufferRejected::new(self.closed_error(), header));
        }
        let _admit = self.admit.lock().unwrap_or_else(PoisonError::into_inner);
        if self.queued() >= self.capacity.load(Ordering::Acquire) {
            return Err(BufferRejected::new(
                Error::InsufficientResources(format!(
                    "channel for port {} is full",
                    self.port_index
                )),
                header,
            ));
        }
        let eos = header.metadata().is_eos();
        // The option still holds the header if the channel refused it.
        let mut slot = Some(header);
        let sent = self.tx.try_send_option(&mut slot);
        if let Some(header) = slot.take() {
            let error = match sent {
                Err(e) => Error::Undefined(format!("channel send failed: {}", e)),
                Ok(_) => Error::InsufficientResources(format!(
                    "channel for port {} refused the buffer",
                    self.port_index
                )),
            };
            tracing::error!(port = self.port_index, "channel queue failed: {}", error);
            return Err(BufferRejected::new(error, header));
        }
        if eos {
            self.eos.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn requeue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        self.requeued().push_front(header);
        Ok(())
    }

    fn dequeue(&self, wait: Option<Duration>) -> Result<Option<BufferHeader>> {
        if let Some(header) = self.requeued().pop_front() {
            return Ok(Some(header));
        }
        match wait {
            Some(timeout) if !self.flushing.load(Ordering::Acquire) => {
                match self.rx.recv_timeout(timeout) {
                    Ok(header) => Ok(Some(header)),
                    Err(ReceiveErrorTimeout::Timeout) => Ok(None),
                    Err(e) => Err(Error::Undefined(format!("channel receive failed: {}", e))),
                }
            }
            _ => self
                .rx
                .try_recv()
                .map_err(|e| Error::Undefined(format!("channel receive failed: {}", e))),
        }
    }

    fn send(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        if !self.is_open() {
            return Err(BufferRejected::new(self.closed_error(), header));
        }
        (self.sink)(header);
        Ok(())
    }

    fn cancel(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        (self.sink)(header);
        Ok(())
    }

    fn control(&self, request: DioControl) -> Result<DioReply> {
        match request {
            DioControl::SetFlushing(flushing) => {
                self.flushing.store(flushing, Ordering::Release);
                Ok(DioReply::Done)
            }
            DioControl::ResetEos => {
                self.eos.store(false, Ordering::Release);
                Ok(DioReply::Done)
            }
            DioControl::Capacity => Ok(DioReply::Capacity(self.capacity.load(Ordering::Acquire))),
            DioControl::SetCapacity(capacity) => {
                self.capacity.store(capacity.max(1), Ordering::Release);
                Ok(DioReply::Done)
            }
        }
    }

    fn count(&self) -> Result<CountStatus> {
        let n = self.queued();
        Ok(if self.eos.load(Ordering::Acquire) {
            CountStatus::EndOfStream(n)
        } else {
            CountStatus::Ready(n)
        })
    }

    fn deinit(&self) -> Vec<BufferHeader> {
        self.opened.store(false, Ordering::Release);
        self.eos.store(false, Ordering::Release);
        let mut left: Vec<BufferHeader> = self.requeued().drain(..).collect();
        while let Ok(Some(header)) = self.rx.try_recv() {
            left.push(header);
        }
        left
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
    fn test_queue_dequeue() {
        let (ctx, _) = collecting_context(2);
        let dio = ChannelDio::new(ctx);
        dio.open().unwrap();
        dio.queue(header(0)).unwrap();
        dio.queue(header(1)).unwrap();
        assert_eq!(dio.count().unwrap(), CountStatus::Ready(2));

        let rejected = dio.queue(header(2)).unwrap_err();
        assert!(matches!(rejected.error, Error::InsufficientResources(_)));

        assert_eq!(dio.try_dequeue().unwrap().unwrap().metadata().sequence, 0);
        assert_eq!(dio.try_dequeue().unwrap().unwrap().metadata().sequence, 1);
        assert!(dio.try_dequeue().unwrap().is_none());
    }

    #[test]
    fn test_requeue_served_first() {
        let (ctx, _) = collecting_context(2);
        let dio = ChannelDio::new(ctx);
        dio.open().unwrap();
        dio.queue(header(0)).unwrap();
        dio.queue(header(1)).unwrap();

        let first = dio.try_dequeue().unwrap().unwrap();
        dio.requeue(first).unwrap();
        assert_eq!(dio.count().unwrap(), CountStatus::Ready(2));
        assert!(dio.queue(header(2)).is_err());
        assert_eq!(dio.try_dequeue().unwrap().unwrap().metadata().sequence, 0);
        assert_eq!(dio.try_dequeue().unwrap().unwrap().metadata().sequence, 1);
    }

    #[test]
    fn test_closed_channel_hands_buffer_back() {
        let (ctx, _) = collecting_context(2);
        let dio = ChannelDio::new(ctx);
        dio.open().unwrap();
        dio.tx.close().unwrap();

        let rejected = dio.queue(header(7)).unwrap_err();
        assert!(matches!(rejected.error, Error::Undefined(_)));
        assert_eq!(rejected.header.metadata().sequence, 7);
    }

    #[test]
    fn test_dequeue_timeout_returns_none() {
        let (ctx, _) = collecting_context(1);
        let dio = ChannelDio::new(ctx);
        dio.open().unwrap();
        assert!(dio.dequeue(Some(Duration::from_millis(10))).unwrap().is_none());
    }

    #[test]
    fn test_cross_thread_submission() {
        let (ctx, _) = collecting_context(8);
        let dio = Arc::new(ChannelDio::new(ctx));
        dio.open().unwrap();

        let producer = {
            let dio = Arc::clone(&dio);
            thread::spawn(move || {
                for i in 0..8 {
                    dio.queue(header(i)).unwrap();
                }
            })
        };

        let mut received = 0;
        while received < 8 {
            if dio.dequeue(Some(Duration::from_millis(100))).unwrap().is_some() {
                received += 1;
            }
        }
        producer.join().unwrap();
        assert_eq!(received, 8);
    }

    #[test]
    fn test_eos_observed() {
        let (ctx, _) = collecting_context(2);
        let dio = ChannelDio::new(ctx);
        dio.open().unwrap();
        let mut h = header(0);
        h.metadata_mut().flags.eos = true;
        dio.queue(h).unwrap();
        assert!(dio.count().unwrap().is_eos());
        dio.control(DioControl::ResetEos).unwrap();
        assert!(!dio.count().unwrap().is_eos());
    }

    #[test]
    fn test_deinit_drains() {
        let (ctx, delivered) = collecting_context(2);
        let dio = ChannelDio::new(ctx);
        dio.open().unwrap();
        dio.queue(header(0)).unwrap();
        dio.send(header(1)).unwrap();
        assert_eq!(delivered.lock().unwrap().len(), 1);
        assert_eq!(dio.deinit().len(), 1);
        assert!(!dio.is_open());
    }
}
