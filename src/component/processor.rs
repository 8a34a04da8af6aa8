//! The processing layer: the codec-specific half of a component.
//!
//! The runtime calls into a [`Processor`] from its worker thread and never
//! implements codec behavior itself. The processor moves buffers through
//! the [`ProcessContext`] it is handed.

use super::{Command, Shared, State};
use crate::buffer::BufferHeader;
use crate::dio::CountStatus;
use crate::error::{BufferRejected, Error, Result};
use crate::event::ComponentEvent;
use crate::param::{ParamIndex, ParamValue, PortDefinition};
use crate::port::{PortDirection, PortSet};
use kanal::ReceiveErrorTimeout;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Codec-specific behavior plugged into a component.
///
/// Every method runs with the processor locked; none may call back into
/// the client-facing [`Component`](super::Component) API.
pub trait Processor: Send {
    /// A command is about to be carried out. `done` must be completed, now
    /// or later from any thread; the runtime waits for it with a bounded
    /// timeout before touching the ports. For `MarkBuffer` it must be
    /// completed before this returns.
    ///
    /// Before acknowledging a flush, disable or transition to Idle, the
    /// processor hands back every buffer it holds with
    /// [`ProcessContext::send`] or [`ProcessContext::requeue`].
    fn command_notify(
        &mut self,
        _ctx: &ProcessContext,
        _command: &Command,
        done: Completion,
    ) -> Result<()> {
        done.complete(Ok(()));
        Ok(())
    }

    /// Data is ready; run one unit of processing.
    fn data_notify(&mut self, ctx: &ProcessContext) -> Result<()>;

    /// The runtime reported `event` to the client.
    fn return_event_notify(&mut self, _event: &ComponentEvent) {}

    /// Register (`register == true`) or unregister a buffer with the codec,
    /// typically by setting its platform handle.
    fn xlate_buffer_handle(&mut self, _header: &mut BufferHeader, _register: bool) -> Result<()> {
        Ok(())
    }

    /// Read a vendor parameter.
    fn get_parameter(&mut self, index: ParamIndex) -> Result<ParamValue> {
        Err(Error::UnsupportedIndex(index.to_string()))
    }

    /// Write a vendor parameter.
    fn set_parameter(&mut self, index: ParamIndex, _value: ParamValue) -> Result<()> {
        Err(Error::UnsupportedIndex(index.to_string()))
    }

    /// Read a vendor config.
    fn get_config(&mut self, index: ParamIndex) -> Result<ParamValue> {
        Err(Error::UnsupportedIndex(index.to_string()))
    }

    /// Write a vendor config.
    fn set_config(&mut self, index: ParamIndex, _value: ParamValue) -> Result<()> {
        Err(Error::UnsupportedIndex(index.to_string()))
    }

    /// Resolve a vendor extension name.
    fn extension_index(&self, name: &str) -> Result<ParamIndex> {
        Err(Error::UnsupportedIndex(name.to_string()))
    }
}

/// Acknowledgement of one command, completed by the processor.
#[derive(Debug)]
pub struct Completion {
    tx: kanal::Sender<Result<()>>,
}

impl Completion {
    /// Report the outcome of the command.
    pub fn complete(self, result: Result<()>) {
        match self.tx.try_send(result) {
            Ok(true) => {}
            _ => tracing::debug!("command acknowledged after the runtime stopped waiting"),
        }
    }
}

/// The runtime's side of a [`Completion`].
#[derive(Debug)]
pub(crate) struct Pending {
    rx: kanal::Receiver<Result<()>>,
}

pub(crate) fn completion() -> (Completion, Pending) {
    let (tx, rx) = kanal::bounded(1);
    (Completion { tx }, Pending { rx })
}

impl Pending {
    /// Wait for the acknowledgement.
    pub fn wait(self, timeout: Duration, what: &str) -> Result<()> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(ReceiveErrorTimeout::Timeout) => Err(Error::Timeout(format!(
                "{} not acknowledged within {:?}",
                what, timeout
            ))),
            Err(_) => Err(Error::Undefined(format!(
                "{} acknowledgement dropped",
                what
            ))),
        }
    }

    /// Take an acknowledgement that must already be there.
    pub fn take_now(self, what: &str) -> Result<()> {
        match self.rx.try_recv() {
            Ok(Some(result)) => result,
            Ok(None) => Err(Error::InsufficientResources(format!(
                "{} not acknowledged",
                what
            ))),
            Err(_) => Err(Error::Undefined(format!(
                "{} acknowledgement dropped",
                what
            ))),
        }
    }
}

/// Handle through which the processor reaches its component's ports.
///
/// Cheap to clone; clones may be moved to codec threads.
#[derive(Clone)]
pub struct ProcessContext {
    shared: Arc<Shared>,
}

impl ProcessContext {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Current component state.
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Indices of all ports.
    pub fn ports(&self) -> PortSet {
        self.shared.ports.all()
    }

    /// Definition of a port.
    pub fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        self.shared.ports.definition(port)
    }

    /// Buffers available for dequeue on a port.
    pub fn count(&self, port: u32) -> Result<CountStatus> {
        self.shared.ports.dio(port)?.count()
    }

    /// Take the next buffer queued on a port; the codec owns it afterwards.
    pub fn dequeue(&self, port: u32) -> Result<Option<BufferHeader>> {
        let header = self.shared.ports.take(port)?;
        if header.is_some() {
            self.shared.progress.fetch_add(1, Ordering::Relaxed);
        }
        Ok(header)
    }

    /// Hand a processed buffer back to the client.
    ///
    /// A mark addressed to this component raises a mark event; end of
    /// stream leaving an output port raises a buffer-flag event.
    pub fn send(&self, mut header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        let port = header.port_index();
        let direction = match self.shared.ports.with_port(port, |p| Ok(p.direction())) {
            Ok(direction) => direction,
            Err(e) => return Err(BufferRejected::new(e, header)),
        };

        let mut events = Vec::new();
        if header
            .metadata()
            .mark
            .as_ref()
            .is_some_and(|mark| mark.target == self.shared.config.name)
        {
            if let Some(mark) = header.metadata_mut().mark.take() {
                events.push(ComponentEvent::Mark {
                    payload: mark.payload,
                });
            }
        }
        if direction == PortDirection::Output && header.metadata().is_eos() {
            events.push(ComponentEvent::BufferFlag {
                port,
                flags: header.metadata().flags,
            });
        }

        self.shared.ports.deliver(header)?;
        self.shared.progress.fetch_add(1, Ordering::Relaxed);
        for event in events {
            self.shared.notify_client(event);
        }
        Ok(())
    }

    /// Put a codec-held buffer back at the head of its port for a later
    /// dequeue. A requeue undoes the dequeue; it does not wake the worker.
    pub fn requeue(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        self.shared.ports.requeue(header)?;
        self.shared.progress.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    /// Run the next data notification regardless of port occupancy.
    pub fn force_notify(&self) {
        self.shared.force.arm();
        self.shared.signal_data();
    }

    /// Re-evaluate the data trigger, e.g. after the codec freed up.
    pub fn wake(&self) {
        self.shared.signal_data();
    }

    /// Report an event to the client.
    pub fn report_event(&self, event: ComponentEvent) {
        self.shared.notify_client(event);
    }

    /// Report an asynchronous error to the client.
    pub fn report_error(&self, error: Error) {
        self.shared.metrics.record_error();
        self.shared.notify_client(ComponentEvent::error(error));
    }

    /// Tell the client a port's settings changed.
    pub fn port_settings_changed(&self, port: u32) {
        self.shared
            .notify_client(ComponentEvent::PortSettingsChanged { port });
    }
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("name", &self.shared.config.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_completion_immediate() {
        let (done, pending) = completion();
        done.complete(Ok(()));
        assert!(pending.wait(Duration::from_millis(10), "flush").is_ok());
    }

    #[test]
    fn test_completion_from_other_thread() {
        let (done, pending) = completion();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            done.complete(Err(Error::Undefined("codec".into())));
        });
        let err = pending.wait(Duration::from_secs(2), "flush").unwrap_err();
        assert_eq!(err, Error::Undefined("codec".into()));
        handle.join().unwrap();
    }

    #[test]
    fn test_completion_timeout() {
        let (_done, pending) = completion();
        let err = pending.wait(Duration::from_millis(10), "idle").unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_completion_dropped() {
        let (done, pending) = completion();
        drop(done);
        let err = pending.wait(Duration::from_secs(1), "idle").unwrap_err();
        assert!(matches!(err, Error::Undefined(_)));
    }

    #[test]
    fn test_take_now_fails_fast() {
        let (_done, pending) = completion();
        let err = pending.take_now("mark").unwrap_err();
        assert!(matches!(err, Error::InsufficientResources(_)));

        let (done, pending) = completion();
        done.complete(Ok(()));
        assert!(pending.take_now("mark").is_ok());
    }

    #[test]
    fn test_late_completion_is_harmless() {
        let (done, pending) = completion();
        drop(pending);
        done.complete(Ok(()));
    }
}
