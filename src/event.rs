//! Client-facing events.
//!
//! Events reach the client two ways: synchronously through the
//! [`ClientCallbacks`] installed with `set_callbacks`, and as a broadcast
//! that any number of [`EventReceiver`]s can subscribe to.

use crate::buffer::BufferHeader;
use crate::component::State;
use crate::error::Error;
use crate::metadata::BufferFlags;
use futures::Stream;
use std::fmt;
use tokio::sync::broadcast;

/// A command that finished executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDone {
    /// The component reached this state.
    StateSet(State),
    /// The port (or the ALL sentinel) was enabled.
    PortEnable(u32),
    /// The port (or the ALL sentinel) was disabled.
    PortDisable(u32),
    /// The port (or the ALL sentinel) was flushed.
    Flush(u32),
    /// The mark was handed to the processing layer for this port.
    MarkBuffer(u32),
}

/// Events emitted by a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentEvent {
    /// A queued command completed.
    CommandComplete(CommandDone),

    /// An asynchronous failure.
    Error {
        /// What went wrong.
        error: Error,
        /// `Loaded` for retryable resource pressure, `Invalid` otherwise.
        state: State,
    },

    /// A marked buffer reached the component named by the mark.
    Mark {
        /// Payload carried by the mark.
        payload: u64,
    },

    /// A buffer carrying flags (end of stream) left an output port.
    BufferFlag {
        /// Output port index.
        port: u32,
        /// Flags of the buffer.
        flags: BufferFlags,
    },

    /// The processing layer changed a port's settings.
    PortSettingsChanged {
        /// Port index.
        port: u32,
    },
}

impl ComponentEvent {
    /// Error event with the auxiliary state the error class calls for.
    pub fn error(error: Error) -> Self {
        let state = if error.is_resource_pressure() {
            State::Loaded
        } else {
            State::Invalid
        };
        ComponentEvent::Error { error, state }
    }

    /// Whether this is a command completion.
    pub fn is_command_complete(&self) -> bool {
        matches!(self, ComponentEvent::CommandComplete(_))
    }
}

impl fmt::Display for ComponentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentEvent::CommandComplete(done) => write!(f, "CommandComplete: {:?}", done),
            ComponentEvent::Error { error, state } => write!(f, "Error ({:?}): {}", state, error),
            ComponentEvent::Mark { payload } => write!(f, "Mark {:#x}", payload),
            ComponentEvent::BufferFlag { port, flags } => {
                write!(f, "BufferFlag on port {}: {:?}", port, flags)
            }
            ComponentEvent::PortSettingsChanged { port } => {
                write!(f, "PortSettingsChanged on port {}", port)
            }
        }
    }
}

/// Callbacks supplied by the client.
///
/// Called from the component's worker thread, or from the thread that made
/// the triggering call. Implementations may submit buffers back to the
/// component; freeing or registering buffers from inside a callback can
/// block on the processor and should be left to another thread.
pub trait ClientCallbacks: Send + Sync {
    /// An event occurred.
    fn event(&self, _event: &ComponentEvent) {}

    /// An input buffer is handed back to the client.
    fn empty_buffer_done(&self, header: BufferHeader);

    /// An output buffer is handed back to the client.
    fn fill_buffer_done(&self, header: BufferHeader);
}

/// Callbacks used until the client installs its own. Returned buffers are
/// dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallbacks;

impl ClientCallbacks for NullCallbacks {
    fn empty_buffer_done(&self, header: BufferHeader) {
        tracing::warn!(buffer = %header.id(), "no client callbacks; dropping returned input buffer");
    }

    fn fill_buffer_done(&self, header: BufferHeader) {
        tracing::warn!(buffer = %header.id(), "no client callbacks; dropping returned output buffer");
    }
}

/// Sender for component events.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<ComponentEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that received the event (0 without
    /// subscribers, which is fine).
    pub fn send(&self, event: ComponentEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Create a stream of events.
    pub fn stream(&self) -> impl Stream<Item = ComponentEvent> + use<> {
        futures::stream::unfold(self.subscribe(), |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Receiver for component events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ComponentEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the component is gone.
    pub async fn recv(&mut self) -> Option<ComponentEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next event, blocking the current thread.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ComponentEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<ComponentEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait for the first event matching `pred`.
    ///
    /// Error events that do not match end the wait with the error.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> Result<ComponentEvent, Error>
    where
        F: FnMut(&ComponentEvent) -> bool,
    {
        while let Some(event) = self.recv().await {
            if pred(&event) {
                return Ok(event);
            }
            if let ComponentEvent::Error { error, .. } = event {
                return Err(error);
            }
        }
        Err(Error::Undefined("event channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_event_send_recv() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        sender.send(ComponentEvent::Mark { payload: 7 });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, ComponentEvent::Mark { payload: 7 });
    }

    #[tokio::test]
    async fn test_multiple_receivers() {
        let sender = EventSender::new(16);
        let mut receiver1 = sender.subscribe();
        let mut receiver2 = sender.subscribe();

        sender.send(ComponentEvent::CommandComplete(CommandDone::StateSet(
            State::Idle,
        )));

        assert!(receiver1.recv().await.unwrap().is_command_complete());
        assert!(receiver2.recv().await.unwrap().is_command_complete());
    }

    #[tokio::test]
    async fn test_wait_for_state() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        let sender_clone = sender.clone();
        tokio::spawn(async move {
            sender_clone.send(ComponentEvent::PortSettingsChanged { port: 1 });
            sender_clone.send(ComponentEvent::CommandComplete(CommandDone::StateSet(
                State::Executing,
            )));
        });

        let event = receiver
            .wait_for(|e| {
                matches!(
                    e,
                    ComponentEvent::CommandComplete(CommandDone::StateSet(State::Executing))
                )
            })
            .await
            .unwrap();
        assert!(event.is_command_complete());
    }

    #[tokio::test]
    async fn test_wait_for_error() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        let sender_clone = sender.clone();
        tokio::spawn(async move {
            sender_clone.send(ComponentEvent::error(Error::Timeout("idle".into())));
        });

        let result = receiver.wait_for(|e| e.is_command_complete()).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_stream() {
        let sender = EventSender::new(16);
        let stream = sender.stream();
        sender.send(ComponentEvent::Mark { payload: 1 });
        sender.send(ComponentEvent::Mark { payload: 2 });
        drop(sender);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_error_aux_state() {
        let soft = ComponentEvent::error(Error::DynamicResourcesUnavailable("vpu".into()));
        assert!(matches!(soft, ComponentEvent::Error { state: State::Loaded, .. }));

        let hard = ComponentEvent::error(Error::Undefined("boom".into()));
        assert!(matches!(hard, ComponentEvent::Error { state: State::Invalid, .. }));
    }

    #[test]
    fn test_event_display() {
        let event = ComponentEvent::PortSettingsChanged { port: 1 };
        assert_eq!(format!("{}", event), "PortSettingsChanged on port 1");
    }
}
