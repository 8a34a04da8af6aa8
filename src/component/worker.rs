//! The component worker thread.
//!
//! One thread per component drains a single signal channel. Commands and
//! data wake-ups share the channel; on every wake-up all pending signals are
//! collected and commands run before the data pass, so a state change is
//! never starved by data traffic.

use super::processor::{Pending, completion};
use super::recovery::{self, CommandFailure, Rollback};
use super::{Command, PortTarget, ProcessContext, SharedProcessor, Shared, State};
use crate::error::{Error, Result};
use crate::event::{CommandDone, ComponentEvent};
use crate::observability::{instrument_component, span_command};
use crate::port::PortSet;
use crate::trigger::should_notify;
use smallvec::{SmallVec, smallvec};
use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

/// Messages to the worker.
#[derive(Debug)]
pub(crate) enum Signal {
    Command(Command),
    Data,
    Shutdown,
}

type Done = SmallVec<[CommandDone; 4]>;
type Outcome = std::result::Result<Done, CommandFailure>;

/// Signals collected in one wake-up.
#[derive(Default)]
struct Wake {
    commands: Vec<Command>,
    data: bool,
    shutdown: bool,
}

impl Wake {
    fn push(&mut self, signal: Signal) {
        match signal {
            Signal::Command(command) => self.commands.push(command),
            Signal::Data => self.data = true,
            Signal::Shutdown => self.shutdown = true,
        }
    }
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    processor: SharedProcessor,
    ctx: ProcessContext,
    rx: kanal::Receiver<Signal>,
}

impl Worker {
    pub fn new(shared: Arc<Shared>, processor: SharedProcessor, rx: kanal::Receiver<Signal>) -> Self {
        let ctx = ProcessContext::new(Arc::clone(&shared));
        Self {
            shared,
            processor,
            ctx,
            rx,
        }
    }

    fn processor(&self) -> MutexGuard<'_, Box<dyn super::Processor>> {
        self.processor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn run(self) {
        let _span = instrument_component(&self.shared.config.name, self.shared.instance_id);
        tracing::debug!("worker started");

        while let Ok(first) = self.rx.recv() {
            let mut wake = Wake::default();
            wake.push(first);
            while let Ok(Some(signal)) = self.rx.try_recv() {
                wake.push(signal);
            }

            for command in wake.commands {
                let queued = self.shared.queued.fetch_sub(1, Ordering::AcqRel) - 1;
                self.shared.metrics.record_queue_depth(queued);
                self.execute(command);
            }
            if wake.shutdown {
                break;
            }
            if wake.data {
                self.shared.clear_data_pending();
                self.process_data();
            }
        }
        tracing::debug!("worker stopped");
    }

    /// Report an event raised by the worker to the processor and the client.
    fn emit(&self, event: ComponentEvent) {
        self.processor().return_event_notify(&event);
        self.shared.notify_client(event);
    }

    // ========================================================================
    // Data path
    // ========================================================================

    fn process_data(&self) {
        if self.shared.state() != State::Executing {
            return;
        }
        if !self.shared.force.take() {
            match self.shared.ports.readiness() {
                Ok(ports) if should_notify(&ports, self.shared.notify_mode()) => {}
                Ok(_) => return,
                Err(e) => {
                    self.emit(recovery::recover_data(&self.shared, e));
                    return;
                }
            }
        }

        let before = self.shared.progress.load(Ordering::Acquire);
        let result = self.processor().data_notify(&self.ctx);
        self.shared.metrics.record_data_notify();
        if let Err(e) = result {
            self.emit(recovery::recover_data(&self.shared, e));
            return;
        }
        // Re-run only on net movement; a requeue cancels its dequeue.
        if self.shared.progress.load(Ordering::Acquire) != before {
            self.shared.kick();
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn execute(&self, command: Command) {
        let span = span_command(command.kind().as_str(), command.param());
        let _guard = span.enter();
        tracing::debug!("executing command");

        if let Command::MarkBuffer { port, .. } = command {
            self.mark_buffer(command, port);
            return;
        }

        let outcome = match &command {
            Command::StateSet(target) => self.set_state(&command, *target),
            Command::PortEnable(target) => self.enable_ports(&command, *target),
            Command::PortDisable(target) => self.disable_ports(&command, *target),
            Command::Flush(target) => self.flush_ports(&command, *target),
            // Handled above.
            Command::MarkBuffer { .. } => return,
            Command::Vendor { code, param } => {
                tracing::warn!(code, param, "ignoring unrecognized command");
                return;
            }
        };
        if let Command::StateSet(target) = &command {
            self.shared.settle(*target);
        }

        match outcome {
            Ok(done) => {
                self.shared.metrics.record_command(true);
                for done in done {
                    self.emit(ComponentEvent::CommandComplete(done));
                }
                self.shared.kick();
            }
            Err(failure) => {
                self.shared.metrics.record_command(false);
                self.emit(recovery::recover(&self.shared, failure));
            }
        }
    }

    /// Hand a command to the processor and wait for its acknowledgement.
    fn acknowledge(&self, command: &Command, timeout: Duration) -> Result<()> {
        let pending: Pending = {
            let (done, pending) = completion();
            self.processor().command_notify(&self.ctx, command, done)?;
            pending
        };
        pending.wait(timeout, command.kind().as_str())
    }

    fn transition_timeout(&self) -> Duration {
        self.shared.config.transition_timeout
    }

    fn resource_timeout(&self) -> Duration {
        self.shared.config.resource_timeout
    }

    /// Open closed transports of `indices`, returning those opened here.
    fn open_all(&self, indices: &[u32]) -> std::result::Result<PortSet, CommandFailure> {
        let mut opened = PortSet::new();
        for &index in indices {
            match self.shared.ports.open(index) {
                Ok(true) => opened.push(index),
                Ok(false) => {}
                Err(e) => return Err(CommandFailure::new(e, Rollback::CloseTransports(opened))),
            }
        }
        Ok(opened)
    }

    /// Return queued buffers of every port and make sure the codec let go.
    fn drain_ports(&self) -> Result<()> {
        for index in self.shared.ports.all() {
            self.shared.ports.flush_port(index)?;
            let held = self.shared.ports.codec_held(index)?;
            if held > 0 {
                return Err(Error::IncorrectStateOperation(format!(
                    "codec still holds {} buffers of port {}",
                    held, index
                )));
            }
        }
        Ok(())
    }

    fn set_state(&self, command: &Command, target: State) -> Outcome {
        let current = self.shared.state();
        if current == target {
            return Err(Error::SameState(target.to_string()).into());
        }
        if !current.can_transition_to(target) {
            return Err(Error::IncorrectStateTransition(format!("{} -> {}", current, target)).into());
        }

        match (current, target) {
            (_, State::Invalid) => {
                if let Err(e) = self.acknowledge(command, self.transition_timeout()) {
                    tracing::debug!("processor did not acknowledge Invalid: {}", e);
                }
                return Err(Error::Invalid(format!("{} requested Invalid", current)).into());
            }
            (State::Loaded | State::WaitForResources, State::Idle) => {
                let enabled = self.shared.ports.enabled();
                self.shared
                    .ports
                    .wait_populated(&enabled, self.resource_timeout())?;
                let opened = self.open_all(&enabled)?;
                self.acknowledge(command, self.resource_timeout())
                    .map_err(|e| CommandFailure::new(e, Rollback::CloseTransports(opened)))?;
            }
            (State::Idle | State::Pause, State::Executing) | (State::Idle, State::Pause) => {
                let enabled = self.shared.ports.enabled();
                let opened = self.open_all(&enabled)?;
                self.acknowledge(command, self.transition_timeout())
                    .map_err(|e| CommandFailure::new(e, Rollback::CloseTransports(opened)))?;
            }
            (State::Executing | State::Pause, State::Idle) => {
                self.acknowledge(command, self.transition_timeout())?;
                self.drain_ports()?;
            }
            (State::Idle, State::Loaded) => {
                self.acknowledge(command, self.transition_timeout())?;
                self.drain_ports()?;
                let all = self.shared.ports.all();
                self.shared
                    .ports
                    .wait_depopulated(&all, self.resource_timeout())?;
                for index in all {
                    self.shared.ports.close(index)?;
                }
            }
            _ => self.acknowledge(command, self.transition_timeout())?,
        }

        self.shared.set_state(target);
        tracing::info!(from = %current, to = %target, "state changed");
        Ok(smallvec![CommandDone::StateSet(target)])
    }

    fn enable_ports(&self, command: &Command, target: PortTarget) -> Outcome {
        let ports = &self.shared.ports;
        let touched = ports.resolve(target)?;
        ports.set_transition(&touched, true);
        self.acknowledge(command, self.transition_timeout())
            .map_err(|e| CommandFailure::new(e, Rollback::ClearTransition(touched.clone())))?;

        let state = self.shared.state();
        let populate = (!matches!(state, State::Loaded | State::WaitForResources))
            .then(|| self.resource_timeout());
        let open = state.has_open_ports();

        let mut done = Done::new();
        let mut enabled = PortSet::new();
        let mut opened = PortSet::new();
        for &index in &touched {
            if !ports.with_port(index, |p| Ok(p.is_enabled()))? {
                enabled.push(index);
            }
            match ports.enable_port(index, populate, open) {
                Ok(true) => opened.push(index),
                Ok(false) => {}
                Err(e) => {
                    return Err(CommandFailure::new(
                        e,
                        Rollback::Disable {
                            enabled,
                            opened,
                            touched: touched.clone(),
                        },
                    ));
                }
            }
            ports.set_transition(&[index], false);
            done.push(CommandDone::PortEnable(index));
        }
        Ok(done)
    }

    fn disable_ports(&self, command: &Command, target: PortTarget) -> Outcome {
        let ports = &self.shared.ports;
        let touched = ports.resolve(target)?;
        ports.set_transition(&touched, true);
        self.acknowledge(command, self.transition_timeout())
            .map_err(|e| CommandFailure::new(e, Rollback::ClearTransition(touched.clone())))?;

        let reopen = self.shared.state().has_open_ports();
        let mut done = Done::new();
        let mut disabled = PortSet::new();
        for &index in &touched {
            if ports.with_port(index, |p| Ok(p.is_enabled()))? {
                disabled.push(index);
            }
            if let Err(e) = ports.disable_port(index, self.resource_timeout()) {
                return Err(CommandFailure::new(
                    e,
                    Rollback::Reenable {
                        disabled,
                        reopen,
                        touched: touched.clone(),
                    },
                ));
            }
            ports.set_transition(&[index], false);
            done.push(CommandDone::PortDisable(index));
        }
        Ok(done)
    }

    fn flush_ports(&self, command: &Command, target: PortTarget) -> Outcome {
        let ports = &self.shared.ports;
        let indices = ports.resolve(target)?;
        let idle_ports = matches!(self.shared.state(), State::Loaded | State::WaitForResources);
        let disabled = match target {
            PortTarget::Port(index) => !ports.with_port(index, |p| Ok(p.is_enabled()))?,
            PortTarget::All => false,
        };
        if idle_ports || disabled {
            tracing::debug!("nothing to flush");
            return Ok(indices.into_iter().map(CommandDone::Flush).collect());
        }

        ports.set_transition(&indices, true);
        self.acknowledge(command, self.transition_timeout())
            .map_err(|e| CommandFailure::new(e, Rollback::ClearTransition(indices.clone())))?;

        let mut done = Done::new();
        for &index in &indices {
            match ports.flush_port(index) {
                Ok(count) => tracing::debug!(port = index, count, "port flushed"),
                Err(e) => {
                    return Err(CommandFailure::new(e, Rollback::ClearTransition(indices.clone())));
                }
            }
            ports.set_transition(&[index], false);
            done.push(CommandDone::Flush(index));
        }
        Ok(done)
    }

    /// Mark buffers complete as soon as the processor has taken the mark;
    /// the processor must acknowledge before `command_notify` returns.
    fn mark_buffer(&self, command: Command, port: u32) {
        let result = self.notify_mark(&command);
        // The processor copied what it needs; the payload goes now.
        drop(command);
        match result {
            Ok(()) => {
                self.shared.metrics.record_command(true);
                self.emit(ComponentEvent::CommandComplete(CommandDone::MarkBuffer(port)));
                self.shared.kick();
            }
            Err(e) => {
                self.shared.metrics.record_command(false);
                self.emit(recovery::recover(&self.shared, e.into()));
            }
        }
    }

    fn notify_mark(&self, command: &Command) -> Result<()> {
        let state = self.shared.state();
        if !state.accepts_buffers() {
            return Err(Error::IncorrectStateOperation(format!("cannot mark buffers in {}", state)));
        }
        let (done, pending) = completion();
        self.processor().command_notify(&self.ctx, command, done)?;
        pending.take_now("mark buffer")
    }
}
