//! The component: client-facing API over one worker thread.
//!
//! A [`Component`] owns its ports, a [`Processor`] and a worker thread.
//! Client calls validate synchronously and either act on mutex-guarded
//! port state (buffer calls, parameters) or enqueue a [`Command`] for the
//! worker; command outcomes are reported through [`ComponentEvent`]s.
//!
//! ```rust,ignore
//! use mediacomp::prelude::*;
//!
//! let config = ComponentConfig::new("vdec").with_port(PortConfig::input());
//! let component = Component::new(config, &DioRegistry::builtin(), MyDecoder::new())?;
//! component.set_callbacks(Arc::new(MyClient))?;
//!
//! let a = component.allocate_buffer(0, 4096)?;
//! let b = component.allocate_buffer(0, 4096)?;
//! component.send_command(Command::StateSet(State::Idle))?;
//! component.send_command(Command::StateSet(State::Executing))?;
//! ```

mod command;
mod processor;
mod recovery;
mod state;
mod worker;

pub use command::{ALL_PORTS, Command, CommandKind, PortTarget};
pub use processor::{Completion, ProcessContext, Processor};
pub use state::State;

use crate::buffer::BufferHeader;
use crate::config::ComponentConfig;
use crate::dio::{BufferSink, DioContext, DioControl, DioRegistry};
use crate::error::{BufferRejected, Error, Result};
use crate::event::{ClientCallbacks, ComponentEvent, EventReceiver, EventSender, NullCallbacks};
use crate::observability::{ComponentMetrics, init_metrics};
use crate::param::{
    COMPONENT_VERSION, ComponentVersion, ParamIndex, ParamValue, PortDefinition, SPEC_VERSION,
};
use crate::port::{Port, PortDirection, PortManager};
use crate::trigger::{ForceNotify, NotifyMode, should_notify};
use bytes::BytesMut;
use state::StateInfo;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use worker::{Signal, Worker};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

type CallbackCell = Arc<RwLock<Arc<dyn ClientCallbacks>>>;
type SharedProcessor = Arc<Mutex<Box<dyn Processor>>>;

/// State shared between client calls, the worker and process contexts.
pub(crate) struct Shared {
    pub(crate) config: ComponentConfig,
    pub(crate) instance_id: u64,
    state: Mutex<StateInfo>,
    pub(crate) ports: PortManager,
    notify_mode: Mutex<NotifyMode>,
    role: Mutex<Option<String>>,
    pub(crate) force: ForceNotify,
    callbacks: CallbackCell,
    events: EventSender,
    signals: kanal::Sender<Signal>,
    pub(crate) queued: AtomicUsize,
    data_pending: AtomicBool,
    // Net buffers dequeued and sent by the processor; a requeue counts back
    // down. Lets the worker decide to re-run.
    pub(crate) progress: AtomicU64,
    pub(crate) metrics: ComponentMetrics,
}

impl Shared {
    fn state_info(&self) -> MutexGuard<'_, StateInfo> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> State {
        self.state_info().current
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state_info().current = state;
    }

    /// Forget the pending target once its StateSet has run.
    pub(crate) fn settle(&self, target: State) {
        self.state_info().settle(target);
    }

    pub(crate) fn notify_mode(&self) -> NotifyMode {
        *self.notify_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks(&self) -> Arc<dyn ClientCallbacks> {
        Arc::clone(&self.callbacks.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Deliver an event to the client callbacks and subscribers.
    pub(crate) fn notify_client(&self, event: ComponentEvent) {
        tracing::debug!(component = %self.config.name, "event: {}", event);
        self.callbacks().event(&event);
        self.events.send(event);
    }

    /// Wake the worker for a data pass. Wake-ups coalesce until the worker
    /// picks one up.
    pub(crate) fn signal_data(&self) {
        if !self.data_pending.swap(true, Ordering::AcqRel)
            && self.signals.send(Signal::Data).is_err()
        {
            tracing::debug!("worker gone; data wake-up dropped");
        }
    }

    pub(crate) fn clear_data_pending(&self) {
        self.data_pending.store(false, Ordering::Release);
    }

    /// Whether a data pass would run now.
    pub(crate) fn trigger_ready(&self) -> bool {
        if self.state() != State::Executing {
            return false;
        }
        if self.force.is_armed() {
            return true;
        }
        match self.ports.readiness() {
            Ok(ports) => should_notify(&ports, self.notify_mode()),
            Err(e) => {
                tracing::warn!("port readiness unavailable: {}", e);
                false
            }
        }
    }

    /// Wake the worker if the trigger holds.
    pub(crate) fn kick(&self) {
        if self.trigger_ready() {
            self.signal_data();
        }
    }
}

fn return_sink(callbacks: CallbackCell, direction: PortDirection, metrics: ComponentMetrics) -> BufferSink {
    Arc::new(move |header: BufferHeader| {
        let client = Arc::clone(&callbacks.read().unwrap_or_else(PoisonError::into_inner));
        metrics.record_returned();
        match direction {
            PortDirection::Input => client.empty_buffer_done(header),
            PortDirection::Output => client.fill_buffer_done(header),
        }
    })
}

fn allocation_allowed(info: StateInfo, port: &Port) -> Result<()> {
    if matches!(info.current, State::Loaded | State::WaitForResources)
        || !port.is_enabled()
        || port.is_in_transition()
    {
        return Ok(());
    }
    Err(Error::IncorrectStateOperation(format!(
        "port {} is enabled and component is {}",
        port.index(),
        info.current
    )))
}

fn free_allowed(info: StateInfo, port: &Port) -> Result<()> {
    if info.current == State::Invalid || info.unloading() {
        return Ok(());
    }
    allocation_allowed(info, port)
}

/// A media component instance.
pub struct Component {
    shared: Arc<Shared>,
    processor: SharedProcessor,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Component {
    /// Create a component and start its worker (Init).
    ///
    /// Each port's transport is created from `registry` by the channel name
    /// in its configuration; an unknown name fails with `Undefined`.
    pub fn new<P>(config: ComponentConfig, registry: &DioRegistry, processor: P) -> Result<Self>
    where
        P: Processor + 'static,
    {
        config.validate()?;
        init_metrics();
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        let metrics = ComponentMetrics::new(&config.name);
        let callbacks: CallbackCell = Arc::new(RwLock::new(Arc::new(NullCallbacks)));

        let mut ports = Vec::with_capacity(config.ports.len());
        for (offset, port_config) in config.ports.iter().enumerate() {
            let index = config.port_base_index + offset as u32;
            let dio = registry.create(
                &port_config.channel,
                DioContext {
                    port_index: index,
                    direction: port_config.direction,
                    props: port_config.props.clone(),
                    sink: return_sink(
                        Arc::clone(&callbacks),
                        port_config.direction,
                        metrics.clone(),
                    ),
                },
            )?;
            ports.push(Port::new(index, port_config, dio));
        }

        let (signals, rx) = kanal::unbounded();
        let shared = Arc::new(Shared {
            ports: PortManager::new(config.port_base_index, ports),
            notify_mode: Mutex::new(config.notify_mode),
            role: Mutex::new(config.roles.first().cloned()),
            config,
            instance_id,
            state: Mutex::new(StateInfo::new()),
            force: ForceNotify::new(),
            callbacks,
            events: EventSender::default(),
            signals,
            queued: AtomicUsize::new(0),
            data_pending: AtomicBool::new(false),
            progress: AtomicU64::new(0),
            metrics,
        });
        let processor: Box<dyn Processor> = Box::new(processor);
        let processor: SharedProcessor = Arc::new(Mutex::new(processor));

        let worker = Worker::new(Arc::clone(&shared), Arc::clone(&processor), rx);
        let handle = std::thread::Builder::new()
            .name(format!("{}-worker", shared.config.name))
            .spawn(move || worker.run())
            .map_err(|e| Error::InsufficientResources(format!("failed to spawn worker: {}", e)))?;

        tracing::info!(
            component = %shared.config.name,
            instance = instance_id,
            ports = shared.ports.len(),
            "component initialized"
        );
        Ok(Self {
            shared,
            processor,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    fn processor(&self) -> MutexGuard<'_, Box<dyn Processor>> {
        self.processor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.shared.state() == State::Invalid {
            return Err(Error::Invalid(format!(
                "component {} is invalid",
                self.shared.config.name
            )));
        }
        Ok(())
    }

    /// Stop the worker and tear down the transports (Deinit).
    ///
    /// Only legal in `Loaded` or `Invalid`. Buffers still queued on a port
    /// are handed back to the client.
    pub fn deinit(&self) -> Result<()> {
        let state = self.shared.state();
        if !matches!(state, State::Loaded | State::Invalid) {
            return Err(Error::IncorrectStateOperation(format!(
                "cannot deinitialize in state {}",
                state
            )));
        }
        self.stop_worker();
        self.shared.ports.deinit();
        tracing::info!(component = %self.shared.config.name, "component deinitialized");
        Ok(())
    }

    fn stop_worker(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if self.shared.signals.send(Signal::Shutdown).is_err() {
                tracing::debug!("worker already gone");
            }
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!(component = %self.shared.config.name, "worker thread panicked");
            }
        }
    }

    /// Install the client callbacks. Only legal in `Loaded`.
    pub fn set_callbacks(&self, callbacks: Arc<dyn ClientCallbacks>) -> Result<()> {
        let state = self.shared.state();
        if state != State::Loaded {
            return Err(Error::IncorrectStateOperation(format!(
                "callbacks can only be set in Loaded, not {}",
                state
            )));
        }
        *self
            .shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner) = callbacks;
        Ok(())
    }

    /// Subscribe to the event broadcast.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Name and versions of this component.
    pub fn get_component_version(&self) -> ComponentVersion {
        ComponentVersion {
            name: self.shared.config.name.clone(),
            component_version: COMPONENT_VERSION,
            spec_version: SPEC_VERSION,
            instance_id: self.shared.instance_id,
        }
    }

    /// Current state.
    pub fn get_state(&self) -> State {
        self.shared.state()
    }

    /// Queue a command for the worker.
    ///
    /// Returns once the command is queued; its outcome arrives as a
    /// `CommandComplete` or `Error` event. Fails immediately on a StateSet
    /// to the state the component is already heading to (`SameState`), on
    /// a bad port index, when the component is invalid, and when the
    /// command queue is full (`InsufficientResources`).
    pub fn send_command(&self, command: Command) -> Result<()> {
        let mut info = self.shared.state_info();
        if info.current == State::Invalid {
            return Err(Error::Invalid(format!(
                "component {} is invalid",
                self.shared.config.name
            )));
        }
        if let Command::StateSet(target) = &command {
            if *target == info.effective() {
                return Err(Error::SameState(target.to_string()));
            }
        }
        if let Some(PortTarget::Port(index)) = command.port_target() {
            if !self.shared.ports.contains(index) {
                return Err(Error::BadPortIndex(index));
            }
        }

        let depth = self.shared.config.command_queue_depth;
        let queued = self.shared.queued.fetch_add(1, Ordering::AcqRel);
        if queued >= depth {
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::InsufficientResources(format!(
                "command queue full ({} commands)",
                depth
            )));
        }

        let previous = *info;
        if let Command::StateSet(target) = &command {
            info.queue_target(*target);
        }
        tracing::debug!(kind = command.kind().as_str(), param = command.param(), "command queued");
        if self.shared.signals.send(Signal::Command(command)).is_err() {
            *info = previous;
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::IncorrectStateOperation(
                "component has been deinitialized".into(),
            ));
        }
        self.shared.metrics.record_queue_depth(queued + 1);
        Ok(())
    }

    // ========================================================================
    // Parameters and configs
    // ========================================================================

    /// Read a parameter.
    pub fn get_parameter(&self, index: ParamIndex) -> Result<ParamValue> {
        self.ensure_valid()?;
        match index {
            ParamIndex::PortDefinition(port) => self
                .shared
                .ports
                .definition(port)
                .map(ParamValue::PortDefinition),
            ParamIndex::ComponentRole => self
                .shared
                .role
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .map(ParamValue::ComponentRole)
                .ok_or_else(|| Error::UnsupportedIndex("component has no role".into())),
            ParamIndex::NotifyMode | ParamIndex::Watermark(_) => self.get_runtime(index),
            ParamIndex::Vendor(_) => self.processor().get_parameter(index),
        }
    }

    /// Write a parameter.
    pub fn set_parameter(&self, index: ParamIndex, value: ParamValue) -> Result<()> {
        self.ensure_valid()?;
        if !value.matches(index) {
            return Err(Error::BadParameter(format!(
                "value does not fit index {}",
                index
            )));
        }
        match (index, value) {
            (ParamIndex::PortDefinition(port), ParamValue::PortDefinition(def)) => {
                self.set_port_definition(port, def)
            }
            (ParamIndex::ComponentRole, ParamValue::ComponentRole(role)) => {
                let state = self.shared.state();
                if state != State::Loaded {
                    return Err(Error::IncorrectStateOperation(format!(
                        "role can only change in Loaded, not {}",
                        state
                    )));
                }
                if !self.shared.config.roles.contains(&role) {
                    return Err(Error::BadParameter(format!("unknown role '{}'", role)));
                }
                *self.shared.role.lock().unwrap_or_else(PoisonError::into_inner) = Some(role);
                Ok(())
            }
            (ParamIndex::Vendor(_), value) => self.processor().set_parameter(index, value),
            (index, value) => self.set_runtime(index, value),
        }
    }

    /// Read a config.
    pub fn get_config(&self, index: ParamIndex) -> Result<ParamValue> {
        self.ensure_valid()?;
        match index {
            ParamIndex::NotifyMode | ParamIndex::Watermark(_) => self.get_runtime(index),
            ParamIndex::Vendor(_) => self.processor().get_config(index),
            _ => Err(Error::UnsupportedIndex(index.to_string())),
        }
    }

    /// Write a config.
    pub fn set_config(&self, index: ParamIndex, value: ParamValue) -> Result<()> {
        self.ensure_valid()?;
        if !value.matches(index) {
            return Err(Error::BadParameter(format!(
                "value does not fit index {}",
                index
            )));
        }
        match index {
            ParamIndex::NotifyMode | ParamIndex::Watermark(_) => self.set_runtime(index, value),
            ParamIndex::Vendor(_) => self.processor().set_config(index, value),
            _ => Err(Error::UnsupportedIndex(index.to_string())),
        }
    }

    /// Resolve a vendor extension name to an index.
    pub fn get_extension_index(&self, name: &str) -> Result<ParamIndex> {
        self.ensure_valid()?;
        self.processor().extension_index(name)
    }

    /// Role at position `index`, or `None` past the end.
    pub fn component_role_enum(&self, index: usize) -> Option<&str> {
        self.shared.config.roles.get(index).map(String::as_str)
    }

    fn get_runtime(&self, index: ParamIndex) -> Result<ParamValue> {
        match index {
            ParamIndex::NotifyMode => Ok(ParamValue::NotifyMode(self.shared.notify_mode())),
            ParamIndex::Watermark(port) => self
                .shared
                .ports
                .with_port(port, |p| Ok(ParamValue::Watermark(p.props().watermark))),
            _ => Err(Error::UnsupportedIndex(index.to_string())),
        }
    }

    fn set_runtime(&self, index: ParamIndex, value: ParamValue) -> Result<()> {
        match (index, value) {
            (ParamIndex::NotifyMode, ParamValue::NotifyMode(mode)) => {
                *self
                    .shared
                    .notify_mode
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = mode;
            }
            (ParamIndex::Watermark(port), ParamValue::Watermark(watermark)) => {
                self.shared.ports.with_port(port, |p| {
                    if watermark > p.props().buffer_count {
                        return Err(Error::BadParameter(format!(
                            "watermark {} above buffer count {}",
                            watermark,
                            p.props().buffer_count
                        )));
                    }
                    p.props_mut().watermark = watermark;
                    Ok(())
                })?;
            }
            (index, _) => return Err(Error::UnsupportedIndex(index.to_string())),
        }
        self.shared.kick();
        Ok(())
    }

    fn set_port_definition(&self, port: u32, def: PortDefinition) -> Result<()> {
        def.version.check()?;
        if def.port_index != port {
            return Err(Error::BadParameter(format!(
                "definition for port {} passed for port {}",
                def.port_index, port
            )));
        }
        let loaded = self.shared.state() == State::Loaded;
        let dio = self.shared.ports.with_port(port, |p| {
            if !loaded && p.is_enabled() {
                return Err(Error::IncorrectStateOperation(format!(
                    "port {} must be disabled to change its definition",
                    port
                )));
            }
            if def.buffer_count < p.props().min_buffer_count || def.buffer_count == 0 {
                return Err(Error::BadParameter(format!(
                    "buffer count {} below minimum {}",
                    def.buffer_count,
                    p.props().min_buffer_count
                )));
            }
            p.buffers_mut().set_capacity(def.buffer_count)?;
            p.props_mut().buffer_count = def.buffer_count;
            p.props_mut().buffer_size = def.buffer_size;
            Ok(Arc::clone(p.dio()))
        })?;
        dio.control(DioControl::SetCapacity(def.buffer_count))?;
        Ok(())
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Wrap client storage in a new buffer header for `port` (UseBuffer).
    pub fn use_buffer(&self, port: u32, data: BytesMut) -> Result<BufferHeader> {
        self.ensure_valid()?;
        let mut header = BufferHeader::from_client(port, data);
        self.register(&mut header)?;
        Ok(header)
    }

    /// Allocate a new buffer of `size` bytes for `port` (AllocateBuffer).
    pub fn allocate_buffer(&self, port: u32, size: usize) -> Result<BufferHeader> {
        self.ensure_valid()?;
        let mut header = BufferHeader::allocate(port, size);
        self.register(&mut header)?;
        Ok(header)
    }

    fn register(&self, header: &mut BufferHeader) -> Result<()> {
        if !self.shared.ports.contains(header.port_index()) {
            return Err(Error::BadPortIndex(header.port_index()));
        }
        let info = *self.shared.state_info();
        self.processor().xlate_buffer_handle(header, true)?;
        let registered = self
            .shared
            .ports
            .register(header, |port| allocation_allowed(info, port));
        if let Err(e) = registered {
            if let Err(undo) = self.processor().xlate_buffer_handle(header, false) {
                tracing::warn!(buffer = %header.id(), "unregister after failed registration: {}", undo);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Release a buffer (FreeBuffer).
    ///
    /// Refuses buffers not held by the client with `InsufficientResources`;
    /// the header comes back inside the rejection.
    pub fn free_buffer(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        let info = *self.shared.state_info();
        if let Err(e) = self
            .shared
            .ports
            .release(&header, |port| free_allowed(info, port))
        {
            return Err(BufferRejected::new(e, header));
        }
        let mut header = header;
        if let Err(e) = self.processor().xlate_buffer_handle(&mut header, false) {
            tracing::warn!(buffer = %header.id(), "unregister on free failed: {}", e);
        }
        Ok(())
    }

    /// Submit a filled input buffer (EmptyThisBuffer).
    pub fn empty_this_buffer(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        self.submit(header, PortDirection::Input)
    }

    /// Submit an empty output buffer (FillThisBuffer).
    pub fn fill_this_buffer(&self, header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        self.submit(header, PortDirection::Output)
    }

    fn submit(
        &self,
        header: BufferHeader,
        direction: PortDirection,
    ) -> std::result::Result<(), BufferRejected> {
        let state = self.shared.state();
        if !state.accepts_buffers() {
            let error = if state == State::Invalid {
                Error::Invalid(format!("component {} is invalid", self.shared.config.name))
            } else {
                Error::IncorrectStateOperation(format!("buffers not accepted in {}", state))
            };
            return Err(BufferRejected::new(error, header));
        }
        self.shared.ports.submit(header, direction)?;
        self.shared.metrics.record_submitted();
        self.shared.kick();
        Ok(())
    }

    /// Run the data callback once on the next opportunity, regardless of
    /// port occupancy.
    pub fn force_notify(&self) {
        self.shared.force.arm();
        self.shared.signal_data();
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.shared.config.name)
            .field("instance", &self.shared.instance_id)
            .field("state", &self.shared.state())
            .field("ports", &self.shared.ports)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortConfig;
    use crate::port::PortProps;
    use crate::trigger::NotifyMode;

    struct Idle;

    impl Processor for Idle {
        fn data_notify(&mut self, _ctx: &ProcessContext) -> Result<()> {
            Ok(())
        }
    }

    fn component() -> Component {
        let config = ComponentConfig::new("unit")
            .with_role("audio_decoder.pcm")
            .with_role("audio_decoder.raw")
            .with_port(PortConfig::input().with_props(PortProps::default().with_buffer_count(2)))
            .with_port(PortConfig::output());
        Component::new(config, &DioRegistry::builtin(), Idle).unwrap()
    }

    #[test]
    fn test_unknown_channel_fails_init() {
        let config = ComponentConfig::new("bad").with_port(PortConfig::input().with_channel("tunnel"));
        let err = Component::new(config, &DioRegistry::builtin(), Idle).unwrap_err();
        assert!(matches!(err, Error::Undefined(_)));
    }

    #[test]
    fn test_same_state_rejected() {
        let c = component();
        assert!(matches!(
            c.send_command(Command::StateSet(State::Loaded)),
            Err(Error::SameState(_))
        ));
    }

    #[test]
    fn test_bad_port_index_rejected() {
        let c = component();
        assert_eq!(
            c.send_command(Command::Flush(PortTarget::Port(9))),
            Err(Error::BadPortIndex(9))
        );
        assert_eq!(c.allocate_buffer(9, 16).unwrap_err(), Error::BadPortIndex(9));
    }

    #[test]
    fn test_version_and_roles() {
        let c = component();
        let version = c.get_component_version();
        assert_eq!(version.name, "unit");
        assert_eq!(version.spec_version, SPEC_VERSION);
        assert_eq!(c.component_role_enum(1), Some("audio_decoder.raw"));
        assert_eq!(c.component_role_enum(2), None);
        assert_eq!(
            c.get_parameter(ParamIndex::ComponentRole).unwrap(),
            ParamValue::ComponentRole("audio_decoder.pcm".into())
        );
        c.set_parameter(
            ParamIndex::ComponentRole,
            ParamValue::ComponentRole("audio_decoder.raw".into()),
        )
        .unwrap();
        assert!(c
            .set_parameter(ParamIndex::ComponentRole, ParamValue::ComponentRole("x".into()))
            .is_err());
    }

    #[test]
    fn test_port_definition_roundtrip() {
        let c = component();
        let ParamValue::PortDefinition(mut def) =
            c.get_parameter(ParamIndex::PortDefinition(0)).unwrap()
        else {
            panic!("expected port definition");
        };
        assert_eq!(def.direction, PortDirection::Input);
        def.buffer_count = 3;
        c.set_parameter(ParamIndex::PortDefinition(0), ParamValue::PortDefinition(def.clone()))
            .unwrap();

        def.version = crate::param::Version::new(2, 0, 0, 0);
        assert!(matches!(
            c.set_parameter(ParamIndex::PortDefinition(0), ParamValue::PortDefinition(def)),
            Err(Error::VersionMismatch(_))
        ));
    }

    #[test]
    fn test_mismatched_value_rejected() {
        let c = component();
        assert!(matches!(
            c.set_parameter(ParamIndex::NotifyMode, ParamValue::Watermark(1)),
            Err(Error::BadParameter(_))
        ));
        assert!(matches!(
            c.get_parameter(ParamIndex::Vendor(0x7F00_0000)),
            Err(Error::UnsupportedIndex(_))
        ));
        assert!(matches!(
            c.get_config(ParamIndex::ComponentRole),
            Err(Error::UnsupportedIndex(_))
        ));
        assert!(matches!(
            c.get_extension_index("vendor.thing"),
            Err(Error::UnsupportedIndex(_))
        ));
    }

    #[test]
    fn test_runtime_config() {
        let c = component();
        c.set_config(ParamIndex::NotifyMode, ParamValue::NotifyMode(NotifyMode::Any))
            .unwrap();
        assert_eq!(
            c.get_config(ParamIndex::NotifyMode).unwrap(),
            ParamValue::NotifyMode(NotifyMode::Any)
        );
        c.set_config(ParamIndex::Watermark(0), ParamValue::Watermark(2))
            .unwrap();
        assert!(c
            .set_config(ParamIndex::Watermark(0), ParamValue::Watermark(3))
            .is_err());
    }

    #[test]
    fn test_buffers_rejected_in_loaded() {
        let c = component();
        let header = c.allocate_buffer(0, 4096).unwrap();
        let rejected = c.empty_this_buffer(header).unwrap_err();
        assert!(matches!(rejected.error, Error::IncorrectStateOperation(_)));
        c.free_buffer(rejected.header).unwrap();
    }

    #[test]
    fn test_small_buffer_rejected() {
        let c = component();
        assert!(matches!(
            c.use_buffer(0, BytesMut::zeroed(16)),
            Err(Error::BadParameter(_))
        ));
    }

    #[test]
    fn test_deinit_requires_loaded() {
        let c = component();
        c.deinit().unwrap();
        assert!(c.send_command(Command::StateSet(State::Idle)).is_err());
    }
}
