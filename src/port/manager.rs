//! Port manager: all ports of a component behind one lock.
//!
//! Every buffer hand-off updates the owning port's buffer table under the
//! lock and then moves the header through the port's transport with the
//! lock released, so transports can call straight back into client code.

use super::{Port, PortDirection};
use crate::buffer::{BufferHeader, Owner};
use crate::component::PortTarget;
use crate::dio::{DioChannel, DioControl};
use crate::error::{BufferRejected, Error, Result};
use crate::param::PortDefinition;
use crate::port::BufferEntry;
use crate::trigger::PortReadiness;
use smallvec::SmallVec;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Port indices touched by one command.
pub type PortSet = SmallVec<[u32; 4]>;

/// Owner of all ports of one component.
pub struct PortManager {
    base_index: u32,
    ports: Mutex<Vec<Port>>,
    // Signalled whenever a buffer is registered or released.
    population: Condvar,
}

impl PortManager {
    /// Create a manager over `ports`, numbered from `base_index`.
    pub fn new(base_index: u32, ports: Vec<Port>) -> Self {
        Self {
            base_index,
            ports: Mutex::new(ports),
            population: Condvar::new(),
        }
    }

    /// Index of the first port.
    pub fn base_index(&self) -> u32 {
        self.base_index
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the component has no port.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Check that `index` names a port.
    pub fn contains(&self, index: u32) -> bool {
        self.slot(&self.lock(), index).is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Port>> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, ports: &[Port], index: u32) -> Result<usize> {
        index
            .checked_sub(self.base_index)
            .map(|offset| offset as usize)
            .filter(|offset| *offset < ports.len())
            .ok_or(Error::BadPortIndex(index))
    }

    /// Run `f` on one port under the lock.
    pub fn with_port<R>(&self, index: u32, f: impl FnOnce(&mut Port) -> Result<R>) -> Result<R> {
        let mut ports = self.lock();
        let slot = self.slot(&ports, index)?;
        f(&mut ports[slot])
    }

    /// Expand a target into port indices.
    pub fn resolve(&self, target: PortTarget) -> Result<PortSet> {
        let ports = self.lock();
        match target {
            PortTarget::All => Ok(ports.iter().map(Port::index).collect()),
            PortTarget::Port(index) => {
                self.slot(&ports, index)?;
                Ok(smallvec::smallvec![index])
            }
        }
    }

    /// Transport of a port.
    pub fn dio(&self, index: u32) -> Result<Arc<dyn DioChannel>> {
        self.with_port(index, |port| Ok(Arc::clone(port.dio())))
    }

    /// Definition of a port.
    pub fn definition(&self, index: u32) -> Result<PortDefinition> {
        self.with_port(index, |port| Ok(port.definition()))
    }

    /// Readiness snapshot of every port.
    pub fn readiness(&self) -> Result<SmallVec<[PortReadiness; 4]>> {
        self.lock().iter().map(Port::readiness).collect()
    }

    // ========================================================================
    // Registration (UseBuffer / AllocateBuffer / FreeBuffer)
    // ========================================================================

    /// Record a new client-owned buffer. `allow` checks the caller's rules
    /// against the port before anything changes.
    pub fn register(
        &self,
        header: &BufferHeader,
        allow: impl FnOnce(&Port) -> Result<()>,
    ) -> Result<()> {
        let mut ports = self.lock();
        let slot = self.slot(&ports, header.port_index())?;
        let port = &mut ports[slot];
        allow(port)?;
        if header.capacity() < port.props().buffer_size {
            return Err(Error::BadParameter(format!(
                "buffer of {} bytes below port {} minimum of {}",
                header.capacity(),
                port.index(),
                port.props().buffer_size
            )));
        }
        port.buffers_mut()
            .register(header.id(), header.capacity(), header.is_allocated())?;
        tracing::trace!(port = port.index(), buffer = %header.id(), "buffer registered");
        drop(ports);
        self.population.notify_all();
        Ok(())
    }

    /// Remove a buffer. Ownership is checked before `allow`, so a buffer the
    /// client does not hold is always refused with InsufficientResources.
    pub fn release(
        &self,
        header: &BufferHeader,
        allow: impl FnOnce(&Port) -> Result<()>,
    ) -> Result<BufferEntry> {
        let mut ports = self.lock();
        let slot = self.slot(&ports, header.port_index())?;
        let port = &mut ports[slot];
        match port.buffers().owner(header.id()) {
            None => {
                return Err(Error::BadParameter(format!(
                    "{} not registered on port {}",
                    header.id(),
                    port.index()
                )));
            }
            Some(Owner::Client) if header.owner() == Owner::Client => {}
            Some(owner) => {
                return Err(Error::InsufficientResources(format!(
                    "{} is owned by {:?} and cannot be freed",
                    header.id(),
                    owner
                )));
            }
        }
        allow(port)?;
        let entry = port.buffers_mut().release(header.id())?;
        tracing::trace!(port = port.index(), buffer = %header.id(), "buffer released");
        drop(ports);
        self.population.notify_all();
        Ok(entry)
    }

    /// Wait until every port in `indices` satisfies `done`.
    fn wait_ports(
        &self,
        indices: &[u32],
        timeout: Duration,
        what: &str,
        done: impl Fn(&Port) -> bool,
    ) -> Result<()> {
        let ports = self.lock();
        let satisfied = |ports: &Vec<Port>| {
            indices.iter().all(|index| {
                self.slot(ports, *index)
                    .map(|slot| done(&ports[slot]))
                    .unwrap_or(true)
            })
        };
        let (ports, result) = self
            .population
            .wait_timeout_while(ports, timeout, |ports| !satisfied(&*ports))
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && !satisfied(&*ports) {
            return Err(Error::Timeout(format!(
                "ports {:?} not {} within {:?}",
                indices, what, timeout
            )));
        }
        Ok(())
    }

    /// Wait until the ports hold their full buffer complement.
    pub fn wait_populated(&self, indices: &[u32], timeout: Duration) -> Result<()> {
        self.wait_ports(indices, timeout, "populated", Port::is_populated)
    }

    /// Wait until the ports hold no buffer.
    pub fn wait_depopulated(&self, indices: &[u32], timeout: Duration) -> Result<()> {
        self.wait_ports(indices, timeout, "depopulated", Port::is_depopulated)
    }

    // ========================================================================
    // Hand-offs
    // ========================================================================

    /// Move a header's tag along `path`, in the table and on the header.
    /// The whole path is validated before anything changes.
    fn move_tag(port: &mut Port, header: &mut BufferHeader, path: &[Owner]) -> Result<()> {
        let id = header.id();
        let current = port.buffers().owner(id).ok_or_else(|| {
            Error::BadParameter(format!("{} not registered on port {}", id, port.index()))
        })?;
        if current != header.owner() {
            return Err(Error::IncorrectStateOperation(format!(
                "{} tagged {:?} but recorded as {:?}",
                id,
                header.owner(),
                current
            )));
        }
        path.iter().try_fold(current, |owner, to| owner.transfer(*to))?;

        let mut from = current;
        for &to in path {
            port.buffers_mut().transfer(id, from, to)?;
            header.transfer(to)?;
            from = to;
        }
        Ok(())
    }

    fn retag(
        &self,
        header: &mut BufferHeader,
        path: &[Owner],
        check: impl FnOnce(&Port) -> Result<()>,
    ) -> Result<Arc<dyn DioChannel>> {
        let mut ports = self.lock();
        let slot = self.slot(&ports, header.port_index())?;
        let port = &mut ports[slot];
        check(port)?;
        Self::move_tag(port, header, path)?;
        Ok(Arc::clone(port.dio()))
    }

    fn retag_rejected(&self, mut rejected: BufferRejected, path: &[Owner]) -> BufferRejected {
        if let Err(e) = self.retag(&mut rejected.header, path, |_| Ok(())) {
            tracing::error!(buffer = %rejected.header.id(), "failed to restore owner: {}", e);
        }
        rejected
    }

    /// Accept a client buffer into a port (EmptyThisBuffer/FillThisBuffer).
    pub fn submit(
        &self,
        mut header: BufferHeader,
        direction: PortDirection,
    ) -> std::result::Result<(), BufferRejected> {
        let eos = header.metadata().is_eos();
        let dio = match self.retag(&mut header, &[Owner::Component], |port| {
            if port.direction() != direction {
                return Err(Error::BadPortIndex(port.index()));
            }
            if !port.is_enabled() {
                return Err(Error::IncorrectStateOperation(format!(
                    "port {} is disabled",
                    port.index()
                )));
            }
            Ok(())
        }) {
            Ok(dio) => dio,
            Err(e) => return Err(BufferRejected::new(e, header)),
        };

        let index = header.port_index();
        if let Err(rejected) = dio.queue(header) {
            return Err(self.retag_rejected(rejected, &[Owner::Client]));
        }
        if eos && direction == PortDirection::Input {
            if let Err(e) = self.with_port(index, |port| {
                port.set_eos_received(true);
                Ok(())
            }) {
                tracing::warn!(port = index, "failed to record end of stream: {}", e);
            }
        }
        Ok(())
    }

    /// Hand the next queued buffer of a port to the codec.
    pub fn take(&self, index: u32) -> Result<Option<BufferHeader>> {
        let (dio, wait) = self.with_port(index, |port| {
            Ok((Arc::clone(port.dio()), port.props().dequeue_timeout))
        })?;
        let Some(mut header) = dio.dequeue(wait)? else {
            return Ok(None);
        };
        match self.retag(&mut header, &[Owner::Codec], |_| Ok(())) {
            Ok(_) => Ok(Some(header)),
            Err(e) => {
                tracing::error!(port = index, buffer = %header.id(), "dequeued unknown buffer: {}", e);
                Err(e)
            }
        }
    }

    /// Send a processed buffer back to the client.
    pub fn deliver(&self, mut header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        let path: &[Owner] = match header.owner() {
            Owner::Codec => &[Owner::Component, Owner::Client],
            _ => &[Owner::Client],
        };
        let origin = header.owner();
        let dio = match self.retag(&mut header, path, |_| Ok(())) {
            Ok(dio) => dio,
            Err(e) => return Err(BufferRejected::new(e, header)),
        };
        dio.send(header).map_err(|rejected| {
            let back: &[Owner] = match origin {
                Owner::Codec => &[Owner::Component, Owner::Codec],
                _ => &[Owner::Component],
            };
            self.retag_rejected(rejected, back)
        })
    }

    /// Put a codec-held buffer back at the head of its port's queue.
    pub fn requeue(&self, mut header: BufferHeader) -> std::result::Result<(), BufferRejected> {
        let dio = match self.retag(&mut header, &[Owner::Component], |_| Ok(())) {
            Ok(dio) => dio,
            Err(e) => return Err(BufferRejected::new(e, header)),
        };
        dio.requeue(header)
            .map_err(|rejected| self.retag_rejected(rejected, &[Owner::Codec]))
    }

    /// Return every buffer queued on a port to the client. Returns the
    /// number of buffers handed back.
    pub fn return_queued(&self, index: u32) -> Result<usize> {
        let dio = self.dio(index)?;
        let mut drained = Vec::new();
        while let Some(header) = dio.try_dequeue()? {
            drained.push(header);
        }
        if drained.is_empty() {
            return Ok(0);
        }

        {
            let mut ports = self.lock();
            let slot = self.slot(&ports, index)?;
            for header in drained.iter_mut() {
                if let Err(e) = Self::move_tag(&mut ports[slot], header, &[Owner::Client]) {
                    tracing::error!(port = index, buffer = %header.id(), "flush retag failed: {}", e);
                }
            }
        }

        let count = drained.len();
        for header in drained {
            if let Err(rejected) = dio.cancel(header) {
                tracing::error!(port = index, "cancel refused: {}", rejected.error);
            }
        }
        tracing::debug!(port = index, count, "returned queued buffers");
        Ok(count)
    }

    // ========================================================================
    // Port operations
    // ========================================================================

    /// Set or clear the in-transition flag on ports.
    pub fn set_transition(&self, indices: &[u32], in_transition: bool) {
        let mut ports = self.lock();
        for index in indices {
            if let Ok(slot) = self.slot(&ports, *index) {
                ports[slot].set_in_transition(in_transition);
            }
        }
    }

    /// Flush a port: return queued buffers to the client and clear EOS.
    /// Flushing an empty port is a no-op.
    pub fn flush_port(&self, index: u32) -> Result<usize> {
        let dio = self.dio(index)?;
        dio.control(DioControl::SetFlushing(true))?;
        let returned = self.return_queued(index);
        dio.control(DioControl::ResetEos)?;
        dio.control(DioControl::SetFlushing(false))?;
        self.with_port(index, |port| {
            port.set_eos_received(false);
            Ok(())
        })?;
        returned
    }

    /// Open the transport of a port if it is closed. Returns whether this
    /// call opened it.
    pub fn open(&self, index: u32) -> Result<bool> {
        let dio = self.dio(index)?;
        if dio.is_open() {
            return Ok(false);
        }
        dio.open()?;
        Ok(true)
    }

    /// Close the transport of a port if it is open.
    pub fn close(&self, index: u32) -> Result<()> {
        let dio = self.dio(index)?;
        if dio.is_open() {
            dio.close()?;
        }
        Ok(())
    }

    /// Indices of enabled ports.
    pub fn enabled(&self) -> PortSet {
        self.lock()
            .iter()
            .filter(|port| port.is_enabled())
            .map(Port::index)
            .collect()
    }

    /// Indices of all ports.
    pub fn all(&self) -> PortSet {
        self.lock().iter().map(Port::index).collect()
    }

    /// Enable a port. With `populate`, wait for its buffer complement; with
    /// `open`, open its transport. Returns whether the transport was opened
    /// by this call.
    pub fn enable_port(&self, index: u32, populate: Option<Duration>, open: bool) -> Result<bool> {
        self.with_port(index, |port| {
            port.set_enabled(true);
            Ok(())
        })?;
        if let Some(timeout) = populate {
            self.wait_populated(&[index], timeout)?;
        }
        let opened = if open { self.open(index)? } else { false };
        tracing::debug!(port = index, "port enabled");
        Ok(opened)
    }

    /// Disable a port: return its queued buffers, wait for the client to
    /// free all of them and close the transport.
    ///
    /// Fails if the codec still holds buffers of the port.
    pub fn disable_port(&self, index: u32, timeout: Duration) -> Result<()> {
        self.with_port(index, |port| {
            port.set_enabled(false);
            Ok(())
        })?;
        self.flush_port(index)?;
        let held = self.with_port(index, |port| Ok(port.codec_buffers()))?;
        if held > 0 {
            return Err(Error::IncorrectStateOperation(format!(
                "codec still holds {} buffers of port {}",
                held, index
            )));
        }
        self.wait_depopulated(&[index], timeout)?;
        self.close(index)?;
        tracing::debug!(port = index, "port disabled");
        Ok(())
    }

    /// Buffers of a port the codec holds.
    pub fn codec_held(&self, index: u32) -> Result<usize> {
        self.with_port(index, |port| Ok(port.codec_buffers()))
    }

    /// Tear down every transport. Buffers still queued are handed back to
    /// the client.
    pub fn deinit(&self) {
        let dios: Vec<_> = self.lock().iter().map(|p| Arc::clone(p.dio())).collect();
        for dio in dios {
            for mut header in dio.deinit() {
                let index = header.port_index();
                let retagged = self.with_port(index, |port| {
                    Self::move_tag(port, &mut header, &[Owner::Client])
                });
                if let Err(e) = retagged {
                    tracing::warn!(port = index, "deinit retag failed: {}", e);
                }
                if let Err(rejected) = dio.cancel(header) {
                    tracing::warn!(port = index, "deinit cancel refused: {}", rejected.error);
                }
            }
        }
    }
}

impl std::fmt::Debug for PortManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortManager")
            .field("base_index", &self.base_index)
            .field("ports", &*self.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortConfig;
    use crate::dio::{DioContext, DioRegistry};
    use crate::port::PortProps;
    use std::thread;

    type Returned = Arc<Mutex<Vec<BufferHeader>>>;

    fn manager(base: u32, configs: &[PortConfig]) -> (Arc<PortManager>, Returned) {
        let registry = DioRegistry::builtin();
        let returned: Returned = Arc::default();
        let ports = configs
            .iter()
            .enumerate()
            .map(|(i, config)| {
                let sink_target = Arc::clone(&returned);
                let index = base + i as u32;
                let dio = registry
                    .create(
                        &config.channel,
                        DioContext {
                            port_index: index,
                            direction: config.direction,
                            props: config.props.clone(),
                            sink: Arc::new(move |h: BufferHeader| sink_target.lock().unwrap().push(h)),
                        },
                    )
                    .unwrap();
                Port::new(index, config, dio)
            })
            .collect();
        (Arc::new(PortManager::new(base, ports)), returned)
    }

    fn input(count: usize) -> PortConfig {
        PortConfig::input().with_props(PortProps::default().with_buffer_count(count).with_buffer_size(8))
    }

    fn populate(mgr: &PortManager, index: u32, n: usize) -> Vec<BufferHeader> {
        (0..n)
            .map(|_| {
                let header = BufferHeader::allocate(index, 8);
                mgr.register(&header, |_| Ok(())).unwrap();
                header
            })
            .collect()
    }

    #[test]
    fn test_bad_port_index() {
        let (mgr, _) = manager(4, &[input(1)]);
        assert!(mgr.contains(4));
        assert!(!mgr.contains(3));
        assert_eq!(mgr.resolve(PortTarget::Port(5)).unwrap_err(), Error::BadPortIndex(5));
        assert_eq!(mgr.resolve(PortTarget::All).unwrap().as_slice(), &[4]);
    }

    #[test]
    fn test_register_checks_size() {
        let (mgr, _) = manager(0, &[input(2)]);
        let small = BufferHeader::allocate(0, 4);
        assert!(matches!(
            mgr.register(&small, |_| Ok(())),
            Err(Error::BadParameter(_))
        ));
        populate(&mgr, 0, 2);
        assert!(mgr.with_port(0, |p| Ok(p.is_populated())).unwrap());
    }

    #[test]
    fn test_submit_take_deliver() {
        let (mgr, returned) = manager(0, &[input(2)]);
        let mut headers = populate(&mgr, 0, 2);
        mgr.open(0).unwrap();

        mgr.submit(headers.remove(0), PortDirection::Input).unwrap();
        assert_eq!(mgr.with_port(0, |p| Ok(p.held_buffers())).unwrap(), 1);

        let taken = mgr.take(0).unwrap().unwrap();
        assert_eq!(taken.owner(), Owner::Codec);
        assert_eq!(mgr.codec_held(0).unwrap(), 1);

        mgr.deliver(taken).unwrap();
        let back = returned.lock().unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].owner(), Owner::Client);
        assert_eq!(mgr.codec_held(0).unwrap(), 0);
    }

    #[test]
    fn test_submit_wrong_direction_hands_back() {
        let (mgr, _) = manager(0, &[input(1)]);
        let mut headers = populate(&mgr, 0, 1);
        mgr.open(0).unwrap();
        let rejected = mgr
            .submit(headers.remove(0), PortDirection::Output)
            .unwrap_err();
        assert_eq!(rejected.error, Error::BadPortIndex(0));
        assert_eq!(rejected.header.owner(), Owner::Client);
    }

    #[test]
    fn test_rejected_queue_restores_owner() {
        let (mgr, _) = manager(0, &[input(1)]);
        let mut headers = populate(&mgr, 0, 1);
        // Transport still closed.
        let rejected = mgr
            .submit(headers.remove(0), PortDirection::Input)
            .unwrap_err();
        assert!(matches!(rejected.error, Error::IncorrectStateOperation(_)));
        assert_eq!(rejected.header.owner(), Owner::Client);
        assert_eq!(mgr.with_port(0, |p| Ok(p.held_buffers())).unwrap(), 0);
    }

    #[test]
    fn test_submit_eos_reaches_readiness() {
        let (mgr, _) = manager(0, &[input(1)]);
        let mut headers = populate(&mgr, 0, 1);
        mgr.open(0).unwrap();
        let mut h = headers.remove(0);
        h.metadata_mut().flags.eos = true;
        mgr.submit(h, PortDirection::Input).unwrap();

        assert!(mgr.with_port(0, |p| Ok(p.eos_received())).unwrap());
        assert!(mgr.readiness().unwrap()[0].eos);
    }

    #[test]
    fn test_flush_returns_and_is_idempotent() {
        let (mgr, returned) = manager(0, &[input(2)]);
        let headers = populate(&mgr, 0, 2);
        mgr.open(0).unwrap();
        for mut h in headers {
            h.metadata_mut().flags.eos = true;
            mgr.submit(h, PortDirection::Input).unwrap();
        }
        assert!(mgr.with_port(0, |p| Ok(p.eos_received())).unwrap());

        assert_eq!(mgr.flush_port(0).unwrap(), 2);
        assert_eq!(returned.lock().unwrap().len(), 2);
        assert!(!mgr.with_port(0, |p| Ok(p.eos_received())).unwrap());

        let before = mgr.with_port(0, |p| Ok(p.buffers().len())).unwrap();
        assert_eq!(mgr.flush_port(0).unwrap(), 0);
        assert_eq!(mgr.with_port(0, |p| Ok(p.buffers().len())).unwrap(), before);
    }

    #[test]
    fn test_release_refuses_codec_owned() {
        let (mgr, _) = manager(0, &[input(1)]);
        let mut headers = populate(&mgr, 0, 1);
        mgr.open(0).unwrap();
        mgr.submit(headers.remove(0), PortDirection::Input).unwrap();
        let taken = mgr.take(0).unwrap().unwrap();

        let err = mgr.release(&taken, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::InsufficientResources(_)));
    }

    #[test]
    fn test_disable_waits_for_depopulation() {
        let (mgr, returned) = manager(0, &[input(2)]);
        let headers = populate(&mgr, 0, 2);
        mgr.open(0).unwrap();
        for h in headers {
            mgr.submit(h, PortDirection::Input).unwrap();
        }

        let freer = {
            let mgr = Arc::clone(&mgr);
            let returned = Arc::clone(&returned);
            thread::spawn(move || {
                let mut freed = 0;
                while freed < 2 {
                    let batch: Vec<_> = returned.lock().unwrap().drain(..).collect();
                    for h in batch {
                        mgr.release(&h, |_| Ok(())).unwrap();
                        freed += 1;
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };

        mgr.disable_port(0, Duration::from_secs(2)).unwrap();
        freer.join().unwrap();
        mgr.with_port(0, |p| {
            assert!(!p.is_enabled());
            assert!(p.is_depopulated());
            assert!(!p.dio().is_open());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_disable_fails_while_codec_holds() {
        let (mgr, _) = manager(0, &[input(1)]);
        let mut headers = populate(&mgr, 0, 1);
        mgr.open(0).unwrap();
        mgr.submit(headers.remove(0), PortDirection::Input).unwrap();
        let _held = mgr.take(0).unwrap().unwrap();

        let err = mgr.disable_port(0, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::IncorrectStateOperation(_)));
    }

    #[test]
    fn test_wait_populated_times_out() {
        let (mgr, _) = manager(0, &[input(2)]);
        populate(&mgr, 0, 1);
        let err = mgr.wait_populated(&[0], Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_requeue_returns_to_port() {
        let (mgr, _) = manager(0, &[input(1)]);
        let mut headers = populate(&mgr, 0, 1);
        mgr.open(0).unwrap();
        mgr.submit(headers.remove(0), PortDirection::Input).unwrap();
        let taken = mgr.take(0).unwrap().unwrap();
        mgr.requeue(taken).unwrap();
        assert_eq!(mgr.codec_held(0).unwrap(), 0);
        assert_eq!(mgr.readiness().unwrap()[0].available, 1);
    }

    #[test]
    fn test_requeue_keeps_order() {
        let (mgr, _) = manager(0, &[input(2)]);
        let headers = populate(&mgr, 0, 2);
        let ids: Vec<_> = headers.iter().map(|h| h.id()).collect();
        mgr.open(0).unwrap();
        for header in headers {
            mgr.submit(header, PortDirection::Input).unwrap();
        }

        let first = mgr.take(0).unwrap().unwrap();
        assert_eq!(first.id(), ids[0]);
        mgr.requeue(first).unwrap();
        assert_eq!(mgr.take(0).unwrap().unwrap().id(), ids[0]);
        assert_eq!(mgr.take(0).unwrap().unwrap().id(), ids[1]);
    }
}
