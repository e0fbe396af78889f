//! # Service
//!
//! A single logical network endpoint. A service owns its engine driver
//! exclusively, keeps the live handler/coder/facade/exception tables that
//! registration binding fills in at start time, and exposes the session and
//! messaging surface of the engine. Frame pacing state (`fps`,
//! `frame_interval`, last schedule time) belongs to the service; the
//! directory's scheduler reads it every tick.
//!
//! ## Lifecycle
//!
//! `Created -> Started -> Terminating -> Terminated`, with directory removal as
//! the final step. `stop()` never tears the service down synchronously; it
//! queues the service for the directory's end-of-tick drain. A service that
//! reached Terminated may be started again; its live tables were cleared at
//! termination so binding re-runs cleanly.

use crate::codec::{CodecStrategy, CoderSpec, Encodable};
use crate::config::RuntimeConfig;
use crate::driver::ServiceDriver;
use crate::error::{NetmuxError, Result};
use crate::opcode::{Opcode, OpcodeSource};
use crate::packet::{PacketPart, SessionId};
use crate::service::facade::{Facade, FacadeInstance};
use crate::service::handler::{ExceptionHandler, HandlerRole, PacketHandler};
use crate::service::wrapped::{ServiceRef, WrappedHandler};
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::directory::ServiceDirectory;

/// Kind of a service: Normal services run payload codecs, Raw services move
/// opaque bytes with opcode 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Normal,
    Raw,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Normal => write!(f, "normal"),
            ServiceKind::Raw => write!(f, "raw"),
        }
    }
}

/// Lifecycle state of a service. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Started,
    Terminating,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "created"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Terminating => write!(f, "terminating"),
            LifecycleState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Optional knobs for outbound messages.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Explicit opcode; when absent on a Normal service, the encoder table
    /// resolves it from the payload type.
    pub opcode: Option<Opcode>,
    pub status: i32,
    pub parts: Vec<PacketPart>,
}

impl SendOptions {
    pub fn with_opcode(mut self, opcode: impl OpcodeSource) -> Self {
        self.opcode = Some(opcode.opcode());
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn with_parts(mut self, parts: Vec<PacketPart>) -> Self {
        self.parts = parts;
        self
    }
}

/// A single logical network endpoint.
pub struct Service {
    id: Uuid,
    name: String,
    kind: ServiceKind,
    driver: Arc<dyn ServiceDriver>,
    driver_released: AtomicBool,
    state: Mutex<LifecycleState>,
    fps: AtomicU32,
    fps_bounds: (u32, u32),
    poller_count: usize,
    frame_interval: Mutex<Duration>,
    last_schedule: Mutex<Option<Instant>>,
    handlers: RwLock<HashMap<Opcode, Arc<WrappedHandler>>>,
    pre_handlers: RwLock<HashMap<Opcode, Arc<WrappedHandler>>>,
    unify_pre_handler: Mutex<Option<Arc<dyn PacketHandler>>>,
    encoders: RwLock<HashMap<TypeId, Opcode>>,
    facades: RwLock<HashMap<TypeId, FacadeInstance>>,
    subscribe_exc_handlers: RwLock<HashMap<Opcode, Arc<dyn ExceptionHandler>>>,
    pre_subscribe_exc_handlers: RwLock<HashMap<Opcode, Arc<dyn ExceptionHandler>>>,
    default_subscribe_exc_handler: Mutex<Option<Arc<dyn ExceptionHandler>>>,
    default_pre_subscribe_exc_handler: Mutex<Option<Arc<dyn ExceptionHandler>>>,
    directory: Weak<ServiceDirectory>,
    weak_self: Weak<Service>,
}

impl Service {
    pub(crate) fn new(
        directory: &Arc<ServiceDirectory>,
        name: String,
        kind: ServiceKind,
        driver: Arc<dyn ServiceDriver>,
        config: &RuntimeConfig,
    ) -> Arc<Self> {
        let fps = driver.fps();
        let frame_interval = driver.frame_interval();
        Arc::new_cyclic(|weak_self| Self {
            id: Uuid::new_v4(),
            name,
            kind,
            driver,
            driver_released: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Created),
            fps: AtomicU32::new(fps),
            fps_bounds: (config.min_fps, config.max_fps),
            poller_count: config.poller_count,
            frame_interval: Mutex::new(frame_interval),
            last_schedule: Mutex::new(None),
            handlers: RwLock::new(HashMap::new()),
            pre_handlers: RwLock::new(HashMap::new()),
            unify_pre_handler: Mutex::new(None),
            encoders: RwLock::new(HashMap::new()),
            facades: RwLock::new(HashMap::new()),
            subscribe_exc_handlers: RwLock::new(HashMap::new()),
            pre_subscribe_exc_handlers: RwLock::new(HashMap::new()),
            default_subscribe_exc_handler: Mutex::new(None),
            default_pre_subscribe_exc_handler: Mutex::new(None),
            directory: Arc::downgrade(directory),
            weak_self: weak_self.clone(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::SeqCst)
    }

    pub fn frame_interval(&self) -> Duration {
        *self.frame_interval.lock()
    }

    /// Set the service frame rate, validated against the configured range,
    /// and refresh the engine-derived frame interval.
    pub fn set_fps(&self, fps: u32) -> Result<()> {
        let (min, max) = self.fps_bounds;
        if fps < min || fps > max {
            return Err(NetmuxError::FpsOutOfRange { fps, min, max });
        }
        self.driver.set_fps(fps).map_err(NetmuxError::Engine)?;
        self.fps.store(fps, Ordering::SeqCst);
        *self.frame_interval.lock() = self.driver.frame_interval();
        Ok(())
    }

    pub fn codec(&self) -> CodecStrategy {
        self.driver.codec()
    }

    pub fn set_codec(&self, codec: CodecStrategy) -> Result<()> {
        self.driver.set_codec(codec).map_err(NetmuxError::Engine)
    }

    /// Start the service with the configured poller count.
    ///
    /// Binds every applicable registration record, re-registers the service
    /// in the directory if it had been removed, and starts the engine
    /// driver. Starting a Started service or one still terminating is a
    /// configuration error.
    pub fn start(&self) -> Result<()> {
        self.start_with_pollers(self.poller_count)
    }

    /// Start the service with an explicit poller count.
    pub fn start_with_pollers(&self, poller_count: usize) -> Result<()> {
        self.start_check()?;

        let directory = self.directory.upgrade().ok_or(NetmuxError::DirectoryGone)?;
        let this = self.weak_self.upgrade().ok_or(NetmuxError::DirectoryGone)?;
        directory.apply_registrations(&this)?;
        directory.readd_if_absent(&this)?;

        self.driver
            .start(poller_count)
            .map_err(NetmuxError::Engine)?;
        *self.state.lock() = LifecycleState::Started;
        info!(service = %self.name, kind = %self.kind, pollers = poller_count, "Service started");
        Ok(())
    }

    /// Stop the service.
    ///
    /// The service leaves the Started state immediately and is queued for
    /// the directory's end-of-tick drain; it is never removed from the live
    /// sequence synchronously. Stopping a service that is not started is a
    /// no-op.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Started {
                return Ok(());
            }
            *state = LifecycleState::Terminating;
        }

        let result = self.driver.stop().map_err(NetmuxError::Engine);
        // Queued for deferred teardown even when the engine stop failed.
        if let (Some(directory), Some(this)) =
            (self.directory.upgrade(), self.weak_self.upgrade())
        {
            directory.queue_removal(&this);
        }
        info!(service = %self.name, "Service stopping");
        result
    }

    fn start_check(&self) -> Result<()> {
        match *self.state.lock() {
            LifecycleState::Started => Err(NetmuxError::ServiceAlreadyStarted {
                name: self.name.clone(),
            }),
            LifecycleState::Terminating => Err(NetmuxError::ServiceTerminating {
                name: self.name.clone(),
            }),
            LifecycleState::Created | LifecycleState::Terminated => Ok(()),
        }
    }

    /// Complete a deferred termination: Terminating becomes Terminated and
    /// the live binding tables are cleared so a later start re-binds from
    /// the registry.
    pub(crate) fn finish_termination(&self) {
        let cleared = {
            let mut state = self.state.lock();
            if *state == LifecycleState::Terminating {
                *state = LifecycleState::Terminated;
                true
            } else {
                false
            }
        };
        if cleared {
            self.clear_bindings();
            debug!(service = %self.name, "Service terminated");
        }
    }

    fn clear_bindings(&self) {
        self.handlers.write().clear();
        self.pre_handlers.write().clear();
        *self.unify_pre_handler.lock() = None;
        self.encoders.write().clear();
        self.facades.write().clear();
        self.subscribe_exc_handlers.write().clear();
        self.pre_subscribe_exc_handlers.write().clear();
        *self.default_subscribe_exc_handler.lock() = None;
        *self.default_pre_subscribe_exc_handler.lock() = None;
        *self.last_schedule.lock() = None;
    }

    fn service_ref(&self) -> ServiceRef {
        ServiceRef::new(self.directory.clone(), self.name.clone())
    }

    /// Subscribe a handler for an opcode. A second subscription for the
    /// same opcode is a configuration error.
    pub fn subscribe(&self, opcode: impl OpcodeSource, handler: Arc<dyn PacketHandler>) -> Result<()> {
        let opcode = opcode.opcode();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&opcode) {
            return Err(NetmuxError::DuplicateSubscription {
                service: self.name.clone(),
                role: HandlerRole::Subscribe,
                opcode,
            });
        }
        let wrapped = Arc::new(WrappedHandler::new(
            HandlerRole::Subscribe,
            self.service_ref(),
            handler,
        ));
        self.driver
            .subscribe(opcode, wrapped.clone())
            .map_err(NetmuxError::Engine)?;
        handlers.insert(opcode, wrapped);
        debug!(service = %self.name, opcode = %opcode, "Handler subscribed");
        Ok(())
    }

    /// Pre-subscribe a handler for an opcode. Same duplicate policy as
    /// [`subscribe`](Self::subscribe).
    pub fn pre_subscribe(
        &self,
        opcode: impl OpcodeSource,
        handler: Arc<dyn PacketHandler>,
    ) -> Result<()> {
        let opcode = opcode.opcode();
        let mut pre_handlers = self.pre_handlers.write();
        if pre_handlers.contains_key(&opcode) {
            return Err(NetmuxError::DuplicateSubscription {
                service: self.name.clone(),
                role: HandlerRole::PreSubscribe,
                opcode,
            });
        }
        let wrapped = Arc::new(WrappedHandler::new(
            HandlerRole::PreSubscribe,
            self.service_ref(),
            handler,
        ));
        self.driver
            .pre_subscribe(opcode, wrapped.clone())
            .map_err(NetmuxError::Engine)?;
        pre_handlers.insert(opcode, wrapped);
        debug!(service = %self.name, opcode = %opcode, "Pre-handler subscribed");
        Ok(())
    }

    /// Install the single unify-pre-handler. Installing a second one is a
    /// configuration error.
    pub fn unify_pre_subscribe(&self, handler: Arc<dyn PacketHandler>) -> Result<()> {
        let mut slot = self.unify_pre_handler.lock();
        if slot.is_some() {
            return Err(NetmuxError::DuplicateUnifyPreHandler {
                service: self.name.clone(),
            });
        }
        self.driver
            .unify_pre_subscribe(handler.clone())
            .map_err(NetmuxError::Engine)?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn has_handler(&self, opcode: impl OpcodeSource) -> bool {
        self.handlers.read().contains_key(&opcode.opcode())
    }

    pub fn has_pre_handler(&self, opcode: impl OpcodeSource) -> bool {
        self.pre_handlers.read().contains_key(&opcode.opcode())
    }

    pub fn has_unify_pre_handler(&self) -> bool {
        self.unify_pre_handler.lock().is_some()
    }

    /// Set or clear (with `None`) the exception handler for subscribed
    /// handlers on one opcode.
    pub fn set_subscribe_exc_handler(
        &self,
        opcode: impl OpcodeSource,
        handler: Option<Arc<dyn ExceptionHandler>>,
    ) {
        let opcode = opcode.opcode();
        let mut table = self.subscribe_exc_handlers.write();
        match handler {
            Some(handler) => {
                table.insert(opcode, handler);
            }
            None => {
                table.remove(&opcode);
            }
        }
    }

    /// Set or clear the exception handler for pre-subscribed handlers on
    /// one opcode.
    pub fn set_pre_subscribe_exc_handler(
        &self,
        opcode: impl OpcodeSource,
        handler: Option<Arc<dyn ExceptionHandler>>,
    ) {
        let opcode = opcode.opcode();
        let mut table = self.pre_subscribe_exc_handlers.write();
        match handler {
            Some(handler) => {
                table.insert(opcode, handler);
            }
            None => {
                table.remove(&opcode);
            }
        }
    }

    pub fn set_default_subscribe_exc_handler(&self, handler: Option<Arc<dyn ExceptionHandler>>) {
        *self.default_subscribe_exc_handler.lock() = handler;
    }

    pub fn set_default_pre_subscribe_exc_handler(&self, handler: Option<Arc<dyn ExceptionHandler>>) {
        *self.default_pre_subscribe_exc_handler.lock() = handler;
    }

    /// Resolve the exception handler for a role and opcode: the
    /// opcode-specific handler wins, the role default is the fallback.
    pub fn exception_handler_for(
        &self,
        role: HandlerRole,
        opcode: Opcode,
    ) -> Option<Arc<dyn ExceptionHandler>> {
        match role {
            HandlerRole::Subscribe => self
                .subscribe_exc_handlers
                .read()
                .get(&opcode)
                .cloned()
                .or_else(|| self.default_subscribe_exc_handler.lock().clone()),
            HandlerRole::PreSubscribe => self
                .pre_subscribe_exc_handlers
                .read()
                .get(&opcode)
                .cloned()
                .or_else(|| self.default_pre_subscribe_exc_handler.lock().clone()),
        }
    }

    /// Register a payload type as the encoder for an opcode. One opcode per
    /// payload type; duplicates are configuration errors.
    pub fn register_encoder<T: Encodable + 'static>(&self, opcode: impl OpcodeSource) -> Result<()> {
        self.insert_encoder(opcode.opcode(), TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub(crate) fn register_encoder_spec(&self, opcode: Opcode, spec: &CoderSpec) -> Result<()> {
        self.insert_encoder(opcode, spec.type_id(), spec.type_name())
    }

    fn insert_encoder(&self, opcode: Opcode, type_id: TypeId, type_name: &str) -> Result<()> {
        let mut encoders = self.encoders.write();
        if encoders.contains_key(&type_id) {
            return Err(NetmuxError::DuplicateEncoder {
                service: self.name.clone(),
                type_name: type_name.to_string(),
            });
        }
        encoders.insert(type_id, opcode);
        debug!(service = %self.name, opcode = %opcode, payload = type_name, "Encoder registered");
        Ok(())
    }

    /// Register a decoder for an opcode; the binding itself is delegated to
    /// the engine.
    pub fn register_decoder(&self, opcode: impl OpcodeSource, spec: CoderSpec) -> Result<()> {
        let opcode = opcode.opcode();
        if !spec.can_decode() {
            return Err(NetmuxError::MissingCapability {
                subject: spec.type_name().to_string(),
                capability: "decoder",
            });
        }
        self.driver
            .register_decoder(opcode, spec)
            .map_err(NetmuxError::Engine)
    }

    /// Register a facade instance. At most one facade per concrete type per
    /// service.
    pub fn register_facade<F: Facade + 'static>(&self, facade: F) -> Result<()> {
        self.install_facade(FacadeInstance::new(facade))
    }

    pub(crate) fn install_facade(&self, instance: FacadeInstance) -> Result<()> {
        let mut facades = self.facades.write();
        if facades.contains_key(&instance.type_id()) {
            return Err(NetmuxError::DuplicateFacade {
                service: self.name.clone(),
                type_name: instance.type_name().to_string(),
            });
        }
        self.driver
            .register_facade(instance.facade())
            .map_err(NetmuxError::Engine)?;
        debug!(service = %self.name, facade = instance.type_name(), "Facade registered");
        facades.insert(instance.type_id(), instance);
        Ok(())
    }

    /// The facade instance of a concrete type, if one is registered.
    pub fn facade<F: Facade + 'static>(&self) -> Option<Arc<F>> {
        self.facades
            .read()
            .get(&TypeId::of::<F>())
            .and_then(|instance| instance.downcast::<F>())
    }

    pub fn facade_count(&self) -> usize {
        self.facades.read().len()
    }

    pub fn listen(&self, addr: SocketAddr) -> Result<SessionId> {
        self.driver.listen(addr).map_err(NetmuxError::Engine)
    }

    pub fn connect(&self, addr: SocketAddr) -> Result<SessionId> {
        self.driver.connect(addr).map_err(NetmuxError::Engine)
    }

    pub fn async_connect(&self, addr: SocketAddr) -> Result<()> {
        self.driver.async_connect(addr).map_err(NetmuxError::Engine)
    }

    pub fn remove_session(&self, session_id: SessionId) -> Result<()> {
        self.driver
            .remove_session(session_id)
            .map_err(NetmuxError::Engine)
    }

    /// Send a payload to one session.
    pub fn send<P: Encodable + 'static>(&self, session_id: SessionId, payload: &P) -> Result<()> {
        self.send_with(session_id, payload, SendOptions::default())
    }

    /// Send a payload to one session with explicit options.
    pub fn send_with<P: Encodable + 'static>(
        &self,
        session_id: SessionId,
        payload: &P,
        options: SendOptions,
    ) -> Result<()> {
        let opcode = self.resolve_opcode::<P>(options.opcode)?;
        let bytes = encode_payload(payload)?;
        self.driver
            .send(session_id, opcode, bytes, options.status, &options.parts)
            .map_err(NetmuxError::Engine)
    }

    /// Send a payload to several sessions.
    pub fn multicast<P: Encodable + 'static>(
        &self,
        session_ids: &[SessionId],
        payload: &P,
        options: SendOptions,
    ) -> Result<()> {
        let opcode = self.resolve_opcode::<P>(options.opcode)?;
        let bytes = encode_payload(payload)?;
        self.driver
            .multicast(session_ids, opcode, bytes, options.status, &options.parts)
            .map_err(NetmuxError::Engine)
    }

    /// Send a payload to every session.
    pub fn broadcast<P: Encodable + 'static>(&self, payload: &P, options: SendOptions) -> Result<()> {
        let opcode = self.resolve_opcode::<P>(options.opcode)?;
        let bytes = encode_payload(payload)?;
        self.driver
            .broadcast(opcode, bytes, options.status, &options.parts)
            .map_err(NetmuxError::Engine)
    }

    fn resolve_opcode<P: 'static>(&self, explicit: Option<Opcode>) -> Result<Opcode> {
        if self.kind == ServiceKind::Raw {
            return Ok(Opcode::RAW);
        }
        if let Some(opcode) = explicit {
            return Ok(opcode);
        }
        self.encoders
            .read()
            .get(&TypeId::of::<P>())
            .copied()
            .ok_or_else(|| NetmuxError::MissingEncoder {
                service: self.name.clone(),
                type_name: std::any::type_name::<P>().to_string(),
            })
    }

    pub(crate) fn frame_due(&self, now: Instant) -> bool {
        match *self.last_schedule.lock() {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.frame_interval(),
        }
    }

    pub(crate) fn mark_scheduled(&self, at: Instant) {
        *self.last_schedule.lock() = Some(at);
    }

    pub(crate) async fn step(&self) -> anyhow::Result<()> {
        self.driver.mainloop_step().await
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        // The engine handle is released exactly once, whichever path drops
        // the service.
        if !self.driver_released.swap(true, Ordering::SeqCst) {
            self.driver.destroy();
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service '{}' ({}, {}, id {})",
            self.name,
            self.kind,
            self.state(),
            self.id
        )
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("fps", &self.fps())
            .finish()
    }
}

fn encode_payload<P: Encodable>(payload: &P) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    payload.encode(&mut buf)?;
    Ok(buf.freeze())
}
