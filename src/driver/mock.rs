//! # Mock Engine
//!
//! In-memory [`NetworkEngine`]/[`ServiceDriver`] pair that records every
//! call crossing the engine boundary. Tests assert binding and scheduling
//! behavior at this seam and inject step or timer failures through the
//! behavior hooks; embedders can use it to exercise the runtime without a
//! native engine.

use crate::codec::{CodecStrategy, CoderSpec};
use crate::constants;
use crate::driver::{NetworkEngine, ServiceDriver};
use crate::opcode::Opcode;
use crate::packet::{PacketPart, SessionId};
use crate::service::core::ServiceKind;
use crate::service::facade::Facade;
use crate::service::handler::PacketHandler;
use crate::service::wrapped::WrappedHandler;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type BehaviorFn = Box<dyn FnMut(usize) -> anyhow::Result<()> + Send>;

/// How an outbound message left the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendKind {
    Unicast(SessionId),
    Multicast(Vec<SessionId>),
    Broadcast,
}

/// One recorded outbound message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub kind: SendKind,
    pub opcode: Opcode,
    pub payload: Bytes,
    pub status: i32,
    pub parts: Vec<PacketPart>,
}

/// Recording mock engine.
#[derive(Default)]
pub struct MockEngine {
    drivers: Mutex<Vec<Arc<MockDriver>>>,
    timers_advanced: AtomicUsize,
    error_hook_installed: AtomicBool,
    timer_behavior: Mutex<Option<BehaviorFn>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The driver created for `name`, if any.
    pub fn driver(&self, name: &str) -> Option<Arc<MockDriver>> {
        self.drivers.lock().iter().find(|d| d.name == name).cloned()
    }

    pub fn timers_advanced(&self) -> usize {
        self.timers_advanced.load(Ordering::SeqCst)
    }

    pub fn error_hook_installed(&self) -> bool {
        self.error_hook_installed.load(Ordering::SeqCst)
    }

    /// Install a hook run on every `advance_timers` call, receiving the
    /// zero-based advance count; an `Err` is surfaced as a timer failure.
    pub fn set_timer_behavior(
        &self,
        behavior: impl FnMut(usize) -> anyhow::Result<()> + Send + 'static,
    ) {
        *self.timer_behavior.lock() = Some(Box::new(behavior));
    }
}

impl NetworkEngine for MockEngine {
    fn create_driver(&self, name: &str, kind: ServiceKind) -> anyhow::Result<Arc<dyn ServiceDriver>> {
        let driver = Arc::new(MockDriver::new(name, kind));
        self.drivers.lock().push(driver.clone());
        Ok(driver)
    }

    fn advance_timers(&self) -> anyhow::Result<()> {
        let count = self.timers_advanced.fetch_add(1, Ordering::SeqCst);
        if let Some(behavior) = self.timer_behavior.lock().as_mut() {
            behavior(count)?;
        }
        Ok(())
    }

    fn install_error_hook(&self) {
        self.error_hook_installed.store(true, Ordering::SeqCst);
    }

    fn uninstall_error_hook(&self) {
        self.error_hook_installed.store(false, Ordering::SeqCst);
    }
}

/// Recording per-service mock driver.
pub struct MockDriver {
    pub name: String,
    pub kind: ServiceKind,
    fps: AtomicU32,
    codec: Mutex<CodecStrategy>,
    started: AtomicBool,
    destroyed: AtomicBool,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
    steps: AtomicUsize,
    step_behavior: Mutex<Option<BehaviorFn>>,
    next_session_id: AtomicU32,
    removed_sessions: Mutex<Vec<SessionId>>,
    subscriptions: Mutex<HashMap<Opcode, Arc<WrappedHandler>>>,
    pre_subscriptions: Mutex<HashMap<Opcode, Arc<WrappedHandler>>>,
    unify_pre_handler: Mutex<Option<Arc<dyn PacketHandler>>>,
    decoders: Mutex<HashMap<Opcode, CoderSpec>>,
    facades: Mutex<Vec<Arc<dyn Facade>>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockDriver {
    fn new(name: &str, kind: ServiceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            fps: AtomicU32::new(constants::DEFAULT_SERVICE_FPS),
            codec: Mutex::new(CodecStrategy::Binary),
            started: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
            step_behavior: Mutex::new(None),
            next_session_id: AtomicU32::new(1),
            removed_sessions: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashMap::new()),
            pre_subscriptions: Mutex::new(HashMap::new()),
            unify_pre_handler: Mutex::new(None),
            decoders: Mutex::new(HashMap::new()),
            facades: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Install a hook run on every mainloop step, receiving the zero-based
    /// step index; an `Err` is surfaced as a frame failure.
    pub fn set_step_behavior(
        &self,
        behavior: impl FnMut(usize) -> anyhow::Result<()> + Send + 'static,
    ) {
        *self.step_behavior.lock() = Some(Box::new(behavior));
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    pub fn subscribed_opcodes(&self) -> Vec<Opcode> {
        let mut opcodes: Vec<Opcode> = self.subscriptions.lock().keys().copied().collect();
        opcodes.sort();
        opcodes
    }

    pub fn pre_subscribed_opcodes(&self) -> Vec<Opcode> {
        let mut opcodes: Vec<Opcode> = self.pre_subscriptions.lock().keys().copied().collect();
        opcodes.sort();
        opcodes
    }

    pub fn handler_for(&self, opcode: Opcode) -> Option<Arc<WrappedHandler>> {
        self.subscriptions.lock().get(&opcode).cloned()
    }

    pub fn pre_handler_for(&self, opcode: Opcode) -> Option<Arc<WrappedHandler>> {
        self.pre_subscriptions.lock().get(&opcode).cloned()
    }

    pub fn has_unify_pre_handler(&self) -> bool {
        self.unify_pre_handler.lock().is_some()
    }

    pub fn decoder_opcodes(&self) -> Vec<Opcode> {
        let mut opcodes: Vec<Opcode> = self.decoders.lock().keys().copied().collect();
        opcodes.sort();
        opcodes
    }

    pub fn facade_count(&self) -> usize {
        self.facades.lock().len()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn removed_sessions(&self) -> Vec<SessionId> {
        self.removed_sessions.lock().clone()
    }
}

#[async_trait]
impl ServiceDriver for MockDriver {
    fn start(&self, _poller_count: usize) -> anyhow::Result<()> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    async fn mainloop_step(&self) -> anyhow::Result<()> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst);
        if let Some(behavior) = self.step_behavior.lock().as_mut() {
            behavior(step)?;
        }
        Ok(())
    }

    fn listen(&self, _addr: SocketAddr) -> anyhow::Result<SessionId> {
        Ok(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    fn connect(&self, _addr: SocketAddr) -> anyhow::Result<SessionId> {
        Ok(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    fn async_connect(&self, _addr: SocketAddr) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove_session(&self, session_id: SessionId) -> anyhow::Result<()> {
        self.removed_sessions.lock().push(session_id);
        Ok(())
    }

    fn send(
        &self,
        session_id: SessionId,
        opcode: Opcode,
        payload: Bytes,
        status: i32,
        parts: &[PacketPart],
    ) -> anyhow::Result<()> {
        self.sent.lock().push(SentMessage {
            kind: SendKind::Unicast(session_id),
            opcode,
            payload,
            status,
            parts: parts.to_vec(),
        });
        Ok(())
    }

    fn multicast(
        &self,
        session_ids: &[SessionId],
        opcode: Opcode,
        payload: Bytes,
        status: i32,
        parts: &[PacketPart],
    ) -> anyhow::Result<()> {
        self.sent.lock().push(SentMessage {
            kind: SendKind::Multicast(session_ids.to_vec()),
            opcode,
            payload,
            status,
            parts: parts.to_vec(),
        });
        Ok(())
    }

    fn broadcast(
        &self,
        opcode: Opcode,
        payload: Bytes,
        status: i32,
        parts: &[PacketPart],
    ) -> anyhow::Result<()> {
        self.sent.lock().push(SentMessage {
            kind: SendKind::Broadcast,
            opcode,
            payload,
            status,
            parts: parts.to_vec(),
        });
        Ok(())
    }

    fn subscribe(&self, opcode: Opcode, handler: Arc<WrappedHandler>) -> anyhow::Result<()> {
        self.subscriptions.lock().insert(opcode, handler);
        Ok(())
    }

    fn pre_subscribe(&self, opcode: Opcode, handler: Arc<WrappedHandler>) -> anyhow::Result<()> {
        self.pre_subscriptions.lock().insert(opcode, handler);
        Ok(())
    }

    fn unify_pre_subscribe(&self, handler: Arc<dyn PacketHandler>) -> anyhow::Result<()> {
        *self.unify_pre_handler.lock() = Some(handler);
        Ok(())
    }

    fn register_decoder(&self, opcode: Opcode, coder: CoderSpec) -> anyhow::Result<()> {
        self.decoders.lock().insert(opcode, coder);
        Ok(())
    }

    fn register_facade(&self, facade: Arc<dyn Facade>) -> anyhow::Result<()> {
        self.facades.lock().push(facade);
        Ok(())
    }

    fn fps(&self) -> u32 {
        self.fps.load(Ordering::SeqCst)
    }

    fn set_fps(&self, fps: u32) -> anyhow::Result<()> {
        self.fps.store(fps, Ordering::SeqCst);
        Ok(())
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps().max(1)))
    }

    fn codec(&self) -> CodecStrategy {
        *self.codec.lock()
    }

    fn set_codec(&self, codec: CodecStrategy) -> anyhow::Result<()> {
        *self.codec.lock() = codec;
        Ok(())
    }
}
