//! # Network Engine Boundary
//!
//! The runtime core never touches sockets, timers, or wire formats itself;
//! everything transport-shaped goes through these two traits. A
//! [`NetworkEngine`] covers the process-wide surface (driver creation, timer
//! advancement, the global error hook); a [`ServiceDriver`] is the
//! per-service handle the engine returns, owned exclusively by one
//! [`Service`](crate::service::Service) for its whole lifetime.
//!
//! All calls are opaque side effects to the core. The only asynchronous
//! point is `mainloop_step`, where the engine is free to wait on I/O; the
//! scheduler awaits it one service at a time.

pub mod mock;

use crate::codec::{CodecStrategy, CoderSpec};
use crate::opcode::Opcode;
use crate::packet::{PacketPart, SessionId};
use crate::service::core::ServiceKind;
use crate::service::facade::Facade;
use crate::service::handler::PacketHandler;
use crate::service::wrapped::WrappedHandler;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide engine surface.
pub trait NetworkEngine: Send + Sync {
    /// Create the engine-side handle for a new service.
    fn create_driver(&self, name: &str, kind: ServiceKind) -> anyhow::Result<Arc<dyn ServiceDriver>>;

    /// Advance all registered timers once.
    fn advance_timers(&self) -> anyhow::Result<()>;

    /// Install the global error hook for the duration of a scheduling run.
    fn install_error_hook(&self);

    /// Uninstall the global error hook.
    fn uninstall_error_hook(&self);
}

/// Per-service engine handle.
#[async_trait]
pub trait ServiceDriver: Send + Sync {
    fn start(&self, poller_count: usize) -> anyhow::Result<()>;
    fn stop(&self) -> anyhow::Result<()>;

    /// Release engine-side resources. Called exactly once, when the owning
    /// service is dropped.
    fn destroy(&self);

    /// Run one mainloop step for this service.
    async fn mainloop_step(&self) -> anyhow::Result<()>;

    fn listen(&self, addr: SocketAddr) -> anyhow::Result<SessionId>;
    fn connect(&self, addr: SocketAddr) -> anyhow::Result<SessionId>;
    fn async_connect(&self, addr: SocketAddr) -> anyhow::Result<()>;
    fn remove_session(&self, session_id: SessionId) -> anyhow::Result<()>;

    fn send(
        &self,
        session_id: SessionId,
        opcode: Opcode,
        payload: Bytes,
        status: i32,
        parts: &[PacketPart],
    ) -> anyhow::Result<()>;

    fn multicast(
        &self,
        session_ids: &[SessionId],
        opcode: Opcode,
        payload: Bytes,
        status: i32,
        parts: &[PacketPart],
    ) -> anyhow::Result<()>;

    fn broadcast(
        &self,
        opcode: Opcode,
        payload: Bytes,
        status: i32,
        parts: &[PacketPart],
    ) -> anyhow::Result<()>;

    fn subscribe(&self, opcode: Opcode, handler: Arc<WrappedHandler>) -> anyhow::Result<()>;
    fn pre_subscribe(&self, opcode: Opcode, handler: Arc<WrappedHandler>) -> anyhow::Result<()>;
    fn unify_pre_subscribe(&self, handler: Arc<dyn PacketHandler>) -> anyhow::Result<()>;

    fn register_decoder(&self, opcode: Opcode, coder: CoderSpec) -> anyhow::Result<()>;
    fn register_facade(&self, facade: Arc<dyn Facade>) -> anyhow::Result<()>;

    fn fps(&self) -> u32;
    fn set_fps(&self, fps: u32) -> anyhow::Result<()>;

    /// Frame interval derived from the current FPS.
    fn frame_interval(&self) -> Duration;

    fn codec(&self) -> CodecStrategy;
    fn set_codec(&self, codec: CodecStrategy) -> anyhow::Result<()>;
}
