//! # Facades
//!
//! A facade is an auto-instantiated lifecycle-hook object attached to a
//! service. The engine drives the callbacks; every hook has a default no-op
//! body so implementations only override what they observe. Registration
//! stores one instance per concrete facade type per service, retrievable by
//! type through [`Service::facade`](crate::service::Service::facade).

use crate::opcode::Opcode;
use crate::packet::SessionId;
use std::any::{Any, TypeId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Event payload for service-scoped hooks (initialize/destroy/update).
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub service: String,
}

/// Event payload for the per-frame idle hook.
#[derive(Debug, Clone)]
pub struct IdleEvent {
    pub service: String,
    pub idle_time: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionCreateEvent {
    pub service: String,
    pub session_id: SessionId,
    pub is_listen: bool,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct SessionDestroyEvent {
    pub service: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone)]
pub struct AsyncConnResultEvent {
    pub service: String,
    pub peer_addr: SocketAddr,
    pub connected: bool,
    pub reason: String,
}

/// Severity of a protocol-layer report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProtoReportEvent {
    pub service: String,
    pub layer: i32,
    pub level: ReportLevel,
    pub message: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone)]
pub struct UnhandledPacketEvent {
    pub service: String,
    pub opcode: Opcode,
}

/// Lifecycle hooks attached to a service.
pub trait Facade: Send + Sync {
    fn on_initialize(&self, _ev: &ServiceEvent) {}
    fn on_destroy(&self, _ev: &ServiceEvent) {}
    fn on_update(&self, _ev: &ServiceEvent) {}
    fn on_idle(&self, _ev: &IdleEvent) {}
    fn on_session_create(&self, _ev: &SessionCreateEvent) {}
    fn on_session_destroy(&self, _ev: &SessionDestroyEvent) {}
    fn on_async_conn_result(&self, _ev: &AsyncConnResultEvent) {}
    fn on_proto_report(&self, _ev: &ProtoReportEvent) {}
    fn on_unhandled_packet(&self, _ev: &UnhandledPacketEvent) {}
}

/// A facade instance paired with the type identity the facade table is
/// keyed by. Built at the concrete type so no downcasting machinery leaks
/// into the [`Facade`] trait itself.
#[derive(Clone)]
pub struct FacadeInstance {
    type_id: TypeId,
    type_name: &'static str,
    facade: Arc<dyn Facade>,
    any: Arc<dyn Any + Send + Sync>,
}

impl FacadeInstance {
    pub fn new<F: Facade + 'static>(facade: F) -> Self {
        let facade = Arc::new(facade);
        Self {
            type_id: TypeId::of::<F>(),
            type_name: std::any::type_name::<F>(),
            facade: facade.clone(),
            any: facade,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn facade(&self) -> Arc<dyn Facade> {
        self.facade.clone()
    }

    pub(crate) fn downcast<F: Facade + 'static>(&self) -> Option<Arc<F>> {
        self.any.clone().downcast::<F>().ok()
    }
}

impl std::fmt::Debug for FacadeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacadeInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}
