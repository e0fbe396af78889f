//! # Handler Traits
//!
//! Callback contracts for packet handling and failure routing. Packet
//! handlers return `anyhow::Result` so arbitrary application failures can
//! travel through the exception-handler fallback chain; plain closures with
//! the right shape implement the traits directly.

use crate::opcode::Opcode;
use crate::packet::Packet;
use crate::service::core::Service;
use std::fmt;
use std::sync::Arc;

/// Handles one inbound packet.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, packet: &Packet) -> anyhow::Result<()>;
}

impl<F> PacketHandler for F
where
    F: Fn(&Packet) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, packet: &Packet) -> anyhow::Result<()> {
        self(packet)
    }
}

/// Which handler table a registration or wrapper belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerRole {
    Subscribe,
    PreSubscribe,
}

impl fmt::Display for HandlerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRole::Subscribe => write!(f, "subscribe"),
            HandlerRole::PreSubscribe => write!(f, "pre-subscribe"),
        }
    }
}

/// Where a failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// Inside a subscribed or pre-subscribed packet handler.
    Handler,
    /// Inside a service's mainloop step or the scheduler's per-tick logic.
    Frame,
    /// Inside timer advancement.
    Timer,
}

/// Context handed to exception handlers alongside the original error.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub phase: FailurePhase,
    pub service: Option<String>,
    pub role: Option<HandlerRole>,
    pub opcode: Option<Opcode>,
}

impl FailureContext {
    pub(crate) fn handler(service: impl Into<String>, role: HandlerRole, opcode: Opcode) -> Self {
        Self {
            phase: FailurePhase::Handler,
            service: Some(service.into()),
            role: Some(role),
            opcode: Some(opcode),
        }
    }

    pub(crate) fn frame(service: Option<String>) -> Self {
        Self {
            phase: FailurePhase::Frame,
            service,
            role: None,
            opcode: None,
        }
    }

    pub(crate) fn timer() -> Self {
        Self {
            phase: FailurePhase::Timer,
            service: None,
            role: None,
            opcode: None,
        }
    }
}

/// Handles a failure raised by a packet handler.
pub trait ExceptionHandler: Send + Sync {
    fn handle_error(&self, packet: &Packet, ctx: &FailureContext, error: &anyhow::Error);
}

impl<F> ExceptionHandler for F
where
    F: Fn(&Packet, &FailureContext, &anyhow::Error) + Send + Sync,
{
    fn handle_error(&self, packet: &Packet, ctx: &FailureContext, error: &anyhow::Error) {
        self(packet, ctx, error)
    }
}

/// Handles a failure raised by a service's mainloop step, the scheduler's
/// per-tick logic, or timer advancement. `service` is absent for failures
/// not attributable to a single service.
pub trait FrameExceptionHandler: Send + Sync {
    fn handle_frame_error(
        &self,
        service: Option<&Arc<Service>>,
        ctx: &FailureContext,
        error: &anyhow::Error,
    );
}

impl<F> FrameExceptionHandler for F
where
    F: Fn(Option<&Arc<Service>>, &FailureContext, &anyhow::Error) + Send + Sync,
{
    fn handle_frame_error(
        &self,
        service: Option<&Arc<Service>>,
        ctx: &FailureContext,
        error: &anyhow::Error,
    ) {
        self(service, ctx, error)
    }
}
