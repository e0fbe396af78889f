#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Netmux Core
//!
//! Runtime core for multi-service network applications: declarative
//! registration of message-opcode handlers, coders, and lifecycle facades,
//! plus a cooperative scheduler that drives many services forward at
//! independent frame rates while isolating failures per service and per
//! packet.
//!
//! ## Architecture
//!
//! Registration is two-phase. Declarations made through the
//! [`RegistrationBuilder`] accumulate in the process-wide
//! [`RegistrationRegistry`] at definition time; when a [`Service`] starts,
//! every applicable record is resolved against it and bound into its live
//! tables. The [`ServiceDirectory`] owns the live service list and runs the
//! scheduling loop: one tick walks every started service in insertion
//! order, steps those whose frame interval elapsed, advances the engine
//! timers, applies deferred removals, and paces itself against the global
//! maximum rate.
//!
//! Handler failures route through a two-tier exception fallback
//! (opcode-specific, then role default) before they are allowed to escape;
//! frame-level failures go to the single frame exception handler, and only
//! with none installed do they abort scheduling.
//!
//! Actual socket I/O, wire formats, and timers live behind the
//! [`NetworkEngine`] / [`ServiceDriver`] traits; the crate ships a
//! recording mock pair for tests and embedding experiments.
//!
//! ## Module Organization
//!
//! - [`registry`] - declarative registration records, builder, and registry
//! - [`service`] - the service entity, handler traits, facades, wrappers
//! - [`directory`] - service directory and cooperative scheduler
//! - [`driver`] - the engine boundary traits and the mock engine
//! - [`codec`] - payload encode/decode capabilities and coder specs
//! - [`config`] - runtime configuration loading and validation
//! - [`error`] - structured error handling
//! - [`logging`] - environment-aware tracing setup
//!
//! ## Quick Start
//!
//! ```rust
//! use netmux_core::driver::mock::MockEngine;
//! use netmux_core::{ServiceDirectory, ServiceKind};
//!
//! # fn main() -> netmux_core::Result<()> {
//! let engine = MockEngine::new();
//! let directory = ServiceDirectory::new(engine);
//!
//! let gateway = directory.create_service("gateway", ServiceKind::Normal)?;
//! gateway.set_fps(30)?;
//! gateway.start()?;
//!
//! // directory.schedule().await drives every started service until
//! // directory.deschedule() is called.
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod directory;
pub mod driver;
pub mod error;
pub mod logging;
pub mod opcode;
pub mod packet;
pub mod registry;
pub mod service;

pub use codec::{CodecError, CodecStrategy, CoderSpec, Decodable, Encodable};
pub use crate::config::RuntimeConfig;
pub use directory::ServiceDirectory;
pub use driver::{NetworkEngine, ServiceDriver};
pub use error::{NetmuxError, Result};
pub use logging::init_structured_logging;
pub use opcode::{Opcode, OpcodeSource};
pub use packet::{Packet, PacketPart, SessionId};
pub use registry::{
    Registrant, RegistrationBuilder, RegistrationRecord, RegistrationRegistry, RegistrationRole,
    RegistrationStats, SubjectId,
};
pub use service::{
    ExceptionHandler, Facade, FacadeInstance, FailureContext, FailurePhase, FrameExceptionHandler,
    HandlerRole, LifecycleState, PacketHandler, SendOptions, Service, ServiceKind, WrappedHandler,
};
