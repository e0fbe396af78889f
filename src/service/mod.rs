//! # Services
//!
//! The service entity and its callback surfaces.
//!
//! ```text
//! Service
//! ├── core            (Service entity, lifecycle, tables, messaging)
//! ├── handler         (PacketHandler / ExceptionHandler / FrameExceptionHandler)
//! ├── wrapped         (exception-wrapped handlers at the engine boundary)
//! └── facade          (lifecycle-hook facades and their events)
//! ```

pub mod core;
pub mod facade;
pub mod handler;
pub mod wrapped;

pub use self::core::{LifecycleState, SendOptions, Service, ServiceKind};
pub use facade::{
    AsyncConnResultEvent, Facade, FacadeInstance, IdleEvent, ProtoReportEvent, ReportLevel,
    ServiceEvent, SessionCreateEvent, SessionDestroyEvent, UnhandledPacketEvent,
};
pub use handler::{
    ExceptionHandler, FailureContext, FailurePhase, FrameExceptionHandler, HandlerRole,
    PacketHandler,
};
pub use wrapped::{ServiceRef, WrappedHandler};
