//! # Registration Subjects
//!
//! A [`Registrant`] is the subject of a registration: a factory the registry
//! remembers weakly and invokes at service-start time to produce fresh
//! handler, exception-handler, or facade instances per service (or a coder
//! spec for codec binding). Every accessor defaults to `None`; subjects only
//! implement the capabilities their declared roles need, and declarations
//! verify the capability up front.

use crate::codec::CoderSpec;
use crate::service::facade::FacadeInstance;
use crate::service::handler::{ExceptionHandler, FrameExceptionHandler, PacketHandler};
use std::sync::Arc;

/// Subject of a registration, held weakly by its record.
pub trait Registrant: Send + Sync + 'static {
    /// Fresh packet handler instance (Handler / PreHandler / UnifyPreHandler
    /// roles).
    fn create_packet_handler(&self) -> Option<Arc<dyn PacketHandler>> {
        None
    }

    /// Fresh exception handler instance (ExcHandler / ExcPreHandler /
    /// default-exception roles).
    fn create_exception_handler(&self) -> Option<Arc<dyn ExceptionHandler>> {
        None
    }

    /// Fresh frame exception handler instance (FrameExcHandler role).
    fn create_frame_exception_handler(&self) -> Option<Arc<dyn FrameExceptionHandler>> {
        None
    }

    /// Fresh facade instance, one per matching service (`as_facade`
    /// declarations).
    fn create_facade(&self) -> Option<FacadeInstance> {
        None
    }

    /// Coder description for codec binding (Coder role).
    fn coder_spec(&self) -> Option<CoderSpec> {
        None
    }
}
