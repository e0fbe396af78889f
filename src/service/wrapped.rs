//! # Exception-Wrapped Handlers
//!
//! Every handler subscribed on a service is installed at the engine boundary
//! wrapped in a [`WrappedHandler`], which routes invocation failures through
//! the owning service's exception-handler tables: the opcode-specific
//! handler first, the role default next, and only when neither is configured
//! does the original error propagate to the caller (the scheduler's frame
//! isolation is the last line of defense).
//!
//! The wrapper must not keep its service alive, so it holds a name keyed
//! into the directory rather than a reference to the service itself.

use crate::packet::Packet;
use crate::service::core::Service;
use crate::service::handler::{FailureContext, HandlerRole, PacketHandler};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::directory::ServiceDirectory;

/// Non-owning reference to a service, resolved by name through the
/// directory at invocation time.
#[derive(Clone)]
pub struct ServiceRef {
    directory: Weak<ServiceDirectory>,
    name: String,
}

impl ServiceRef {
    pub(crate) fn new(directory: Weak<ServiceDirectory>, name: String) -> Self {
        Self { directory, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service this reference points at, if it is still registered.
    pub fn resolve(&self) -> Option<Arc<Service>> {
        self.directory.upgrade()?.get(&self.name)
    }
}

/// A raw handler wrapped with failure routing for one handler role.
pub struct WrappedHandler {
    role: HandlerRole,
    service: ServiceRef,
    handler: Arc<dyn PacketHandler>,
}

impl WrappedHandler {
    pub(crate) fn new(role: HandlerRole, service: ServiceRef, handler: Arc<dyn PacketHandler>) -> Self {
        Self {
            role,
            service,
            handler,
        }
    }

    pub fn role(&self) -> HandlerRole {
        self.role
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Invoke the wrapped handler with a packet.
    ///
    /// On failure, resolves the owning service's exception handler for this
    /// wrapper's role: opcode-specific first, role default second. If
    /// neither is configured (or the service is gone) the original error is
    /// returned to the caller.
    pub fn invoke(&self, packet: &Packet) -> anyhow::Result<()> {
        match self.handler.handle(packet) {
            Ok(()) => Ok(()),
            Err(error) => {
                let opcode = packet.opcode;
                let resolved = self
                    .service
                    .resolve()
                    .and_then(|svc| svc.exception_handler_for(self.role, opcode));

                match resolved {
                    Some(exc_handler) => {
                        debug!(
                            service = self.service.name(),
                            role = %self.role,
                            opcode = %opcode,
                            error = %error,
                            "Routing handler failure to exception handler"
                        );
                        let ctx = FailureContext::handler(self.service.name(), self.role, opcode);
                        exc_handler.handle_error(packet, &ctx, &error);
                        Ok(())
                    }
                    None => Err(error),
                }
            }
        }
    }
}

impl std::fmt::Debug for WrappedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedHandler")
            .field("role", &self.role)
            .field("service", &self.service.name)
            .finish()
    }
}
