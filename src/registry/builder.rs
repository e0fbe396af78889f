//! # Registration Builder
//!
//! Fluent declaration API over the registry. Each call mirrors one
//! declaration the runtime understands (coder directions, handler and
//! pre-handler opcodes, exception-handler slots, frame-exception handlers,
//! service binding, facade marking) and immediately records and re-indexes
//! the subject's record, so mistakes such as role conflicts and missing
//! capabilities surface at the declaration site rather than at service
//! start.
//!
//! ```no_run
//! use netmux_core::{Opcode, RegistrationRegistry, Registrant};
//! use netmux_core::{PacketHandler, Packet};
//! use std::sync::Arc;
//!
//! struct EchoHandler;
//! impl PacketHandler for EchoHandler {
//!     fn handle(&self, _packet: &Packet) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! struct Echo;
//! impl Registrant for Echo {
//!     fn create_packet_handler(&self) -> Option<Arc<dyn PacketHandler>> {
//!         Some(Arc::new(EchoHandler))
//!     }
//! }
//!
//! # fn main() -> netmux_core::Result<()> {
//! let registry = RegistrationRegistry::global();
//! let echo = Arc::new(Echo);
//! registry
//!     .describe(&echo)
//!     .handles([Opcode(10), Opcode(11)])?
//!     .bind_to(["gateway"])?;
//! # Ok(())
//! # }
//! ```

use crate::error::{NetmuxError, Result};
use crate::opcode::{Opcode, OpcodeSource};
use crate::registry::record::{RegistrationRecord, RegistrationRole, SubjectId};
use crate::registry::registrant::Registrant;
use crate::registry::registration_registry::RegistrationRegistry;
use std::sync::Arc;

/// Declares registrations for one subject.
pub struct RegistrationBuilder<'r> {
    registry: &'r RegistrationRegistry,
    subject: Arc<dyn Registrant>,
    subject_name: String,
}

impl<'r> std::fmt::Debug for RegistrationBuilder<'r> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationBuilder")
            .field("subject_name", &self.subject_name)
            .finish()
    }
}

impl<'r> RegistrationBuilder<'r> {
    pub(crate) fn new(
        registry: &'r RegistrationRegistry,
        subject: Arc<dyn Registrant>,
        subject_name: String,
    ) -> Self {
        Self {
            registry,
            subject,
            subject_name,
        }
    }

    /// Identity of the subject being described.
    pub fn subject_id(&self) -> SubjectId {
        SubjectId::of(&self.subject)
    }

    fn declare(
        self,
        role: RegistrationRole,
        mutate: impl FnOnce(&mut RegistrationRecord),
    ) -> Result<Self> {
        let record = self
            .registry
            .extract_or_create(&self.subject, &self.subject_name, role)?;
        let (id, targets) = {
            let mut guard = record.write();
            mutate(&mut guard);
            (guard.subject_id(), guard.target_services().clone())
        };
        self.registry.reindex(id, &targets);
        Ok(self)
    }

    fn require(&self, present: bool, capability: &'static str) -> Result<()> {
        if present {
            Ok(())
        } else {
            Err(NetmuxError::MissingCapability {
                subject: self.subject_name.clone(),
                capability,
            })
        }
    }

    fn collect<I, O>(opcodes: I) -> Vec<Opcode>
    where
        I: IntoIterator<Item = O>,
        O: OpcodeSource,
    {
        opcodes.into_iter().map(|op| op.opcode()).collect()
    }

    /// Declare the subject as the encoder for `opcode` (Coder role, send
    /// direction).
    pub fn encodes(self, opcode: impl OpcodeSource) -> Result<Self> {
        self.require(self.subject.coder_spec().is_some(), "coder")?;
        let opcode = opcode.opcode();
        self.declare(RegistrationRole::Coder, |record| {
            record.set_encode_opcode(opcode);
        })
    }

    /// Declare the subject as the decoder for each opcode (Coder role,
    /// receive direction).
    pub fn decodes<I, O>(self, opcodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = O>,
        O: OpcodeSource,
    {
        self.require(self.subject.coder_spec().is_some(), "coder")?;
        let opcodes = Self::collect(opcodes);
        self.declare(RegistrationRole::Coder, |record| {
            record.add_decode_opcodes(opcodes);
        })
    }

    /// Subscribe the subject's handler for each opcode.
    pub fn handles<I, O>(self, opcodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = O>,
        O: OpcodeSource,
    {
        self.require(self.subject.create_packet_handler().is_some(), "packet handler")?;
        let opcodes = Self::collect(opcodes);
        self.declare(RegistrationRole::Handler, |record| {
            record.add_handler_opcodes(opcodes);
        })
    }

    /// Pre-subscribe the subject's handler for each opcode.
    pub fn pre_handles<I, O>(self, opcodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = O>,
        O: OpcodeSource,
    {
        self.require(self.subject.create_packet_handler().is_some(), "packet handler")?;
        let opcodes = Self::collect(opcodes);
        self.declare(RegistrationRole::PreHandler, |record| {
            record.add_pre_handler_opcodes(opcodes);
        })
    }

    /// Install the subject's handler as the single unify-pre-handler.
    pub fn unify_pre_handles(self) -> Result<Self> {
        self.require(self.subject.create_packet_handler().is_some(), "packet handler")?;
        self.declare(RegistrationRole::UnifyPreHandler, |_| {})
    }

    /// Install the subject as the exception handler for each handler opcode.
    pub fn handles_exceptions<I, O>(self, opcodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = O>,
        O: OpcodeSource,
    {
        self.require(
            self.subject.create_exception_handler().is_some(),
            "exception handler",
        )?;
        let opcodes = Self::collect(opcodes);
        self.declare(RegistrationRole::ExcHandler, |record| {
            record.add_exc_handler_opcodes(opcodes);
        })
    }

    /// Install the subject as the exception handler for each pre-handler
    /// opcode.
    pub fn pre_handles_exceptions<I, O>(self, opcodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = O>,
        O: OpcodeSource,
    {
        self.require(
            self.subject.create_exception_handler().is_some(),
            "exception handler",
        )?;
        let opcodes = Self::collect(opcodes);
        self.declare(RegistrationRole::ExcPreHandler, |record| {
            record.add_exc_pre_handler_opcodes(opcodes);
        })
    }

    /// Install the subject as the default exception handler for subscribed
    /// handlers.
    pub fn handles_exceptions_by_default(self) -> Result<Self> {
        self.require(
            self.subject.create_exception_handler().is_some(),
            "exception handler",
        )?;
        self.declare(RegistrationRole::DefaultExcHandler, |_| {})
    }

    /// Install the subject as the default exception handler for
    /// pre-subscribed handlers.
    pub fn pre_handles_exceptions_by_default(self) -> Result<Self> {
        self.require(
            self.subject.create_exception_handler().is_some(),
            "exception handler",
        )?;
        self.declare(RegistrationRole::DefaultExcPreHandler, |_| {})
    }

    /// Install the subject as the process-wide frame exception handler.
    pub fn handles_frame_exceptions(self) -> Result<Self> {
        self.require(
            self.subject.create_frame_exception_handler().is_some(),
            "frame exception handler",
        )?;
        self.declare(RegistrationRole::FrameExcHandler, |_| {})
    }

    /// Restrict the subject's registrations to the named services. Without
    /// this declaration the subject applies to every service.
    pub fn bind_to<I, S>(self, services: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let services: Vec<String> = services.into_iter().map(Into::into).collect();
        self.declare(RegistrationRole::Unspecified, |record| {
            record.add_target_services(services);
        })
    }

    /// Additionally auto-instantiate the subject as a facade on matching
    /// services, independent of its role.
    pub fn as_facade(self) -> Result<Self> {
        self.require(self.subject.create_facade().is_some(), "facade")?;
        self.declare(RegistrationRole::Unspecified, |record| {
            record.mark_facade();
        })
    }
}
