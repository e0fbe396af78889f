//! # Registration Records
//!
//! One record per registration subject. A record accumulates the subject's
//! role, opcode sets, target services, and facade flag as declarations are
//! made, then replays itself onto services at start time (`apply_to`) and
//! onto the directory's class-level slots (`apply_class_level`).
//!
//! Records hold their subject weakly: a subject dropped before resolution
//! contributes nothing and never raises.

use crate::error::{NetmuxError, Result};
use crate::opcode::Opcode;
use crate::registry::registrant::Registrant;
use crate::service::core::{Service, ServiceKind};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::directory::ServiceDirectory;

/// Role a registration subject plays once bound to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationRole {
    Coder,
    Handler,
    PreHandler,
    UnifyPreHandler,
    ExcHandler,
    ExcPreHandler,
    DefaultExcHandler,
    DefaultExcPreHandler,
    FrameExcHandler,
    Unspecified,
}

impl fmt::Display for RegistrationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationRole::Coder => "coder",
            RegistrationRole::Handler => "handler",
            RegistrationRole::PreHandler => "pre-handler",
            RegistrationRole::UnifyPreHandler => "unify-pre-handler",
            RegistrationRole::ExcHandler => "exception-handler",
            RegistrationRole::ExcPreHandler => "exception-pre-handler",
            RegistrationRole::DefaultExcHandler => "default-exception-handler",
            RegistrationRole::DefaultExcPreHandler => "default-exception-pre-handler",
            RegistrationRole::FrameExcHandler => "frame-exception-handler",
            RegistrationRole::Unspecified => "unspecified",
        };
        write!(f, "{name}")
    }
}

/// Opaque identity of a registration subject, derived from its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId(usize);

impl SubjectId {
    pub(crate) fn of(subject: &Arc<dyn Registrant>) -> Self {
        Self(Arc::as_ptr(subject) as *const () as usize)
    }
}

/// Accumulated registration state for one subject.
pub struct RegistrationRecord {
    subject: Weak<dyn Registrant>,
    subject_id: SubjectId,
    subject_name: String,
    role: RegistrationRole,
    encode_opcode: Option<Opcode>,
    decode_opcodes: BTreeSet<Opcode>,
    handler_opcodes: BTreeSet<Opcode>,
    pre_handler_opcodes: BTreeSet<Opcode>,
    exc_handler_opcodes: BTreeSet<Opcode>,
    exc_pre_handler_opcodes: BTreeSet<Opcode>,
    target_services: BTreeSet<String>,
    is_facade: bool,
}

impl RegistrationRecord {
    pub(crate) fn new(subject: Weak<dyn Registrant>, subject_id: SubjectId, subject_name: String) -> Self {
        Self {
            subject,
            subject_id,
            subject_name,
            role: RegistrationRole::Unspecified,
            encode_opcode: None,
            decode_opcodes: BTreeSet::new(),
            handler_opcodes: BTreeSet::new(),
            pre_handler_opcodes: BTreeSet::new(),
            exc_handler_opcodes: BTreeSet::new(),
            exc_pre_handler_opcodes: BTreeSet::new(),
            target_services: BTreeSet::new(),
            is_facade: false,
        }
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn role(&self) -> RegistrationRole {
        self.role
    }

    pub fn target_services(&self) -> &BTreeSet<String> {
        &self.target_services
    }

    pub fn is_facade(&self) -> bool {
        self.is_facade
    }

    pub fn encode_opcode(&self) -> Option<Opcode> {
        self.encode_opcode
    }

    pub fn handler_opcodes(&self) -> &BTreeSet<Opcode> {
        &self.handler_opcodes
    }

    pub fn decode_opcodes(&self) -> &BTreeSet<Opcode> {
        &self.decode_opcodes
    }

    /// Adopt a role for this record.
    ///
    /// An Unspecified record adopts any requested role; an Unspecified
    /// request leaves the existing role untouched; re-asserting the current
    /// role is a no-op. Any other combination is a configuration error,
    /// surfaced at declaration time.
    pub(crate) fn assume_role(&mut self, requested: RegistrationRole) -> Result<()> {
        if requested == RegistrationRole::Unspecified || requested == self.role {
            return Ok(());
        }
        if self.role == RegistrationRole::Unspecified {
            self.role = requested;
            return Ok(());
        }
        Err(NetmuxError::RoleConflict {
            subject: self.subject_name.clone(),
            existing: self.role,
            requested,
        })
    }

    pub(crate) fn set_encode_opcode(&mut self, opcode: Opcode) {
        self.encode_opcode = Some(opcode);
    }

    pub(crate) fn add_decode_opcodes(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.decode_opcodes.extend(opcodes);
    }

    pub(crate) fn add_handler_opcodes(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.handler_opcodes.extend(opcodes);
    }

    pub(crate) fn add_pre_handler_opcodes(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.pre_handler_opcodes.extend(opcodes);
    }

    pub(crate) fn add_exc_handler_opcodes(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.exc_handler_opcodes.extend(opcodes);
    }

    pub(crate) fn add_exc_pre_handler_opcodes(&mut self, opcodes: impl IntoIterator<Item = Opcode>) {
        self.exc_pre_handler_opcodes.extend(opcodes);
    }

    pub(crate) fn add_target_services(&mut self, services: impl IntoIterator<Item = String>) {
        self.target_services.extend(services);
    }

    pub(crate) fn mark_facade(&mut self) {
        self.is_facade = true;
    }

    fn missing_capability(&self, capability: &'static str) -> NetmuxError {
        NetmuxError::MissingCapability {
            subject: self.subject_name.clone(),
            capability,
        }
    }

    /// Replay this record onto a starting service.
    ///
    /// Expired subjects and records targeted at other services are silent
    /// no-ops. Frame-exception records only participate in the class-level
    /// pass.
    pub(crate) fn apply_to(&self, service: &Service) -> Result<()> {
        let Some(subject) = self.subject.upgrade() else {
            trace!(subject = %self.subject_name, "Skipping expired registration subject");
            return Ok(());
        };
        if !self.target_services.is_empty() && !self.target_services.contains(service.name()) {
            return Ok(());
        }

        match self.role {
            RegistrationRole::Coder => {
                if service.kind() != ServiceKind::Raw {
                    let spec = subject
                        .coder_spec()
                        .ok_or_else(|| self.missing_capability("coder"))?;
                    if let Some(opcode) = self.encode_opcode {
                        service.register_encoder_spec(opcode, &spec)?;
                    }
                    for opcode in &self.decode_opcodes {
                        service.register_decoder(*opcode, spec.clone())?;
                    }
                }
            }
            RegistrationRole::Handler => {
                for opcode in &self.handler_opcodes {
                    let handler = subject
                        .create_packet_handler()
                        .ok_or_else(|| self.missing_capability("packet handler"))?;
                    service.subscribe(*opcode, handler)?;
                }
            }
            RegistrationRole::PreHandler => {
                for opcode in &self.pre_handler_opcodes {
                    let handler = subject
                        .create_packet_handler()
                        .ok_or_else(|| self.missing_capability("packet handler"))?;
                    service.pre_subscribe(*opcode, handler)?;
                }
            }
            RegistrationRole::UnifyPreHandler => {
                let handler = subject
                    .create_packet_handler()
                    .ok_or_else(|| self.missing_capability("packet handler"))?;
                service.unify_pre_subscribe(handler)?;
            }
            RegistrationRole::ExcHandler => {
                for opcode in &self.exc_handler_opcodes {
                    let handler = subject
                        .create_exception_handler()
                        .ok_or_else(|| self.missing_capability("exception handler"))?;
                    service.set_subscribe_exc_handler(*opcode, Some(handler));
                }
            }
            RegistrationRole::ExcPreHandler => {
                for opcode in &self.exc_pre_handler_opcodes {
                    let handler = subject
                        .create_exception_handler()
                        .ok_or_else(|| self.missing_capability("exception handler"))?;
                    service.set_pre_subscribe_exc_handler(*opcode, Some(handler));
                }
            }
            RegistrationRole::DefaultExcHandler => {
                let handler = subject
                    .create_exception_handler()
                    .ok_or_else(|| self.missing_capability("exception handler"))?;
                service.set_default_subscribe_exc_handler(Some(handler));
            }
            RegistrationRole::DefaultExcPreHandler => {
                let handler = subject
                    .create_exception_handler()
                    .ok_or_else(|| self.missing_capability("exception handler"))?;
                service.set_default_pre_subscribe_exc_handler(Some(handler));
            }
            RegistrationRole::FrameExcHandler | RegistrationRole::Unspecified => {}
        }

        if self.is_facade {
            let facade = subject
                .create_facade()
                .ok_or_else(|| self.missing_capability("facade"))?;
            service.install_facade(facade)?;
        }
        Ok(())
    }

    /// Replay this record onto the directory's class-level slots.
    pub(crate) fn apply_class_level(&self, directory: &ServiceDirectory) -> Result<()> {
        let Some(subject) = self.subject.upgrade() else {
            return Ok(());
        };
        if self.role == RegistrationRole::FrameExcHandler {
            let handler = subject
                .create_frame_exception_handler()
                .ok_or_else(|| self.missing_capability("frame exception handler"))?;
            directory.set_frame_exception_handler(Some(handler));
        }
        Ok(())
    }
}

impl fmt::Debug for RegistrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRecord")
            .field("subject", &self.subject_name)
            .field("role", &self.role)
            .field("encode_opcode", &self.encode_opcode)
            .field("decode_opcodes", &self.decode_opcodes)
            .field("handler_opcodes", &self.handler_opcodes)
            .field("target_services", &self.target_services)
            .field("is_facade", &self.is_facade)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct NullSubject;
    impl Registrant for NullSubject {}

    fn record() -> RegistrationRecord {
        let subject: Arc<dyn Registrant> = Arc::new(NullSubject);
        let id = SubjectId::of(&subject);
        RegistrationRecord::new(Arc::downgrade(&subject), id, "NullSubject".to_string())
    }

    #[test]
    fn role_adoption_and_conflicts() {
        let mut rec = record();
        assert_eq!(rec.role(), RegistrationRole::Unspecified);

        // Unspecified request leaves the role untouched.
        rec.assume_role(RegistrationRole::Unspecified).unwrap();
        assert_eq!(rec.role(), RegistrationRole::Unspecified);

        rec.assume_role(RegistrationRole::Handler).unwrap();
        assert_eq!(rec.role(), RegistrationRole::Handler);

        // Re-asserting the same role is a no-op.
        rec.assume_role(RegistrationRole::Handler).unwrap();
        rec.assume_role(RegistrationRole::Unspecified).unwrap();
        assert_eq!(rec.role(), RegistrationRole::Handler);

        let err = rec.assume_role(RegistrationRole::Coder).unwrap_err();
        assert!(matches!(err, NetmuxError::RoleConflict { .. }));
        assert_eq!(rec.role(), RegistrationRole::Handler);
    }

    #[test]
    fn duplicate_opcodes_collapse() {
        let mut rec = record();
        rec.add_handler_opcodes([Opcode(5), Opcode(5), Opcode(7)]);
        rec.add_handler_opcodes([Opcode(7)]);
        assert_eq!(rec.handler_opcodes().len(), 2);
    }

    proptest! {
        #[test]
        fn opcode_registration_is_idempotent(ops in prop::collection::vec(0u16..512, 0..32)) {
            let mut rec = record();
            let opcodes: Vec<Opcode> = ops.iter().copied().map(Opcode).collect();
            rec.add_handler_opcodes(opcodes.clone());
            let first_pass = rec.handler_opcodes().clone();
            rec.add_handler_opcodes(opcodes);
            prop_assert_eq!(rec.handler_opcodes(), &first_pass);

            let mut unique: Vec<u16> = ops.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(rec.handler_opcodes().len(), unique.len());
        }
    }
}
