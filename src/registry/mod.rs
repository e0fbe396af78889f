//! # Declarative Registration
//!
//! Two-phase registration: declarations made through a
//! [`RegistrationBuilder`] accumulate [`RegistrationRecord`]s in the
//! process-wide [`RegistrationRegistry`] at definition time; when a service
//! starts, the registry resolves every applicable record against it and
//! binds handlers, coders, and facades into the service's live tables.
//!
//! ```text
//! Registration
//! ├── Registrant              (subject capabilities, held weakly)
//! ├── RegistrationBuilder     (fluent declaration API)
//! ├── RegistrationRecord      (role + opcode sets + targets per subject)
//! └── RegistrationRegistry    (bound/unbound partitions, start-time binding)
//! ```

pub mod builder;
pub mod record;
pub mod registrant;
pub mod registration_registry;

pub use builder::RegistrationBuilder;
pub use record::{RegistrationRecord, RegistrationRole, SubjectId};
pub use registrant::Registrant;
pub use registration_registry::{RegistrationRegistry, RegistrationStats};
