use crate::codec::CodecError;
use crate::opcode::Opcode;
use crate::registry::record::RegistrationRole;
use crate::service::handler::HandlerRole;
use thiserror::Error;

/// Configuration and runtime errors surfaced by the service core.
///
/// Configuration errors fail synchronously at the offending call and are
/// never retried. Handler and frame execution failures travel as
/// `anyhow::Error` through the exception-handler fallback chain and only
/// surface here, as [`NetmuxError::UnhandledFrameError`], once every handler
/// tier has declined them.
#[derive(Error, Debug)]
pub enum NetmuxError {
    #[error("service name must be a non-empty string")]
    EmptyServiceName,

    #[error("service name already in use: {name}")]
    DuplicateServiceName { name: String },

    #[error("service count limit reached: {limit}")]
    ServiceCountLimit { limit: usize },

    #[error("service '{name}' already started")]
    ServiceAlreadyStarted { name: String },

    #[error("service '{name}' is terminating")]
    ServiceTerminating { name: String },

    #[error("unknown service: {name}")]
    UnknownService { name: String },

    #[error("service directory no longer exists")]
    DirectoryGone,

    #[error("fps {fps} out of range [{min}, {max}]")]
    FpsOutOfRange { fps: u32, min: u32, max: u32 },

    #[error("conflicting registration roles for subject '{subject}': already {existing}, requested {requested}")]
    RoleConflict {
        subject: String,
        existing: RegistrationRole,
        requested: RegistrationRole,
    },

    #[error("subject '{subject}' does not provide a {capability} capability")]
    MissingCapability {
        subject: String,
        capability: &'static str,
    },

    #[error("duplicate {role} registration for opcode {opcode} on service '{service}'")]
    DuplicateSubscription {
        service: String,
        role: HandlerRole,
        opcode: Opcode,
    },

    #[error("unify pre-handler already installed on service '{service}'")]
    DuplicateUnifyPreHandler { service: String },

    #[error("encoder already registered for payload type {type_name} on service '{service}'")]
    DuplicateEncoder { service: String, type_name: String },

    #[error("facade {type_name} already registered on service '{service}'")]
    DuplicateFacade { service: String, type_name: String },

    #[error("no encoder registered for payload type {type_name} on service '{service}'")]
    MissingEncoder { service: String, type_name: String },

    #[error("scheduler already running, re-entrant schedule() is not allowed")]
    AlreadyScheduling,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("engine error: {0}")]
    Engine(#[source] anyhow::Error),

    #[error("unhandled frame error: {0}")]
    UnhandledFrameError(#[source] anyhow::Error),

    #[error("failed to load runtime configuration: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, NetmuxError>;
