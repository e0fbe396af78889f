//! # System Constants
//!
//! Operational boundaries of the service runtime. FPS limits mirror the
//! native engine's supported range; the scheduler's maximum rate doubles as
//! the default pacing ceiling for the cooperative loop.

/// Lowest frame rate a service may be configured with.
pub const MIN_SERVICE_FPS: u32 = 1;

/// Highest frame rate a service may be configured with.
pub const MAX_SERVICE_FPS: u32 = 200;

/// Frame rate assigned to newly created services.
pub const DEFAULT_SERVICE_FPS: u32 = 60;

/// Maximum number of live services in one directory.
pub const MAX_SERVICE_COUNT: usize = 64;

/// Default poller count handed to the engine on service start.
pub const DEFAULT_POLLER_COUNT: usize = 1;
