//! Error types for store operations.

use thiserror::Error;
use ukfaas_types::MachineId;

/// Store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No function stored under the service name.
    #[error("function {0} not found")]
    FunctionNotFound(String),

    /// No virtual IP recorded for the service.
    #[error("no endpoint for service {0}")]
    EndpointNotFound(String),

    /// No replica stored under the UID.
    #[error("no such machine {0} in store")]
    MachineNotFound(MachineId),

    /// The service has no active-count entry.
    #[error("no such service {0} in store")]
    ServiceNotFound(String),

    /// No active replica left to select for the service.
    #[error("no active machine for service {0}")]
    NoActiveMachine(String),

    /// A lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
