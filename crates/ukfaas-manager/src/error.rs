//! Error types for the coordinator.

use thiserror::Error;

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Deploy of a service that already has a function.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A verb referenced a function the store does not hold.
    #[error("{0} does not exist")]
    FunctionNotFound(String),

    /// The readiness wait was aborted by shutdown.
    #[error("readiness wait for {0} aborted")]
    ReadinessAborted(String),

    /// A resolved frontend did not form a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] ukfaas_store::Error),

    /// Machine-service failure.
    #[error(transparent)]
    Machine(#[from] ukfaas_machine::Error),

    /// Network-service failure.
    #[error(transparent)]
    Network(#[from] ukfaas_net::Error),
}

/// Classification of an error for the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was wrong (400).
    BadRequest,

    /// The referenced function or virtual service does not exist (404).
    NotFound,

    /// The request conflicts with existing state; reported as 400 with a
    /// descriptive message.
    Conflict,

    /// Everything else (500).
    Internal,
}

impl Error {
    /// How the HTTP layer should report this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyExists(_) => ErrorKind::BadRequest,
            Error::FunctionNotFound(_) => ErrorKind::NotFound,
            Error::Network(ukfaas_net::Error::ServiceNotFound(_)) => ErrorKind::NotFound,
            Error::Network(ukfaas_net::Error::ServiceExists(_, _)) => ErrorKind::Conflict,
            Error::Machine(ukfaas_machine::Error::AmbiguousImage(_)) => ErrorKind::Conflict,
            Error::Store(
                ukfaas_store::Error::FunctionNotFound(_)
                | ukfaas_store::Error::ServiceNotFound(_)
                | ukfaas_store::Error::EndpointNotFound(_),
            ) => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
