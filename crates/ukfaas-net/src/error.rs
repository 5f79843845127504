//! Error types for the network service.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;

/// Network-service errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No virtual service exists for the function.
    #[error("service {0} has no virtual service")]
    ServiceNotFound(String),

    /// Every candidate address in the pool was taken or unusable.
    #[error("could not allocate IP address in {0}")]
    SubnetExhausted(Ipv4Net),

    /// The allocation scan was aborted by the cancellation signal.
    #[error("IP allocation cancelled")]
    Cancelled,

    /// The kernel already carries a virtual service on the address.
    #[error("virtual service {0}:{1} already exists")]
    ServiceExists(Ipv4Addr, u16),

    /// The kernel has no record matching the request.
    #[error("no such record in virtual-server table")]
    NoSuchRecord,

    /// The kernel virtual-server table rejected an operation.
    #[error("virtual-server table: {0}")]
    Balancer(String),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] ukfaas_store::Error),
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, Error>;
