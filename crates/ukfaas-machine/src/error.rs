//! Error types for the machine service.

use thiserror::Error;
use ukfaas_types::Platform;

/// Machine-service errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The catalogue matched no image for the reference.
    #[error("no images found for {0}")]
    ImageNotFound(String),

    /// The catalogue matched more than one image for the reference.
    #[error("found multiple packages for {0}")]
    AmbiguousImage(String),

    /// Pull or unpack failed.
    #[error("image store: {0}")]
    Image(String),

    /// No driver registered for the target's platform.
    #[error("platform {0} not supported")]
    UnsupportedPlatform(Platform),

    /// The image declared no platform at all.
    #[error("image {0} declares no platform")]
    MissingPlatform(String),

    /// A platform driver call failed.
    #[error("driver: {0}")]
    Driver(String),

    /// Bridge or interface programming failed.
    #[error("bridge network: {0}")]
    Bridge(String),

    /// Filesystem error materialising a state directory.
    #[error("state directory: {0}")]
    StateDir(#[from] std::io::Error),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] ukfaas_store::Error),
}

/// Result type for machine operations.
pub type Result<T> = std::result::Result<T, Error>;
