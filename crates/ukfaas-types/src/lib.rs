//! # ukfaas-types: Core types for the ukfaas control plane
//!
//! This crate contains the shared vocabulary of the system:
//! - Function spec and provider request/response types ([`Function`],
//!   [`FunctionDeployment`], [`FunctionStatus`])
//! - Replica types and the replica state machine ([`Machine`],
//!   [`MachineState`], [`MachineId`])
//! - Pulled-image metadata ([`ImageTarget`], [`KConfig`], [`Platform`])
//! - Lifecycle events published by the machine and network services
//!   ([`MachineEvent`], [`NetworkEvent`])
//! - Lax resource-quantity parsing ([`quantity`])

mod event;
mod function;
mod image;
mod machine;
pub mod quantity;

pub use event::{MachineEvent, NetworkEvent, NetworkEventKind};
pub use function::{
    DeleteFunctionRequest, Function, FunctionDeployment, FunctionResources, FunctionStatus,
    ScaleServiceRequest,
};
pub use image::{ImageTarget, KConfig, Platform, PlatformParseError};
pub use machine::{Machine, MachineId, MachineResources, MachineState, Nic, ResourceSpec, Volume};

// ============================================================================
// Project-wide constants
// ============================================================================

/// Namespace functions are deployed into; the gateway appends it to
/// function names when proxying.
pub const DEFAULT_FUNCTION_NAMESPACE: &str = "openfaas-fn";

/// containerd namespace the platform's own images live in.
pub const DEFAULT_CONTAINERD_NAMESPACE: &str = "openfaas";

/// Name of the single bridge all replica NICs attach to.
pub const BRIDGE_NAME: &str = "openfaas0";

/// Gateway address and prefix of the replica bridge.
pub const BRIDGE_GATEWAY: &str = "10.63.0.1/16";

/// Pool the virtual service IPs are allocated from.
pub const SERVICE_SUBNET: &str = "10.63.0.0/16";

/// TCP port the in-VM watchdog accepts requests on, both on the VIP and
/// on every backend.
pub const WATCHDOG_PORT: u16 = 8080;

/// Label carrying the owning service name on every replica.
pub const LABEL_SERVICE: &str = "ukfaas.io/service";

/// Label carrying the image reference on every replica.
pub const LABEL_IMAGE: &str = "ukfaas.io/image";

/// Label carrying the function namespace on every replica.
pub const LABEL_NAMESPACE: &str = "ukfaas.io/namespace";
