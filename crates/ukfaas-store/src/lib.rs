//! In-memory stores backing the ukfaas control plane.
//!
//! Three concurrent mappings, keyed by service name or replica UID:
//! - [`FunctionStore`]: service → desired function spec
//! - [`EndpointStore`]: service → virtual IP
//! - [`MachineStore`]: UID → replica, plus a per-service active count
//!
//! All stores are purely in-memory and lost on restart; persistence is a
//! future concern. Callers enforce key uniqueness — `put` is an
//! unconditional overwrite.

mod endpoint;
mod error;
mod function;
mod machine;

pub use endpoint::MemoryEndpointStore;
pub use error::{Error, Result};
pub use function::MemoryFunctionStore;
pub use machine::MemoryMachineStore;

use std::net::Ipv4Addr;

use ukfaas_types::{Function, Machine, MachineId};

/// Desired deployment of every known function.
pub trait FunctionStore: Send + Sync {
    /// Stores the function under its service name, overwriting any prior row.
    fn put_function(&self, service: &str, function: Function) -> Result<()>;

    fn get_function(&self, service: &str) -> Result<Function>;

    fn delete_function(&self, service: &str) -> Result<()>;

    fn list_functions(&self) -> Result<Vec<Function>>;
}

/// Service name → virtual IP of its virtual service.
pub trait EndpointStore: Send + Sync {
    fn put_endpoint(&self, service: &str, vip: Ipv4Addr) -> Result<()>;

    fn get_endpoint(&self, service: &str) -> Result<Ipv4Addr>;

    fn delete_endpoint(&self, service: &str) -> Result<()>;
}

/// Replicas by UID, with a cached per-service active count.
///
/// The count tracks replicas in an active state (`Created` or `Running`);
/// every mutation adjusts it from the (was-active, is-active) transition
/// against the prior row.
pub trait MachineStore: Send + Sync {
    /// Writes the replica and updates the active count from the state
    /// transition against any prior row.
    fn put_machine(&self, service: &str, machine: Machine) -> Result<()>;

    fn get_machine(&self, uid: MachineId) -> Result<Machine>;

    /// Linear scan filtered by the service label.
    fn list_machines(&self, service: &str) -> Result<Vec<Machine>>;

    /// Selects any one active replica of the service and removes it, in one
    /// atomic step, so concurrent scale-downs cannot pick the same victim.
    fn pop_machine(&self, service: &str) -> Result<Machine>;

    /// Removes the row and decrements the count when the row was active.
    fn delete_machine(&self, service: &str, uid: MachineId) -> Result<()>;

    /// Cached count of active replicas. Fails with [`Error::ServiceNotFound`]
    /// when the service has no entry.
    fn active_replicas(&self, service: &str) -> Result<u64>;
}
