//! Unikernel replica lifecycle for ukfaas.
//!
//! The machine service turns a stored function into running unikernel VMs:
//! it resolves the OCI-packaged image to a boot target, builds a replica
//! spec, attaches the replica to the shared bridge, and drives a platform
//! driver (KVM / Firecracker) through create/start/stop/delete. Every state
//! transition is published as a [`MachineEvent`] for the coordinator to
//! reconcile the load balancer against.
//!
//! The image packager, the bridge programming, and the VM monitors are
//! consumed through the narrow [`ImageStore`], [`BridgeService`] and
//! [`VmDriver`] contracts; `memory::*` carries the in-process
//! implementations used by tests and single-process runs.
//!
//! [`MachineEvent`]: ukfaas_types::MachineEvent

mod bridge;
mod driver;
mod error;
mod image;
pub mod memory;
mod service;

pub use bridge::BridgeService;
pub use driver::VmDriver;
pub use error::{Error, Result};
pub use image::{CatalogueScope, ImageStore, PackageHandle};
pub use service::{MachineService, UnikernelMachineService, UnikernelMachineServiceBuilder};
