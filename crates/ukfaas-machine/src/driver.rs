//! The narrow contract over the platform VM monitors.

use async_trait::async_trait;
use ukfaas_types::Machine;

use crate::Result;

/// A platform driver (KVM, Firecracker) driving one VM monitor.
///
/// Drivers are selected by the target image's platform metadata. All calls
/// take the full replica spec; the driver keys its own state off the UID.
#[async_trait]
pub trait VmDriver: Send + Sync {
    /// Materialises the VM without starting its vCPUs.
    async fn create(&self, machine: &Machine) -> Result<()>;

    /// Starts a created VM.
    async fn start(&self, machine: &Machine) -> Result<()>;

    /// Stops a running VM.
    async fn stop(&self, machine: &Machine) -> Result<()>;

    /// Releases all monitor state for the VM.
    async fn delete(&self, machine: &Machine) -> Result<()>;
}
