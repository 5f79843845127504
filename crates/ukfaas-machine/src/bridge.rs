//! The narrow contract over the bridge link surface.

use async_trait::async_trait;
use ipnet::Ipv4Net;

use crate::Result;

/// Host bridge programming: one bridge carries every replica NIC.
#[async_trait]
pub trait BridgeService: Send + Sync {
    /// Whether a bridge of the given name exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Creates the bridge on the given gateway address and netmask.
    async fn create(&self, name: &str, gateway: Ipv4Net) -> Result<()>;

    /// Creates a host-side interface enslaved to the bridge and assigns it
    /// an address out of the bridge subnet.
    async fn attach_interface(&self, bridge: &str, ifname: &str) -> Result<Ipv4Net>;

    /// Brings the interface down and deletes it. An absent link is not an
    /// error.
    async fn remove_interface(&self, ifname: &str) -> Result<()>;
}
