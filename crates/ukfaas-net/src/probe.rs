//! Liveness probing of candidate addresses.
//!
//! The allocator refuses to hand out an address that already answers on the
//! wire, as a defence against out-of-band squatters.

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Checks whether an address answers within the given budget.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, addr: Ipv4Addr, timeout: Duration) -> bool;
}

/// ICMP echo through the system `ping` binary.
///
/// Raw ICMP sockets need elevated privileges anyway, and the daemon already
/// runs privileged to program the kernel; delegating to `ping` keeps the
/// probe unprivileged-testable.
#[derive(Debug, Default, Clone)]
pub struct PingProbe;

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn is_reachable(&self, addr: Ipv4Addr, timeout: Duration) -> bool {
        let child = Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg("1")
            .arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(error)) => {
                debug!(%addr, %error, "ping spawn failed; treating address as free");
                false
            }
            // No answer inside the budget.
            Err(_) => false,
        }
    }
}

/// Probe that reports every address free; used in tests and in-process runs.
#[derive(Debug, Default, Clone)]
pub struct NeverReachable;

#[async_trait]
impl ReachabilityProbe for NeverReachable {
    async fn is_reachable(&self, _addr: Ipv4Addr, _timeout: Duration) -> bool {
        false
    }
}
