//! Sequential allocator for virtual IPs out of a configured CIDR.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use tokio_util::sync::CancellationToken;

use crate::probe::ReachabilityProbe;
use crate::{Error, Result};

/// How long a candidate gets to answer the liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(150);

/// Hands out unused unicast IPs from a configured subnet.
///
/// The scan starts from the network address and walks upward, skipping
/// addresses that are outside the subnet (exhaustion), non-unicast
/// (network/broadcast), already handed out, or answering the liveness probe.
pub struct SubnetAllocator {
    subnet: Ipv4Net,
    probe: Arc<dyn ReachabilityProbe>,
}

impl SubnetAllocator {
    pub fn new(subnet: Ipv4Net, probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self { subnet, probe }
    }

    /// The subnet this allocator draws from.
    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    /// Returns the first address that survives all four tests, or
    /// [`Error::SubnetExhausted`] once the scan leaves the subnet.
    ///
    /// The cancellation signal is checked on every iteration; an aborted
    /// scan returns [`Error::Cancelled`].
    pub async fn allocate(
        &self,
        allocated: &HashSet<Ipv4Addr>,
        cancel: &CancellationToken,
    ) -> Result<Ipv4Addr> {
        let mut addr = self.subnet.network();

        loop {
            let next = u32::from(addr).checked_add(1).map(Ipv4Addr::from);
            addr = match next {
                Some(next) => next,
                None => return Err(Error::SubnetExhausted(self.subnet)),
            };

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if !self.subnet.contains(&addr) {
                return Err(Error::SubnetExhausted(self.subnet));
            }

            // Network and broadcast addresses are not assignable.
            if addr == self.subnet.network() || addr == self.subnet.broadcast() {
                continue;
            }

            if allocated.contains(&addr) {
                continue;
            }

            if self.probe.is_reachable(addr, PROBE_TIMEOUT).await {
                continue;
            }

            return Ok(addr);
        }
    }
}
