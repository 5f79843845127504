//! Virtual-service networking for ukfaas.
//!
//! One virtual IP fronts each function; an in-kernel layer-4 load balancer
//! (IPVS semantics) spreads connections over the live replica backends. This
//! crate provides:
//! - [`SubnetAllocator`]: hands out unused unicast IPs from a configured CIDR
//! - [`LoadBalancer`]: the narrow contract over the kernel virtual-server
//!   table, with [`MemoryLoadBalancer`] as the in-process implementation
//! - [`NetworkService`] / [`VipNetworkService`]: the virtual-service verbs
//!   consumed by the coordinator, emitting [`NetworkEvent`]s
//!
//! [`NetworkEvent`]: ukfaas_types::NetworkEvent

mod allocator;
mod balancer;
mod error;
mod probe;
mod service;

pub use allocator::SubnetAllocator;
pub use balancer::{
    Destination, ForwardMethod, LoadBalancer, MemoryLoadBalancer, Scheduler, VirtualService,
};
pub use error::{Error, Result};
pub use probe::{NeverReachable, PingProbe, ReachabilityProbe};
pub use service::{NetworkService, VipNetworkService, VipNetworkServiceBuilder};
