//! Events published by the machine and network services.
//!
//! Each service exposes a single-subscriber publication port: the coordinator
//! hands in a channel sender and consumes events on its own tasks.

use std::fmt::{self, Display};
use std::net::Ipv4Addr;

use crate::machine::MachineState;

/// Published by the machine service whenever a replica changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineEvent {
    /// Owning service.
    pub service: String,

    /// Bridge address of the replica; absent when the replica failed before
    /// its NIC was attached.
    pub ip: Option<Ipv4Addr>,

    /// State the replica entered.
    pub state: MachineState,
}

/// Kind of a network-service event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEventKind {
    ServiceCreated,
    EndpointAdded,
    EndpointDeleted,
    ServiceDeleted,
}

impl Display for NetworkEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEventKind::ServiceCreated => write!(f, "service created"),
            NetworkEventKind::EndpointAdded => write!(f, "endpoint added"),
            NetworkEventKind::EndpointDeleted => write!(f, "endpoint deleted"),
            NetworkEventKind::ServiceDeleted => write!(f, "service deleted"),
        }
    }
}

/// Published by the network service after a virtual-service mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub service: String,

    /// Virtual IP fronting the service.
    pub vip: Ipv4Addr,

    /// Backend the mutation concerned, when it concerned one.
    pub backend: Option<Ipv4Addr>,

    pub kind: NetworkEventKind,
}
