//! Replica types and the replica state machine.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::image::Platform;

/// Unique identifier of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineId(Uuid);

impl MachineId {
    /// Allocates a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short prefix used in interface and state-directory names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MachineId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a replica.
///
/// ```text
///         Created ── start ─▶ Running ── stop ─▶ Exited
///            │                   │                 │
///            └── error ──▶ Errored ◀──────────────┘
/// ```
///
/// `Created` and `Running` are active (counted toward the replica count);
/// `Exited` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Created,
    Running,
    Exited,
    Errored,
}

impl MachineState {
    /// Whether the state counts toward the active replica count.
    pub fn is_active(self) -> bool {
        matches!(self, MachineState::Created | MachineState::Running)
    }
}

impl Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Created => write!(f, "created"),
            MachineState::Running => write!(f, "running"),
            MachineState::Exited => write!(f, "exited"),
            MachineState::Errored => write!(f, "errored"),
        }
    }
}

/// Bridge attachment of one replica. The host-side interface is created when
/// the replica enters `Created` and released on entry into a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    /// Bridge the interface is enslaved to.
    pub bridge: String,

    /// Host-side interface name (truncated to IFNAMSIZ).
    pub ifname: String,

    /// Address assigned out of the bridge subnet.
    pub addr: Ipv4Net,
}

/// A volume attached to a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub driver: String,
    pub destination: PathBuf,
}

/// Concrete resources for one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub vcpus: u64,
    pub memory_bytes: u64,
}

/// Requested and maximum resources for one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineResources {
    pub request: ResourceSpec,
    pub limit: ResourceSpec,
}

/// One unikernel VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub uid: MachineId,

    /// Human-readable instance name.
    pub name: String,

    /// Owning service.
    pub service: String,

    pub platform: Platform,

    pub architecture: String,

    pub kernel: PathBuf,

    pub initrd: Option<PathBuf>,

    pub command: Vec<String>,

    pub volumes: Vec<Volume>,

    pub resources: MachineResources,

    pub labels: BTreeMap<String, String>,

    pub annotations: BTreeMap<String, String>,

    /// Per-replica scratch directory.
    pub state_dir: PathBuf,

    /// Bridge attachment; present from NIC creation until teardown.
    pub nic: Option<Nic>,

    pub state: MachineState,
}

impl Machine {
    /// Address of the replica on the bridge, when a NIC is attached.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.nic.as_ref().map(|nic| nic.addr.addr())
    }
}
