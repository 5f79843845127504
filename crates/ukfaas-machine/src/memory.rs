//! In-process implementations of the machine-service contracts, used by
//! tests and single-process runs.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use ukfaas_types::{ImageTarget, Machine, MachineId};

use crate::bridge::BridgeService;
use crate::driver::VmDriver;
use crate::image::{CatalogueScope, ImageStore, PackageHandle};
use crate::{Error, Result};

fn poisoned() -> Error {
    Error::Image("lock poisoned".to_string())
}

// ============================================================================
// Image store
// ============================================================================

#[derive(Debug, Default)]
struct CatalogueInner {
    local: HashMap<String, Vec<ImageTarget>>,
    remote: HashMap<String, Vec<ImageTarget>>,
    pulled: HashSet<String>,
}

/// Image catalogue fed from registered targets.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    inner: Mutex<CatalogueInner>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target as locally present and pulled.
    pub fn register(&self, reference: &str, target: ImageTarget) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .local
                .entry(reference.to_string())
                .or_default()
                .push(target);
            inner.pulled.insert(reference.to_string());
        }
    }

    /// Registers a target only reachable through a remote query.
    pub fn register_remote(&self, reference: &str, target: ImageTarget) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .remote
                .entry(reference.to_string())
                .or_default()
                .push(target);
        }
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn catalogue(
        &self,
        reference: &str,
        scope: CatalogueScope,
    ) -> Result<Vec<PackageHandle>> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let shelf = match scope {
            CatalogueScope::Local => &inner.local,
            CatalogueScope::Remote => &inner.remote,
        };

        Ok(shelf
            .get(reference)
            .map(|targets| {
                targets
                    .iter()
                    .map(|_| PackageHandle {
                        reference: reference.to_string(),
                        pulled: inner.pulled.contains(reference),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn pull(&self, package: &PackageHandle) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        if let Some(targets) = inner.remote.remove(&package.reference) {
            inner.local.insert(package.reference.clone(), targets);
        }
        inner.pulled.insert(package.reference.clone());
        Ok(())
    }

    async fn unpack(&self, package: &PackageHandle, _dest: &Path) -> Result<ImageTarget> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        inner
            .local
            .get(&package.reference)
            .and_then(|targets| targets.first())
            .cloned()
            .ok_or_else(|| Error::ImageNotFound(package.reference.clone()))
    }
}

// ============================================================================
// Bridge
// ============================================================================

#[derive(Debug, Default)]
struct BridgeInner {
    bridges: HashMap<String, Ipv4Net>,
    interfaces: HashMap<String, Ipv4Net>,
    next_host: u32,
}

/// Bridge surface handing out sequential addresses from the bridge subnet.
#[derive(Debug, Default)]
pub struct MemoryBridge {
    inner: Mutex<BridgeInner>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side interfaces currently attached.
    pub fn interfaces(&self) -> Vec<String> {
        match self.inner.lock() {
            Ok(inner) => inner.interfaces.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl BridgeService for MemoryBridge {
    async fn exists(&self, name: &str) -> Result<bool> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| Error::Bridge("lock poisoned".to_string()))?;
        Ok(inner.bridges.contains_key(name))
    }

    async fn create(&self, name: &str, gateway: Ipv4Net) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Bridge("lock poisoned".to_string()))?;
        inner.bridges.insert(name.to_string(), gateway);
        Ok(())
    }

    async fn attach_interface(&self, bridge: &str, ifname: &str) -> Result<Ipv4Net> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Bridge("lock poisoned".to_string()))?;

        let gateway = *inner
            .bridges
            .get(bridge)
            .ok_or_else(|| Error::Bridge(format!("bridge {bridge} does not exist")))?;

        // Hand out addresses after the gateway, in attach order.
        inner.next_host += 1;
        let offset = inner.next_host;
        let base = u32::from(gateway.addr());
        let addr = Ipv4Addr::from(base + offset);
        let assigned = Ipv4Net::new(addr, gateway.prefix_len())
            .map_err(|error| Error::Bridge(error.to_string()))?;

        inner.interfaces.insert(ifname.to_string(), assigned);
        Ok(assigned)
    }

    async fn remove_interface(&self, ifname: &str) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Bridge("lock poisoned".to_string()))?;
        // Absent link is not an error.
        inner.interfaces.remove(ifname);
        Ok(())
    }
}

// ============================================================================
// VM driver
// ============================================================================

/// Monitor state recorded by the in-process driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Created,
    Started,
    Stopped,
    Deleted,
}

/// Driver that tracks per-VM monitor state instead of booting anything.
#[derive(Debug, Default)]
pub struct MemoryVmDriver {
    vms: Mutex<HashMap<MachineId, MonitorState>>,
}

impl MemoryVmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, uid: MachineId) -> Option<MonitorState> {
        self.vms.lock().ok().and_then(|vms| vms.get(&uid).copied())
    }

    /// VMs currently in the started state.
    pub fn started_count(&self) -> usize {
        self.vms
            .lock()
            .map(|vms| {
                vms.values()
                    .filter(|state| **state == MonitorState::Started)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl VmDriver for MemoryVmDriver {
    async fn create(&self, machine: &Machine) -> Result<()> {
        let mut vms = self
            .vms
            .lock()
            .map_err(|_| Error::Driver("lock poisoned".to_string()))?;
        vms.insert(machine.uid, MonitorState::Created);
        Ok(())
    }

    async fn start(&self, machine: &Machine) -> Result<()> {
        let mut vms = self
            .vms
            .lock()
            .map_err(|_| Error::Driver("lock poisoned".to_string()))?;
        match vms.get(&machine.uid) {
            Some(MonitorState::Created | MonitorState::Stopped) => {
                vms.insert(machine.uid, MonitorState::Started);
                Ok(())
            }
            other => Err(Error::Driver(format!(
                "cannot start {} from {other:?}",
                machine.uid
            ))),
        }
    }

    async fn stop(&self, machine: &Machine) -> Result<()> {
        let mut vms = self
            .vms
            .lock()
            .map_err(|_| Error::Driver("lock poisoned".to_string()))?;
        match vms.get(&machine.uid) {
            Some(MonitorState::Started) => {
                vms.insert(machine.uid, MonitorState::Stopped);
                Ok(())
            }
            other => Err(Error::Driver(format!(
                "cannot stop {} from {other:?}",
                machine.uid
            ))),
        }
    }

    async fn delete(&self, machine: &Machine) -> Result<()> {
        let mut vms = self
            .vms
            .lock()
            .map_err(|_| Error::Driver("lock poisoned".to_string()))?;
        vms.insert(machine.uid, MonitorState::Deleted);
        Ok(())
    }
}
