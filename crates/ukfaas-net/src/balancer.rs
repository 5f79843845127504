//! The narrow contract over the kernel's layer-4 virtual-server table.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Error, Result};

/// Connection scheduler of a virtual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduler {
    #[default]
    RoundRobin,
}

/// How traffic is forwarded to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMethod {
    #[default]
    Masquerade,
}

/// One virtual-server record: a TCP service on the VIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualService {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl VirtualService {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Scheduler programmed for every service.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::RoundRobin
    }
}

/// One destination record: a real backend behind a virtual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Destination {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Weight programmed for every destination.
    pub fn weight(&self) -> u32 {
        1
    }

    /// Forwarding method programmed for every destination.
    pub fn forward(&self) -> ForwardMethod {
        ForwardMethod::Masquerade
    }
}

/// Kernel virtual-server table, consumed through a narrow interface.
///
/// Semantics follow IPVS: creating an existing service fails, removing an
/// absent record fails with [`Error::NoSuchRecord`], and removing a service
/// drops its destinations with it.
#[async_trait]
pub trait LoadBalancer: Send + Sync {
    async fn create_service(&self, service: VirtualService) -> Result<()>;

    async fn remove_service(&self, service: VirtualService) -> Result<()>;

    async fn create_destination(
        &self,
        service: VirtualService,
        destination: Destination,
    ) -> Result<()>;

    async fn remove_destination(
        &self,
        service: VirtualService,
        destination: Destination,
    ) -> Result<()>;

    /// Destinations currently programmed for the service.
    async fn destinations(&self, service: VirtualService) -> Result<Vec<Destination>>;
}

/// In-process virtual-server table used by tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryLoadBalancer {
    table: Mutex<HashMap<VirtualService, HashSet<Destination>>>,
}

impl MemoryLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual services currently in the table.
    pub fn services(&self) -> Vec<VirtualService> {
        match self.table.lock() {
            Ok(table) => table.keys().copied().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl LoadBalancer for MemoryLoadBalancer {
    async fn create_service(&self, service: VirtualService) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Balancer("table lock poisoned".to_string()))?;
        if table.contains_key(&service) {
            return Err(Error::ServiceExists(service.addr, service.port));
        }
        table.insert(service, HashSet::new());
        Ok(())
    }

    async fn remove_service(&self, service: VirtualService) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Balancer("table lock poisoned".to_string()))?;
        table.remove(&service).ok_or(Error::NoSuchRecord)?;
        Ok(())
    }

    async fn create_destination(
        &self,
        service: VirtualService,
        destination: Destination,
    ) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Balancer("table lock poisoned".to_string()))?;
        let destinations = table.get_mut(&service).ok_or(Error::NoSuchRecord)?;
        destinations.insert(destination);
        Ok(())
    }

    async fn remove_destination(
        &self,
        service: VirtualService,
        destination: Destination,
    ) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Balancer("table lock poisoned".to_string()))?;
        let destinations = table.get_mut(&service).ok_or(Error::NoSuchRecord)?;
        if !destinations.remove(&destination) {
            return Err(Error::NoSuchRecord);
        }
        Ok(())
    }

    async fn destinations(&self, service: VirtualService) -> Result<Vec<Destination>> {
        let table = self
            .table
            .lock()
            .map_err(|_| Error::Balancer("table lock poisoned".to_string()))?;
        let destinations = table.get(&service).ok_or(Error::NoSuchRecord)?;
        Ok(destinations.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vs() -> VirtualService {
        VirtualService::new(Ipv4Addr::new(10, 63, 0, 2), 8080)
    }

    #[tokio::test]
    async fn test_duplicate_service_rejected() {
        let lb = MemoryLoadBalancer::new();
        lb.create_service(vs()).await.unwrap();

        assert!(matches!(
            lb.create_service(vs()).await,
            Err(Error::ServiceExists(_, _))
        ));
    }

    #[tokio::test]
    async fn test_destination_lifecycle() {
        let lb = MemoryLoadBalancer::new();
        let dest = Destination::new(Ipv4Addr::new(10, 63, 1, 2), 8080);

        lb.create_service(vs()).await.unwrap();
        lb.create_destination(vs(), dest).await.unwrap();
        assert_eq!(lb.destinations(vs()).await.unwrap(), vec![dest]);

        lb.remove_destination(vs(), dest).await.unwrap();
        assert!(lb.destinations(vs()).await.unwrap().is_empty());

        // Absent destination behaves like the kernel: no such record.
        assert!(matches!(
            lb.remove_destination(vs(), dest).await,
            Err(Error::NoSuchRecord)
        ));
    }

    #[tokio::test]
    async fn test_remove_service_drops_destinations() {
        let lb = MemoryLoadBalancer::new();
        let dest = Destination::new(Ipv4Addr::new(10, 63, 1, 2), 8080);

        lb.create_service(vs()).await.unwrap();
        lb.create_destination(vs(), dest).await.unwrap();
        lb.remove_service(vs()).await.unwrap();

        assert!(matches!(
            lb.destinations(vs()).await,
            Err(Error::NoSuchRecord)
        ));
        assert!(matches!(
            lb.remove_service(vs()).await,
            Err(Error::NoSuchRecord)
        ));
    }
}
