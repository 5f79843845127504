//! In-memory endpoint store.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use crate::{EndpointStore, Error, Result};

/// Concurrent map of service name → virtual IP.
#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    endpoints: RwLock<HashMap<String, Ipv4Addr>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointStore for MemoryEndpointStore {
    fn put_endpoint(&self, service: &str, vip: Ipv4Addr) -> Result<()> {
        let mut endpoints = self.endpoints.write().map_err(|_| Error::LockPoisoned)?;
        endpoints.insert(service.to_string(), vip);
        Ok(())
    }

    fn get_endpoint(&self, service: &str) -> Result<Ipv4Addr> {
        let endpoints = self.endpoints.read().map_err(|_| Error::LockPoisoned)?;
        endpoints
            .get(service)
            .copied()
            .ok_or_else(|| Error::EndpointNotFound(service.to_string()))
    }

    fn delete_endpoint(&self, service: &str) -> Result<()> {
        let mut endpoints = self.endpoints.write().map_err(|_| Error::LockPoisoned)?;
        endpoints.remove(service);
        Ok(())
    }
}
