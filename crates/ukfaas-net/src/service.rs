//! The virtual-service verbs consumed by the coordinator.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ukfaas_store::EndpointStore;
use ukfaas_types::{NetworkEvent, NetworkEventKind, WATCHDOG_PORT};

use crate::allocator::SubnetAllocator;
use crate::balancer::{Destination, LoadBalancer, VirtualService};
use crate::probe::{PingProbe, ReachabilityProbe};
use crate::{Error, Result};

/// Virtual-service programming for function backends.
///
/// Within one call the kernel operation precedes the store write, and the
/// event is emitted only after both succeed. If the kernel operation fails,
/// nothing is persisted; if the store write fails afterwards, the kernel
/// mutation is rolled back best-effort.
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Registers the single event subscriber.
    async fn notify(&self, events: mpsc::Sender<NetworkEvent>);

    /// Allocates a VIP, programs the virtual service with one backend, and
    /// records the mapping.
    async fn new_service(&self, service: &str, backend: Ipv4Addr) -> Result<()>;

    /// Adds a backend to an existing virtual service.
    async fn add_service_endpoint(&self, service: &str, backend: Ipv4Addr) -> Result<()>;

    /// Removes a backend from an existing virtual service. Removing an
    /// already-absent backend reports success.
    async fn delete_service_endpoint(&self, service: &str, backend: Ipv4Addr) -> Result<()>;

    /// Tears the virtual service down and frees its VIP.
    async fn delete_service(&self, service: &str) -> Result<()>;

    /// Resolves the service to its `VIP:port` frontend.
    async fn resolve(&self, service: &str) -> Result<SocketAddrV4>;
}

/// The production [`NetworkService`] over a kernel virtual-server table.
pub struct VipNetworkService {
    balancer: Arc<dyn LoadBalancer>,
    endpoints: Arc<dyn EndpointStore>,
    allocator: SubnetAllocator,
    /// VIPs currently backing a live virtual service.
    allocated: tokio::sync::Mutex<HashSet<Ipv4Addr>>,
    port: u16,
    notify: Mutex<Option<mpsc::Sender<NetworkEvent>>>,
    cancel: CancellationToken,
}

/// Typed builder for [`VipNetworkService`].
pub struct VipNetworkServiceBuilder {
    subnet: Ipv4Net,
    balancer: Option<Arc<dyn LoadBalancer>>,
    endpoints: Option<Arc<dyn EndpointStore>>,
    probe: Arc<dyn ReachabilityProbe>,
    port: u16,
    cancel: CancellationToken,
}

impl VipNetworkServiceBuilder {
    pub fn balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    pub fn endpoint_store(mut self, endpoints: Arc<dyn EndpointStore>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<VipNetworkService> {
        let balancer = self
            .balancer
            .ok_or_else(|| Error::Balancer("no load balancer configured".to_string()))?;
        let endpoints = self
            .endpoints
            .ok_or_else(|| Error::Balancer("no endpoint store configured".to_string()))?;

        Ok(VipNetworkService {
            balancer,
            endpoints,
            allocator: SubnetAllocator::new(self.subnet, self.probe),
            allocated: tokio::sync::Mutex::new(HashSet::new()),
            port: self.port,
            notify: Mutex::new(None),
            cancel: self.cancel,
        })
    }
}

impl VipNetworkService {
    /// Starts building a service drawing VIPs from the given subnet.
    pub fn builder(subnet: Ipv4Net) -> VipNetworkServiceBuilder {
        VipNetworkServiceBuilder {
            subnet,
            balancer: None,
            endpoints: None,
            probe: Arc::new(PingProbe),
            port: WATCHDOG_PORT,
            cancel: CancellationToken::new(),
        }
    }

    fn virtual_service(&self, vip: Ipv4Addr) -> VirtualService {
        VirtualService::new(vip, self.port)
    }

    /// Looks the service's virtual-server record up, by store mapping.
    fn lookup(&self, service: &str) -> Result<VirtualService> {
        match self.endpoints.get_endpoint(service) {
            Ok(vip) => Ok(self.virtual_service(vip)),
            Err(ukfaas_store::Error::EndpointNotFound(_)) => {
                Err(Error::ServiceNotFound(service.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn publish(&self, event: NetworkEvent) {
        if self.cancel.is_cancelled() {
            return;
        }

        let sender = match self.notify.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };

        if let Some(sender) = sender {
            if sender.send(event).await.is_err() {
                warn!("network event subscriber went away");
            }
        }
    }
}

#[async_trait]
impl NetworkService for VipNetworkService {
    async fn notify(&self, events: mpsc::Sender<NetworkEvent>) {
        if let Ok(mut guard) = self.notify.lock() {
            *guard = Some(events);
        }
    }

    async fn new_service(&self, service: &str, backend: Ipv4Addr) -> Result<()> {
        // Hold the allocation set across the kernel calls so a concurrent
        // call cannot race us to the same VIP.
        let mut allocated = self.allocated.lock().await;
        let vip = self.allocator.allocate(&allocated, &self.cancel).await?;

        let vs = self.virtual_service(vip);
        self.balancer.create_service(vs).await?;

        let destination = Destination::new(backend, self.port);
        if let Err(error) = self.balancer.create_destination(vs, destination).await {
            let _ = self.balancer.remove_service(vs).await;
            return Err(error);
        }

        allocated.insert(vip);
        if let Err(error) = self.endpoints.put_endpoint(service, vip) {
            allocated.remove(&vip);
            let _ = self.balancer.remove_service(vs).await;
            return Err(error.into());
        }
        drop(allocated);

        info!(service, %vip, %backend, "virtual service created");
        self.publish(NetworkEvent {
            service: service.to_string(),
            vip,
            backend: Some(backend),
            kind: NetworkEventKind::ServiceCreated,
        })
        .await;
        Ok(())
    }

    async fn add_service_endpoint(&self, service: &str, backend: Ipv4Addr) -> Result<()> {
        let vs = self.lookup(service)?;

        self.balancer
            .create_destination(vs, Destination::new(backend, self.port))
            .await?;

        info!(service, vip = %vs.addr, %backend, "endpoint added");
        self.publish(NetworkEvent {
            service: service.to_string(),
            vip: vs.addr,
            backend: Some(backend),
            kind: NetworkEventKind::EndpointAdded,
        })
        .await;
        Ok(())
    }

    async fn delete_service_endpoint(&self, service: &str, backend: Ipv4Addr) -> Result<()> {
        let vs = self.lookup(service)?;

        match self
            .balancer
            .remove_destination(vs, Destination::new(backend, self.port))
            .await
        {
            Ok(()) => {}
            Err(Error::NoSuchRecord) => {
                // Already gone; removal is idempotent.
                debug!(service, %backend, "endpoint already absent");
                return Ok(());
            }
            Err(error) => return Err(error),
        }

        info!(service, vip = %vs.addr, %backend, "endpoint deleted");
        self.publish(NetworkEvent {
            service: service.to_string(),
            vip: vs.addr,
            backend: Some(backend),
            kind: NetworkEventKind::EndpointDeleted,
        })
        .await;
        Ok(())
    }

    async fn delete_service(&self, service: &str) -> Result<()> {
        let vs = self.lookup(service)?;

        match self.balancer.remove_service(vs).await {
            // The table not carrying the record is the state we wanted.
            Ok(()) | Err(Error::NoSuchRecord) => {}
            Err(error) => return Err(error),
        }

        let mut allocated = self.allocated.lock().await;
        allocated.remove(&vs.addr);
        if let Err(error) = self.endpoints.delete_endpoint(service) {
            // Restore the kernel record so state stays consistent with the
            // mapping we failed to drop.
            allocated.insert(vs.addr);
            let _ = self.balancer.create_service(vs).await;
            return Err(error.into());
        }
        drop(allocated);

        info!(service, vip = %vs.addr, "virtual service deleted");
        self.publish(NetworkEvent {
            service: service.to_string(),
            vip: vs.addr,
            backend: None,
            kind: NetworkEventKind::ServiceDeleted,
        })
        .await;
        Ok(())
    }

    async fn resolve(&self, service: &str) -> Result<SocketAddrV4> {
        let vs = self.lookup(service)?;
        Ok(SocketAddrV4::new(vs.addr, vs.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::MemoryLoadBalancer;
    use crate::probe::NeverReachable;
    use ukfaas_store::MemoryEndpointStore;

    struct Fixture {
        service: VipNetworkService,
        balancer: Arc<MemoryLoadBalancer>,
        events: mpsc::Receiver<NetworkEvent>,
    }

    async fn fixture(subnet: &str) -> Fixture {
        let balancer = Arc::new(MemoryLoadBalancer::new());
        let service = VipNetworkService::builder(subnet.parse().unwrap())
            .balancer(Arc::clone(&balancer) as Arc<dyn LoadBalancer>)
            .endpoint_store(Arc::new(MemoryEndpointStore::new()))
            .probe(Arc::new(NeverReachable))
            .build()
            .unwrap();

        let (tx, events) = mpsc::channel(8);
        service.notify(tx).await;

        Fixture {
            service,
            balancer,
            events,
        }
    }

    fn backend(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 63, 1, last)
    }

    #[tokio::test]
    async fn test_new_service_programs_table_and_store() {
        let mut fx = fixture("10.63.0.0/16").await;

        fx.service.new_service("echo", backend(2)).await.unwrap();

        let resolved = fx.service.resolve("echo").await.unwrap();
        assert_eq!(resolved.ip(), &Ipv4Addr::new(10, 63, 0, 1));
        assert_eq!(resolved.port(), WATCHDOG_PORT);

        let vs = VirtualService::new(*resolved.ip(), WATCHDOG_PORT);
        assert_eq!(
            fx.balancer.destinations(vs).await.unwrap(),
            vec![Destination::new(backend(2), WATCHDOG_PORT)]
        );

        let event = fx.events.recv().await.unwrap();
        assert_eq!(event.kind, NetworkEventKind::ServiceCreated);
        assert_eq!(event.backend, Some(backend(2)));
    }

    #[tokio::test]
    async fn test_distinct_services_get_distinct_vips() {
        let fx = fixture("10.63.0.0/16").await;

        fx.service.new_service("echo", backend(2)).await.unwrap();
        fx.service.new_service("hash", backend(3)).await.unwrap();

        let echo = fx.service.resolve("echo").await.unwrap();
        let hash = fx.service.resolve("hash").await.unwrap();
        assert_ne!(echo.ip(), hash.ip());
    }

    #[tokio::test]
    async fn test_endpoint_add_and_idempotent_delete() {
        let mut fx = fixture("10.63.0.0/16").await;
        fx.service.new_service("echo", backend(2)).await.unwrap();

        fx.service
            .add_service_endpoint("echo", backend(3))
            .await
            .unwrap();
        fx.service
            .delete_service_endpoint("echo", backend(3))
            .await
            .unwrap();
        // A second removal of the same backend still reports success.
        fx.service
            .delete_service_endpoint("echo", backend(3))
            .await
            .unwrap();

        let kinds: Vec<NetworkEventKind> = [
            fx.events.recv().await.unwrap(),
            fx.events.recv().await.unwrap(),
            fx.events.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|event| event.kind)
        .collect();
        assert_eq!(
            kinds,
            vec![
                NetworkEventKind::ServiceCreated,
                NetworkEventKind::EndpointAdded,
                NetworkEventKind::EndpointDeleted,
            ]
        );
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_endpoint_verbs_require_existing_service() {
        let fx = fixture("10.63.0.0/16").await;

        assert!(matches!(
            fx.service.add_service_endpoint("echo", backend(2)).await,
            Err(Error::ServiceNotFound(_))
        ));
        assert!(matches!(
            fx.service.delete_service_endpoint("echo", backend(2)).await,
            Err(Error::ServiceNotFound(_))
        ));
        assert!(matches!(
            fx.service.delete_service("echo").await,
            Err(Error::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_service_frees_vip_for_reuse() {
        let fx = fixture("10.63.0.0/16").await;

        fx.service.new_service("echo", backend(2)).await.unwrap();
        let vip = *fx.service.resolve("echo").await.unwrap().ip();

        fx.service.delete_service("echo").await.unwrap();
        assert!(fx.service.resolve("echo").await.is_err());
        assert!(fx.balancer.services().is_empty());

        // The freed VIP is the next candidate for an unrelated service.
        fx.service.new_service("hash", backend(3)).await.unwrap();
        assert_eq!(fx.service.resolve("hash").await.unwrap().ip(), &vip);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_surfaces_subnet() {
        let fx = fixture("10.63.0.0/30").await;

        fx.service.new_service("one", backend(2)).await.unwrap();
        fx.service.new_service("two", backend(3)).await.unwrap();

        let err = fx
            .service
            .new_service("three", backend(4))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not allocate IP address in 10.63.0.0/30"
        );
    }

    struct RejectingEndpointStore;

    impl EndpointStore for RejectingEndpointStore {
        fn put_endpoint(&self, _service: &str, _vip: Ipv4Addr) -> ukfaas_store::Result<()> {
            Err(ukfaas_store::Error::LockPoisoned)
        }

        fn get_endpoint(&self, service: &str) -> ukfaas_store::Result<Ipv4Addr> {
            Err(ukfaas_store::Error::EndpointNotFound(service.to_string()))
        }

        fn delete_endpoint(&self, _service: &str) -> ukfaas_store::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_failure_rolls_kernel_back() {
        let balancer = Arc::new(MemoryLoadBalancer::new());
        let service = VipNetworkService::builder("10.63.0.0/16".parse().unwrap())
            .balancer(Arc::clone(&balancer) as Arc<dyn LoadBalancer>)
            .endpoint_store(Arc::new(RejectingEndpointStore))
            .probe(Arc::new(NeverReachable))
            .build()
            .unwrap();

        assert!(service.new_service("echo", backend(2)).await.is_err());
        // The kernel mutation was rolled back and the VIP freed.
        assert!(balancer.services().is_empty());
    }
}
