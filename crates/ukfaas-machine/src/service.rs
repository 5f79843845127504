//! The machine-service verbs consumed by the coordinator.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ukfaas_store::MachineStore;
use ukfaas_types::{
    Function, ImageTarget, LABEL_IMAGE, LABEL_NAMESPACE, LABEL_SERVICE, Machine, MachineEvent,
    MachineId, MachineResources, MachineState, Nic, ResourceSpec, Volume, quantity,
};

use crate::bridge::BridgeService;
use crate::driver::VmDriver;
use crate::image::{CatalogueScope, ImageStore};
use crate::{Error, Result};

/// Kconfig options that let the unikernel mount its initrd as the rootfs.
const AUTOMOUNT_OPTIONS: &[&str] = &["CONFIG_LIBVFSCORE_AUTOMOUNT_UP"];

/// Linux IFNAMSIZ minus the trailing NUL.
const IFNAME_MAX: usize = 15;

/// Replica lifecycle management for deployed functions.
#[async_trait]
pub trait MachineService: Send + Sync {
    /// Registers the single event subscriber.
    async fn notify(&self, events: mpsc::Sender<MachineEvent>);

    /// Resolves an image reference to a boot target, pulling and unpacking
    /// as needed.
    async fn pull_image(&self, reference: &str) -> Result<ImageTarget>;

    /// Creates one replica of the function.
    async fn deploy(&self, function: &Function) -> Result<()>;

    /// Drives the replica count to `replicas`, creating or destroying as
    /// needed. Each delta publishes a machine event.
    async fn scale(&self, function: &Function, replicas: u64) -> Result<()>;

    /// Destroys all replicas of the function.
    async fn delete(&self, function: &Function) -> Result<()>;

    /// Active replica count of the service.
    async fn replicas(&self, service: &str) -> Result<u64>;
}

/// The production [`MachineService`] over an OCI image store, a bridge
/// network and the platform VM drivers.
pub struct UnikernelMachineService {
    images: Arc<dyn ImageStore>,
    bridge: Arc<dyn BridgeService>,
    drivers: HashMap<ukfaas_types::Platform, Arc<dyn VmDriver>>,
    machines: Arc<dyn MachineStore>,
    bridge_name: String,
    oci_dir: PathBuf,
    machine_dir: PathBuf,
    notify: Mutex<Option<mpsc::Sender<MachineEvent>>>,
    cancel: CancellationToken,
}

/// Typed builder for [`UnikernelMachineService`].
pub struct UnikernelMachineServiceBuilder {
    images: Option<Arc<dyn ImageStore>>,
    bridge: Option<Arc<dyn BridgeService>>,
    drivers: HashMap<ukfaas_types::Platform, Arc<dyn VmDriver>>,
    machines: Option<Arc<dyn MachineStore>>,
    bridge_name: String,
    bridge_gateway: Ipv4Net,
    oci_dir: PathBuf,
    machine_dir: PathBuf,
    cancel: CancellationToken,
}

impl UnikernelMachineServiceBuilder {
    pub fn image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn bridge(mut self, bridge: Arc<dyn BridgeService>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn driver(
        mut self,
        platform: ukfaas_types::Platform,
        driver: Arc<dyn VmDriver>,
    ) -> Self {
        self.drivers.insert(platform, driver);
        self
    }

    pub fn machine_store(mut self, machines: Arc<dyn MachineStore>) -> Self {
        self.machines = Some(machines);
        self
    }

    pub fn state_dirs(mut self, oci_dir: PathBuf, machine_dir: PathBuf) -> Self {
        self.oci_dir = oci_dir;
        self.machine_dir = machine_dir;
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Finishes construction, making sure the replica bridge exists.
    pub async fn build(self) -> Result<UnikernelMachineService> {
        let images = self
            .images
            .ok_or_else(|| Error::Image("no image store configured".to_string()))?;
        let bridge = self
            .bridge
            .ok_or_else(|| Error::Bridge("no bridge service configured".to_string()))?;
        let machines = self
            .machines
            .ok_or_else(|| Error::Driver("no machine store configured".to_string()))?;
        if self.drivers.is_empty() {
            return Err(Error::Driver("no platform drivers registered".to_string()));
        }

        if !bridge.exists(&self.bridge_name).await? {
            info!(bridge = %self.bridge_name, gateway = %self.bridge_gateway, "creating replica bridge");
            bridge.create(&self.bridge_name, self.bridge_gateway).await?;
        }

        Ok(UnikernelMachineService {
            images,
            bridge,
            drivers: self.drivers,
            machines,
            bridge_name: self.bridge_name,
            oci_dir: self.oci_dir,
            machine_dir: self.machine_dir,
            notify: Mutex::new(None),
            cancel: self.cancel,
        })
    }
}

impl UnikernelMachineService {
    /// Starts building a service on the given bridge.
    pub fn builder(bridge_name: &str, bridge_gateway: Ipv4Net) -> UnikernelMachineServiceBuilder {
        UnikernelMachineServiceBuilder {
            images: None,
            bridge: None,
            drivers: HashMap::new(),
            machines: None,
            bridge_name: bridge_name.to_string(),
            bridge_gateway,
            oci_dir: PathBuf::from("/tmp/ukfaas/oci"),
            machine_dir: PathBuf::from("/tmp/ukfaas/machines"),
            cancel: CancellationToken::new(),
        }
    }

    async fn publish(&self, event: MachineEvent) {
        if self.cancel.is_cancelled() {
            return;
        }

        let sender = match self.notify.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };

        if let Some(sender) = sender {
            if sender.send(event).await.is_err() {
                warn!("machine event subscriber went away");
            }
        }
    }

    async fn publish_state(&self, machine: &Machine) {
        self.publish(MachineEvent {
            service: machine.service.clone(),
            ip: machine.ip(),
            state: machine.state,
        })
        .await;
    }

    /// Builds the replica spec for one new instance of the function.
    async fn build_replica(&self, function: &Function) -> Result<Machine> {
        let deployment = &function.deployment;
        let target = &function.target;

        let request = ResourceSpec {
            vcpus: deployment
                .requests
                .as_ref()
                .and_then(|r| quantity::parse_cpu(&r.cpu))
                .unwrap_or(quantity::DEFAULT_VCPUS),
            memory_bytes: deployment
                .requests
                .as_ref()
                .and_then(|r| quantity::parse_memory(&r.memory))
                .unwrap_or(quantity::DEFAULT_MEMORY_BYTES),
        };
        let limit = ResourceSpec {
            vcpus: deployment
                .limits
                .as_ref()
                .and_then(|r| quantity::parse_cpu(&r.cpu))
                .unwrap_or(quantity::DEFAULT_VCPUS),
            memory_bytes: deployment
                .limits
                .as_ref()
                .and_then(|r| quantity::parse_memory(&r.memory))
                .unwrap_or(quantity::DEFAULT_MEMORY_BYTES),
        };

        let platform = target
            .platform
            .ok_or_else(|| Error::MissingPlatform(deployment.image.clone()))?;
        if !self.drivers.contains_key(&platform) {
            return Err(Error::UnsupportedPlatform(platform));
        }

        let uid = MachineId::random();
        let state_dir = self.machine_dir.join(uid.to_string());
        tokio::fs::create_dir_all(&state_dir).await?;

        let mut volumes = Vec::new();
        if target.kconfig.any_yes(AUTOMOUNT_OPTIONS) && target.initrd.is_some() {
            volumes.push(Volume {
                name: "fs0".to_string(),
                driver: "initrd".to_string(),
                destination: PathBuf::from("/"),
            });
        }

        let mut labels: BTreeMap<String, String> =
            deployment.labels.clone().unwrap_or_default();
        labels.insert(LABEL_SERVICE.to_string(), deployment.service.clone());
        labels.insert(LABEL_IMAGE.to_string(), deployment.image.clone());
        labels.insert(
            LABEL_NAMESPACE.to_string(),
            deployment.namespace().to_string(),
        );

        Ok(Machine {
            uid,
            name: format!("{}-{}", deployment.service, uid.short()),
            service: deployment.service.clone(),
            platform,
            architecture: target.architecture.clone(),
            kernel: target.kernel.clone(),
            initrd: target.initrd.clone(),
            command: target.command.clone(),
            volumes,
            resources: MachineResources { request, limit },
            labels,
            annotations: deployment.annotations.clone().unwrap_or_default(),
            state_dir,
            nic: None,
            state: MachineState::Created,
        })
    }

    /// Attaches the NIC and drives the platform driver through create/start.
    /// On failure the replica is left `Errored` with the NIC released.
    async fn boot(&self, machine: &mut Machine) -> Result<()> {
        let ifname = interface_name(&self.bridge_name, machine.uid);
        let addr = match self.bridge.attach_interface(&self.bridge_name, &ifname).await {
            Ok(addr) => addr,
            Err(error) => {
                machine.state = MachineState::Errored;
                return Err(error);
            }
        };
        machine.nic = Some(Nic {
            bridge: self.bridge_name.clone(),
            ifname: ifname.clone(),
            addr,
        });
        debug!(uid = %machine.uid, %ifname, %addr, "network device created");

        // Drivers were validated during replica construction.
        let driver = self
            .drivers
            .get(&machine.platform)
            .cloned()
            .ok_or(Error::UnsupportedPlatform(machine.platform))?;

        if let Err(error) = driver.create(machine).await {
            machine.state = MachineState::Errored;
            let _ = self.bridge.remove_interface(&ifname).await;
            return Err(error);
        }
        debug!(uid = %machine.uid, "machine created");

        if let Err(error) = driver.start(machine).await {
            machine.state = MachineState::Errored;
            let _ = self.bridge.remove_interface(&ifname).await;
            return Err(error);
        }

        machine.state = MachineState::Running;
        info!(uid = %machine.uid, service = %machine.service, "machine started");
        Ok(())
    }

    /// Builds and boots one replica; stores it and publishes the transition.
    /// A failed boot still publishes, so the reconciler can unregister any
    /// endpoint the service may carry for the address.
    async fn launch(&self, function: &Function) -> Result<()> {
        let mut machine = self.build_replica(function).await?;

        match self.boot(&mut machine).await {
            Ok(()) => {
                self.machines
                    .put_machine(&machine.service, machine.clone())?;
                self.publish_state(&machine).await;
                Ok(())
            }
            Err(error) => {
                warn!(uid = %machine.uid, service = %machine.service, %error, "machine boot failed");
                self.publish_state(&machine).await;
                let _ = tokio::fs::remove_dir_all(&machine.state_dir).await;
                Err(error)
            }
        }
    }

    /// Stops and deletes one replica. Stop and delete failures are logged
    /// and tolerated; a failed interface teardown is not.
    async fn teardown(&self, machine: &mut Machine) -> Result<()> {
        debug!(uid = %machine.uid, "machine destroy called");

        let driver = match self.drivers.get(&machine.platform).cloned() {
            Some(driver) => driver,
            None => {
                machine.state = MachineState::Errored;
                return Err(Error::UnsupportedPlatform(machine.platform));
            }
        };

        if let Err(error) = driver.stop(machine).await {
            warn!(uid = %machine.uid, %error, "error stopping machine");
        }

        if let Some(nic) = machine.nic.clone() {
            if let Err(error) = self.bridge.remove_interface(&nic.ifname).await {
                machine.state = MachineState::Errored;
                return Err(error);
            }
            debug!(uid = %machine.uid, ifname = %nic.ifname, "network device deleted");
        }

        if let Err(error) = driver.delete(machine).await {
            warn!(uid = %machine.uid, %error, "error deleting machine");
        }

        machine.state = MachineState::Exited;
        Ok(())
    }
}

#[async_trait]
impl MachineService for UnikernelMachineService {
    async fn notify(&self, events: mpsc::Sender<MachineEvent>) {
        if let Ok(mut guard) = self.notify.lock() {
            *guard = Some(events);
        }
    }

    async fn pull_image(&self, reference: &str) -> Result<ImageTarget> {
        info!(reference, "resolving image");

        let mut packages = self.images.catalogue(reference, CatalogueScope::Local).await?;
        if packages.is_empty() {
            debug!(reference, "not in local catalogue; querying remote");
            packages = self.images.catalogue(reference, CatalogueScope::Remote).await?;
        }

        let package = match packages.len() {
            0 => return Err(Error::ImageNotFound(reference.to_string())),
            1 => packages.remove(0),
            _ => return Err(Error::AmbiguousImage(reference.to_string())),
        };

        if !package.pulled {
            self.images.pull(&package).await?;
        }

        let state_dir = self.oci_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&state_dir).await?;

        match self.images.unpack(&package, &state_dir).await {
            Ok(target) => Ok(target),
            Err(error) => {
                let _ = tokio::fs::remove_dir_all(&state_dir).await;
                Err(error)
            }
        }
    }

    async fn deploy(&self, function: &Function) -> Result<()> {
        info!(service = %function.name(), "machine deployment requested");
        self.launch(function).await
    }

    async fn scale(&self, function: &Function, replicas: u64) -> Result<()> {
        let service = function.name();

        let current = match self.machines.active_replicas(service) {
            Ok(count) => count,
            // A service whose last replica retired has no row; that is zero.
            Err(ukfaas_store::Error::ServiceNotFound(_)) => 0,
            Err(error) => return Err(error.into()),
        };

        if current == replicas {
            return Ok(());
        }
        info!(service, current, want = replicas, "scaling");

        if current < replicas {
            for _ in current..replicas {
                self.launch(function).await?;
            }
        } else {
            for _ in replicas..current {
                let mut machine = self.machines.pop_machine(service)?;
                let result = self.teardown(&mut machine).await;
                self.publish_state(&machine).await;
                result?;
            }
        }

        Ok(())
    }

    async fn delete(&self, function: &Function) -> Result<()> {
        self.scale(function, 0).await
    }

    async fn replicas(&self, service: &str) -> Result<u64> {
        Ok(self.machines.active_replicas(service)?)
    }
}

/// Host-side interface name for a replica: bridge + `if` + UID, truncated
/// to IFNAMSIZ.
fn interface_name(bridge: &str, uid: MachineId) -> String {
    let mut name = format!("{bridge}if{}", uid.short());
    name.truncate(IFNAME_MAX);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBridge, MemoryImageStore, MemoryVmDriver, MonitorState};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;
    use ukfaas_store::MemoryMachineStore;
    use ukfaas_types::{FunctionDeployment, FunctionResources, KConfig, Platform};

    struct Fixture {
        service: UnikernelMachineService,
        store: Arc<MemoryMachineStore>,
        driver: Arc<MemoryVmDriver>,
        bridge: Arc<MemoryBridge>,
        events: mpsc::Receiver<MachineEvent>,
        _dirs: TempDir,
    }

    fn target(image: &str) -> ImageTarget {
        ImageTarget {
            image: image.to_string(),
            kernel: PathBuf::from("/tmp/kernel"),
            initrd: None,
            architecture: "x86_64".to_string(),
            platform: Some(Platform::Kvm),
            command: vec![],
            kconfig: KConfig::new(),
        }
    }

    fn function(service: &str, image: &str) -> Function {
        Function {
            deployment: FunctionDeployment {
                service: service.to_string(),
                image: image.to_string(),
                ..FunctionDeployment::default()
            },
            target: target(image),
        }
    }

    async fn fixture() -> Fixture {
        let dirs = TempDir::new().unwrap();
        let images = Arc::new(MemoryImageStore::new());
        images.register("ghcr.io/ex/echo:1", target("ghcr.io/ex/echo:1"));

        let store = Arc::new(MemoryMachineStore::new());
        let driver = Arc::new(MemoryVmDriver::new());
        let bridge = Arc::new(MemoryBridge::new());

        let service = UnikernelMachineService::builder(
            "openfaas0",
            "10.63.0.1/16".parse().unwrap(),
        )
        .image_store(images)
        .bridge(Arc::clone(&bridge) as Arc<dyn BridgeService>)
        .driver(Platform::Kvm, Arc::clone(&driver) as Arc<dyn VmDriver>)
        .machine_store(Arc::clone(&store) as Arc<dyn MachineStore>)
        .state_dirs(
            dirs.path().join("oci"),
            dirs.path().join("machines"),
        )
        .build()
        .await
        .unwrap();

        let (tx, events) = mpsc::channel(16);
        service.notify(tx).await;

        Fixture {
            service,
            store,
            driver,
            bridge,
            events,
            _dirs: dirs,
        }
    }

    #[tokio::test]
    async fn test_builder_creates_missing_bridge() {
        let fx = fixture().await;
        assert!(fx.service.bridge.exists("openfaas0").await.unwrap());
    }

    #[tokio::test]
    async fn test_deploy_boots_one_replica_and_publishes() {
        let mut fx = fixture().await;
        let function = function("echo", "ghcr.io/ex/echo:1");

        fx.service.deploy(&function).await.unwrap();

        assert_eq!(fx.service.replicas("echo").await.unwrap(), 1);
        assert_eq!(fx.driver.started_count(), 1);

        let event = fx.events.recv().await.unwrap();
        assert_eq!(event.service, "echo");
        assert_eq!(event.state, MachineState::Running);
        assert_eq!(event.ip, Some(Ipv4Addr::new(10, 63, 0, 2)));
    }

    #[tokio::test]
    async fn test_scale_up_and_down_drives_count() {
        let mut fx = fixture().await;
        let function = function("echo", "ghcr.io/ex/echo:1");

        fx.service.scale(&function, 3).await.unwrap();
        assert_eq!(fx.service.replicas("echo").await.unwrap(), 3);
        assert_eq!(fx.driver.started_count(), 3);
        assert_eq!(fx.bridge.interfaces().len(), 3);
        for _ in 0..3 {
            assert_eq!(fx.events.recv().await.unwrap().state, MachineState::Running);
        }

        fx.service.scale(&function, 1).await.unwrap();
        assert_eq!(fx.service.replicas("echo").await.unwrap(), 1);
        assert_eq!(fx.driver.started_count(), 1);
        assert_eq!(fx.bridge.interfaces().len(), 1);
        for _ in 0..2 {
            let event = fx.events.recv().await.unwrap();
            assert_eq!(event.state, MachineState::Exited);
            assert!(event.ip.is_some());
        }
    }

    #[tokio::test]
    async fn test_scale_to_current_is_noop() {
        let mut fx = fixture().await;
        let function = function("echo", "ghcr.io/ex/echo:1");

        fx.service.scale(&function, 2).await.unwrap();
        for _ in 0..2 {
            fx.events.recv().await.unwrap();
        }

        fx.service.scale(&function, 2).await.unwrap();
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_scales_to_zero() {
        let fx = fixture().await;
        let function = function("echo", "ghcr.io/ex/echo:1");

        fx.service.scale(&function, 2).await.unwrap();
        fx.service.delete(&function).await.unwrap();

        assert!(fx.service.replicas("echo").await.is_err());
        assert!(fx.store.list_machines("echo").unwrap().is_empty());
        assert!(fx.bridge.interfaces().is_empty());
    }

    #[tokio::test]
    async fn test_pull_image_requires_exactly_one_match() {
        let fx = fixture().await;

        let missing = fx.service.pull_image("ghcr.io/ex/missing:1").await;
        assert!(matches!(missing, Err(Error::ImageNotFound(_))));

        let images = MemoryImageStore::new();
        images.register("dup:1", target("dup:1"));
        images.register("dup:1", target("dup:1"));
        let dirs = TempDir::new().unwrap();
        let ambiguous_service = UnikernelMachineService::builder(
            "openfaas0",
            "10.63.0.1/16".parse().unwrap(),
        )
        .image_store(Arc::new(images))
        .bridge(Arc::new(MemoryBridge::new()))
        .driver(Platform::Kvm, Arc::new(MemoryVmDriver::new()))
        .machine_store(Arc::new(MemoryMachineStore::new()))
        .state_dirs(dirs.path().join("oci"), dirs.path().join("machines"))
        .build()
        .await
        .unwrap();

        let ambiguous = ambiguous_service.pull_image("dup:1").await;
        assert!(matches!(ambiguous, Err(Error::AmbiguousImage(_))));
    }

    #[tokio::test]
    async fn test_pull_image_falls_back_to_remote() {
        let images = MemoryImageStore::new();
        images.register_remote("ghcr.io/ex/far:1", target("ghcr.io/ex/far:1"));
        let dirs = TempDir::new().unwrap();
        let service = UnikernelMachineService::builder(
            "openfaas0",
            "10.63.0.1/16".parse().unwrap(),
        )
        .image_store(Arc::new(images))
        .bridge(Arc::new(MemoryBridge::new()))
        .driver(Platform::Kvm, Arc::new(MemoryVmDriver::new()))
        .machine_store(Arc::new(MemoryMachineStore::new()))
        .state_dirs(dirs.path().join("oci"), dirs.path().join("machines"))
        .build()
        .await
        .unwrap();

        let pulled = service.pull_image("ghcr.io/ex/far:1").await.unwrap();
        assert_eq!(pulled.image, "ghcr.io/ex/far:1");
    }

    #[tokio::test]
    async fn test_replica_resources_parse_laxly() {
        let fx = fixture().await;
        let mut function = function("echo", "ghcr.io/ex/echo:1");
        function.deployment.limits = Some(FunctionResources {
            cpu: "2".to_string(),
            memory: "512Mi".to_string(),
        });
        function.deployment.requests = Some(FunctionResources {
            cpu: "garbage".to_string(),
            memory: String::new(),
        });

        let replica = fx.service.build_replica(&function).await.unwrap();
        assert_eq!(replica.resources.limit.vcpus, 2);
        assert_eq!(replica.resources.limit.memory_bytes, 512 * 1024 * 1024);
        // Malformed requests fall back silently to the defaults.
        assert_eq!(replica.resources.request.vcpus, quantity::DEFAULT_VCPUS);
        assert_eq!(
            replica.resources.request.memory_bytes,
            quantity::DEFAULT_MEMORY_BYTES
        );
    }

    #[tokio::test]
    async fn test_automount_volume_attached_with_initrd() {
        let fx = fixture().await;
        let mut function = function("echo", "ghcr.io/ex/echo:1");
        function.target.initrd = Some(PathBuf::from("/tmp/initrd"));
        function
            .target
            .kconfig
            .set("CONFIG_LIBVFSCORE_AUTOMOUNT_UP", "y");

        let replica = fx.service.build_replica(&function).await.unwrap();
        assert_eq!(replica.volumes.len(), 1);
        assert_eq!(replica.volumes[0].driver, "initrd");
        assert_eq!(replica.volumes[0].destination, PathBuf::from("/"));
    }

    #[tokio::test]
    async fn test_replica_labels_stamped() {
        let fx = fixture().await;
        let function = function("echo", "ghcr.io/ex/echo:1");

        let replica = fx.service.build_replica(&function).await.unwrap();
        assert_eq!(replica.labels.get(LABEL_SERVICE).unwrap(), "echo");
        assert_eq!(replica.labels.get(LABEL_IMAGE).unwrap(), "ghcr.io/ex/echo:1");
        assert_eq!(replica.labels.get(LABEL_NAMESPACE).unwrap(), "openfaas-fn");
    }

    struct RefusingDriver;

    #[async_trait]
    impl VmDriver for RefusingDriver {
        async fn create(&self, _machine: &Machine) -> Result<()> {
            Err(Error::Driver("monitor refused".to_string()))
        }

        async fn start(&self, _machine: &Machine) -> Result<()> {
            Err(Error::Driver("monitor refused".to_string()))
        }

        async fn stop(&self, _machine: &Machine) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _machine: &Machine) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_boot_publishes_errored_event() {
        let dirs = TempDir::new().unwrap();
        let images = Arc::new(MemoryImageStore::new());
        images.register("ghcr.io/ex/echo:1", target("ghcr.io/ex/echo:1"));
        let store = Arc::new(MemoryMachineStore::new());
        let bridge = Arc::new(MemoryBridge::new());

        let service = UnikernelMachineService::builder(
            "openfaas0",
            "10.63.0.1/16".parse().unwrap(),
        )
        .image_store(images)
        .bridge(Arc::clone(&bridge) as Arc<dyn BridgeService>)
        .driver(Platform::Kvm, Arc::new(RefusingDriver))
        .machine_store(Arc::clone(&store) as Arc<dyn MachineStore>)
        .state_dirs(dirs.path().join("oci"), dirs.path().join("machines"))
        .build()
        .await
        .unwrap();

        let (tx, mut events) = mpsc::channel(4);
        service.notify(tx).await;

        let function = function("echo", "ghcr.io/ex/echo:1");
        assert!(service.deploy(&function).await.is_err());

        // The corpse never reaches the store, but the event still flows so
        // the reconciler can clean up.
        let event = events.recv().await.unwrap();
        assert_eq!(event.state, MachineState::Errored);
        assert!(store.list_machines("echo").unwrap().is_empty());
        // The NIC attached before the failure was released again.
        assert!(bridge.interfaces().is_empty());
    }

    #[tokio::test]
    async fn test_stop_failure_tolerated_on_teardown() {
        let mut fx = fixture().await;
        let function = function("echo", "ghcr.io/ex/echo:1");
        fx.service.deploy(&function).await.unwrap();
        fx.events.recv().await.unwrap();

        // Force the monitor into a state stop() rejects.
        let machine = &fx.store.list_machines("echo").unwrap()[0];
        fx.driver.stop(machine).await.unwrap();

        fx.service.scale(&function, 0).await.unwrap();
        let event = fx.events.recv().await.unwrap();
        assert_eq!(event.state, MachineState::Exited);
        assert_eq!(fx.driver.state(machine.uid), Some(MonitorState::Deleted));
    }

    #[test]
    fn test_interface_name_fits_ifnamsiz() {
        let uid = MachineId::random();
        let name = interface_name("openfaas0", uid);
        assert!(name.len() <= IFNAME_MAX);
        assert!(name.starts_with("openfaas0if"));
    }
}
