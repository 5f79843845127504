//! `ukfaasd up`: wire the subsystems and serve the provider.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ukfaas_config::ConfigLoader;
use ukfaas_machine::memory::{MemoryBridge, MemoryImageStore, MemoryVmDriver};
use ukfaas_machine::{BridgeService, ImageStore, MachineService, UnikernelMachineService, VmDriver};
use ukfaas_manager::{Coordinator, HttpReadinessProbe};
use ukfaas_net::{
    LoadBalancer, MemoryLoadBalancer, NetworkService, PingProbe, VipNetworkService,
};
use ukfaas_store::{
    EndpointStore, FunctionStore, MachineStore, MemoryEndpointStore, MemoryFunctionStore,
    MemoryMachineStore,
};
use ukfaas_types::{ImageTarget, Platform};

use super::version::version_info;

pub async fn run(
    working_dir: Option<PathBuf>,
    port: Option<u16>,
    images: Option<PathBuf>,
) -> Result<()> {
    let working_dir = match working_dir {
        Some(dir) => dir,
        None => env::current_dir().context("cannot determine working directory")?,
    };

    let mut config = ConfigLoader::new()
        .with_working_dir(&working_dir)
        .load()
        .context("loading configuration")?;
    if let Some(port) = port {
        config.provider.port = port;
    }

    ukfaas_server::prepare_working_dir(&working_dir).context("preparing working directory")?;

    let cancel = CancellationToken::new();

    // Storage.
    let functions = Arc::new(MemoryFunctionStore::new());
    let machine_rows = Arc::new(MemoryMachineStore::new());
    let endpoints = Arc::new(MemoryEndpointStore::new());

    // Network: in-process virtual-server table; kernel-backed tables plug
    // in behind the same LoadBalancer contract.
    let network = Arc::new(
        VipNetworkService::builder(config.network.service_subnet)
            .balancer(Arc::new(MemoryLoadBalancer::new()) as Arc<dyn LoadBalancer>)
            .endpoint_store(endpoints as Arc<dyn EndpointStore>)
            .probe(Arc::new(PingProbe))
            .port(config.network.watchdog_port)
            .cancel(cancel.clone())
            .build()
            .context("initialising network service")?,
    );

    // Machines: catalogue preloaded from --images; drivers and bridge are
    // the in-process implementations behind the VmDriver/BridgeService
    // contracts.
    let catalogue = Arc::new(MemoryImageStore::new());
    if let Some(path) = images {
        let count = preload_catalogue(&catalogue, &path)
            .with_context(|| format!("loading image catalogue {}", path.display()))?;
        info!(count, path = %path.display(), "image catalogue preloaded");
    }

    let driver = Arc::new(MemoryVmDriver::new());
    let machines = Arc::new(
        UnikernelMachineService::builder(&config.network.bridge_name, config.network.bridge_gateway)
            .image_store(Arc::clone(&catalogue) as Arc<dyn ImageStore>)
            .bridge(Arc::new(MemoryBridge::new()) as Arc<dyn BridgeService>)
            .driver(Platform::Kvm, Arc::clone(&driver) as Arc<dyn VmDriver>)
            .driver(Platform::Firecracker, driver as Arc<dyn VmDriver>)
            .machine_store(Arc::clone(&machine_rows) as Arc<dyn MachineStore>)
            .state_dirs(config.paths.oci_dir.clone(), config.paths.machine_dir.clone())
            .cancel(cancel.clone())
            .build()
            .await
            .context("initialising machine service")?,
    );

    // The coordinator ties the two together through their event ports.
    let manager = Coordinator::start(
        machines as Arc<dyn MachineService>,
        network as Arc<dyn NetworkService>,
        functions as Arc<dyn FunctionStore>,
        Arc::new(HttpReadinessProbe::new()),
        cancel.clone(),
    )
    .await;

    let state = ukfaas_server::AppState::new(
        manager,
        version_info(),
        config.provider.write_timeout(),
    );

    // Ctrl+C stops the provider and the event loops.
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shutdown.cancel();
        }
    });

    info!(
        port = config.provider.port,
        write_timeout = config.provider.write_timeout_secs,
        "ukfaas provider starting",
    );
    if let Err(err) = ukfaas_server::serve(state, config.provider.port, cancel.clone()).await {
        error!(error = %err, "provider exited");
        return Err(err);
    }

    Ok(())
}

/// Reads a JSON map of image reference → target into the catalogue.
fn preload_catalogue(catalogue: &MemoryImageStore, path: &PathBuf) -> Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let targets: HashMap<String, ImageTarget> = serde_json::from_str(&raw)?;

    let count = targets.len();
    for (reference, target) in targets {
        catalogue.register(&reference, target);
    }
    Ok(count)
}
