//! The coordinator: foreground FaaS verbs plus the two event loops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use ukfaas_machine::MachineService;
use ukfaas_net::NetworkService;
use ukfaas_store::FunctionStore;
use ukfaas_types::{
    DEFAULT_FUNCTION_NAMESPACE, DeleteFunctionRequest, Function, FunctionDeployment,
    FunctionStatus, MachineEvent, NetworkEvent, ScaleServiceRequest,
};

use crate::probe::ReadinessProbe;
use crate::{Error, Result};

/// First delay of the readiness poll.
const READINESS_BACKOFF_INITIAL: Duration = Duration::from_millis(25);

/// Ceiling of the readiness backoff. The overall deadline comes from the
/// invoking context, not from here.
const READINESS_BACKOFF_MAX: Duration = Duration::from_millis(1600);

/// The FaaS provider verbs.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Registers a new function and creates its first replica.
    async fn deploy(&self, req: FunctionDeployment) -> Result<()>;

    /// Scales the function to zero, removes its virtual service and drops
    /// the function row.
    async fn delete(&self, req: DeleteFunctionRequest) -> Result<()>;

    /// Replaces the stored spec; replicas churn only when the image or
    /// runtime parameters changed.
    async fn update(&self, req: FunctionDeployment) -> Result<()>;

    /// Status of every stored function.
    async fn list(&self) -> Result<Vec<FunctionStatus>>;

    /// Status of one function.
    async fn status(&self, service: &str) -> Result<FunctionStatus>;

    /// Drives the function to the requested replica count.
    async fn scale(&self, req: ScaleServiceRequest) -> Result<()>;

    /// Resolves a function name to its frontend URL, scaling from zero and
    /// waiting for readiness when the pool is idle.
    async fn invoke(&self, name: &str) -> Result<Url>;
}

/// The production [`Manager`].
pub struct Coordinator {
    machines: Arc<dyn MachineService>,
    network: Arc<dyn NetworkService>,
    functions: Arc<dyn FunctionStore>,
    probe: Arc<dyn ReadinessProbe>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Wires the coordinator to its services and starts the two event
    /// loops. The loops run until the cancellation token fires.
    pub async fn start(
        machines: Arc<dyn MachineService>,
        network: Arc<dyn NetworkService>,
        functions: Arc<dyn FunctionStore>,
        probe: Arc<dyn ReadinessProbe>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (machine_tx, machine_rx) = mpsc::channel(1);
        machines.notify(machine_tx).await;

        let (network_tx, network_rx) = mpsc::channel(1);
        network.notify(network_tx).await;

        tokio::spawn(machine_event_loop(
            Arc::clone(&network),
            machine_rx,
            cancel.clone(),
        ));
        tokio::spawn(network_event_loop(network_rx, cancel.clone()));

        Arc::new(Self {
            machines,
            network,
            functions,
            probe,
            cancel,
        })
    }

    fn get_function(&self, service: &str) -> Result<Function> {
        self.functions
            .get_function(service)
            .map_err(|_| Error::FunctionNotFound(service.to_string()))
    }

    async fn project_status(&self, function: &Function) -> FunctionStatus {
        let deployment = &function.deployment;
        let replicas = self
            .machines
            .replicas(deployment.service.as_str())
            .await
            .unwrap_or(0);

        FunctionStatus {
            name: deployment.service.clone(),
            image: deployment.image.clone(),
            namespace: deployment.namespace().to_string(),
            env_process: deployment.env_process.clone(),
            env_vars: deployment.env_vars.clone(),
            constraints: deployment.constraints.clone(),
            secrets: deployment.secrets.clone(),
            labels: deployment.labels.clone(),
            annotations: deployment.annotations.clone(),
            limits: deployment.limits.clone(),
            requests: deployment.requests.clone(),
            read_only_root_filesystem: deployment.read_only_root_filesystem,
            replicas,
            available_replicas: replicas,
        }
    }

    /// Polls the frontend with bounded exponential backoff until it answers
    /// or the coordinator shuts down. The caller imposes the overall
    /// deadline.
    async fn await_ready(&self, service: &str, endpoint: &Url) -> Result<()> {
        let mut backoff = READINESS_BACKOFF_INITIAL;

        loop {
            if self.probe.ready(endpoint).await {
                return Ok(());
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(Error::ReadinessAborted(service.to_string()));
                }
                () = tokio::time::sleep(backoff) => {}
            }

            backoff = (backoff * 2).min(READINESS_BACKOFF_MAX);
        }
    }
}

#[async_trait]
impl Manager for Coordinator {
    async fn deploy(&self, req: FunctionDeployment) -> Result<()> {
        let service = req.service.clone();
        if self.functions.get_function(&service).is_ok() {
            return Err(Error::AlreadyExists(service));
        }

        let target = self.machines.pull_image(&req.image).await?;
        let function = Function {
            deployment: req,
            target,
        };

        self.functions.put_function(&service, function.clone())?;
        info!(%service, "function registered");

        self.machines.deploy(&function).await?;
        Ok(())
    }

    async fn delete(&self, req: DeleteFunctionRequest) -> Result<()> {
        let service = req.function_name;
        let function = self.get_function(&service)?;

        self.machines.delete(&function).await?;

        match self.network.delete_service(&service).await {
            Ok(()) => {}
            // A function whose replicas never reached Running has no
            // virtual service; there is nothing left to remove.
            Err(ukfaas_net::Error::ServiceNotFound(_)) => {
                debug!(%service, "no virtual service to delete");
            }
            Err(error) => return Err(error.into()),
        }

        self.functions.delete_function(&service)?;
        info!(%service, "function deleted");
        Ok(())
    }

    async fn update(&self, req: FunctionDeployment) -> Result<()> {
        let service = req.service.clone();
        let old = self.get_function(&service)?;

        let image_changed = old.deployment.image != req.image;
        let parameters_changed = old.deployment.env_process != req.env_process
            || old.deployment.limits != req.limits
            || old.deployment.requests != req.requests;

        let mut updated = Function {
            deployment: req,
            target: old.target.clone(),
        };
        if image_changed {
            let image = updated.deployment.image.clone();
            updated.target = self.machines.pull_image(&image).await?;
        }

        if image_changed || parameters_changed {
            self.functions.put_function(&service, updated.clone())?;

            // Replace the whole pool at its present size.
            let current = self.machines.replicas(&service).await.unwrap_or(0).max(1);
            info!(%service, image_changed, replicas = current, "replacing replicas for update");
            self.machines.delete(&old).await?;
            self.machines.scale(&updated, current).await?;
        } else if updated.deployment != old.deployment {
            // Only labels/annotations/env changed; no replica churn.
            self.functions.put_function(&service, updated)?;
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<FunctionStatus>> {
        let functions = self.functions.list_functions()?;

        let mut statuses = Vec::with_capacity(functions.len());
        for function in &functions {
            statuses.push(self.project_status(function).await);
        }
        Ok(statuses)
    }

    async fn status(&self, service: &str) -> Result<FunctionStatus> {
        let function = self.get_function(service)?;
        Ok(self.project_status(&function).await)
    }

    async fn scale(&self, req: ScaleServiceRequest) -> Result<()> {
        let function = self.get_function(&req.service_name)?;
        Ok(self.machines.scale(&function, req.replicas).await?)
    }

    async fn invoke(&self, name: &str) -> Result<Url> {
        let suffix = format!(".{DEFAULT_FUNCTION_NAMESPACE}");
        let service = name.strip_suffix(suffix.as_str()).unwrap_or(name);

        let frontend = self.network.resolve(service).await?;
        let endpoint = Url::parse(&format!("http://{frontend}"))?;

        let replicas = self.machines.replicas(service).await.unwrap_or(0);
        if replicas == 0 {
            let function = self.get_function(service)?;
            info!(service, "scaling from zero");
            self.machines.scale(&function, 1).await?;
            self.await_ready(service, &endpoint).await?;
        }

        Ok(endpoint)
    }
}

/// The reconciler: drives load-balancer membership from replica
/// transitions. Errors are logged and dropped; the next user-driven verb is
/// authoritative.
async fn machine_event_loop(
    network: Arc<dyn NetworkService>,
    mut events: mpsc::Receiver<MachineEvent>,
    cancel: CancellationToken,
) {
    info!("listening for machine events");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            maybe = events.recv() => {
                let Some(event) = maybe else { break };
                debug!(
                    service = %event.service,
                    ip = ?event.ip,
                    state = %event.state,
                    "machine event received",
                );
                if let Err(err) = reconcile(network.as_ref(), &event).await {
                    error!(service = %event.service, error = %err, "reconciliation failed");
                }
            }
        }
    }

    info!("machine event loop shut down");
}

async fn reconcile(network: &dyn NetworkService, event: &MachineEvent) -> ukfaas_net::Result<()> {
    let active = event.state.is_active();

    let exists = match network.resolve(&event.service).await {
        Ok(_) => true,
        Err(ukfaas_net::Error::ServiceNotFound(_)) => false,
        // A transport failure is not "no virtual service": skip the event
        // rather than create a duplicate frontend.
        Err(error) => return Err(error),
    };

    match (active, exists, event.ip) {
        (true, false, Some(ip)) => network.new_service(&event.service, ip).await,
        (true, true, Some(ip)) => network.add_service_endpoint(&event.service, ip).await,
        (false, true, Some(ip)) => network.delete_service_endpoint(&event.service, ip).await,
        (false, false, _) => Ok(()),
        (_, _, None) => {
            debug!(service = %event.service, "machine event without address");
            Ok(())
        }
    }
}

/// Informational: logs the network service's own view of membership.
async fn network_event_loop(mut events: mpsc::Receiver<NetworkEvent>, cancel: CancellationToken) {
    info!("listening for network events");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            maybe = events.recv() => {
                let Some(event) = maybe else { break };
                info!(
                    service = %event.service,
                    vip = %event.vip,
                    backend = ?event.backend,
                    "network event: {}",
                    event.kind,
                );
            }
        }
    }

    info!("network event loop shut down");
}
