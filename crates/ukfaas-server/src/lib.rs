//! HTTP provider surface for ukfaas.
//!
//! Binds the coordinator's verbs to the FaaS provider API consumed by the
//! upstream gateway: system verbs under `/system/*`, the transparent
//! function proxy under `/function/*`, health and info. Namespace, secret
//! and log endpoints are stubs.

mod bootstrap;
pub mod routes;
mod state;

pub use bootstrap::prepare_working_dir;
pub use state::{AppState, VersionInfo};

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::routing::{any, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builds the provider router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/system/functions",
            get(routes::system::list)
                .post(routes::system::deploy)
                .put(routes::system::update)
                .delete(routes::system::delete),
        )
        .route("/system/function/{name}", get(routes::system::status))
        .route("/system/scale-function/{name}", post(routes::system::scale))
        .route("/function/{name}", any(routes::proxy::invoke_root))
        .route("/function/{name}/{*path}", any(routes::proxy::invoke_path))
        .route("/healthz", get(routes::system::health))
        .route("/system/info", get(routes::system::info))
        .route("/system/namespaces", get(routes::system::namespaces))
        .route("/system/secrets", get(routes::system::secrets))
        .route("/system/logs", get(routes::system::logs))
        .with_state(state)
}

/// Serves the provider until the cancellation token fires.
pub async fn serve(state: AppState, port: u16, cancel: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("provider listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}
