//! Transparent function proxy.
//!
//! `/function/{name}[/...]` resolves the function through the invoke
//! resolver (scaling from zero when the pool is idle) and forwards the
//! request to the virtual IP. The provider's write timeout is the outer
//! deadline on resolution, covering the readiness wait.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};
use url::Url;

use crate::routes::error_response;
use crate::state::AppState;

/// ANY /function/{name}
pub async fn invoke_root(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(state, name, String::new(), method, headers, body).await
}

/// ANY /function/{name}/{*path}
pub async fn invoke_path(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(state, name, path, method, headers, body).await
}

async fn forward(
    state: AppState,
    name: String,
    path: String,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let resolved = tokio::time::timeout(state.invoke_timeout, state.manager.invoke(&name)).await;

    let endpoint = match resolved {
        Ok(Ok(endpoint)) => endpoint,
        Ok(Err(error)) => {
            warn!(function = %name, %error, "invoke resolution failed");
            return error_response(&error);
        }
        Err(_) => {
            warn!(function = %name, "function did not become ready in time");
            return (StatusCode::GATEWAY_TIMEOUT, "function not ready").into_response();
        }
    };

    let target = match join_path(&endpoint, &path) {
        Ok(target) => target,
        Err(error) => {
            warn!(function = %name, %error, "bad upstream path");
            return (StatusCode::BAD_REQUEST, "bad function path").into_response();
        }
    };
    debug!(function = %name, %target, "proxying");

    let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut request = state.client.request(upstream_method, target).body(body);
    if let Some(content_type) = headers.get(axum::http::header::CONTENT_TYPE) {
        if let Ok(value) = content_type.to_str() {
            request = request.header(reqwest::header::CONTENT_TYPE, value);
        }
    }

    match request.send().await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            match upstream.bytes().await {
                Ok(bytes) => (status, bytes).into_response(),
                Err(error) => {
                    warn!(function = %name, %error, "error reading upstream body");
                    StatusCode::BAD_GATEWAY.into_response()
                }
            }
        }
        Err(error) => {
            warn!(function = %name, %error, "error reaching function backend");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

fn join_path(endpoint: &Url, path: &str) -> Result<Url, url::ParseError> {
    if path.is_empty() {
        Ok(endpoint.clone())
    } else {
        endpoint.join(path)
    }
}
