//! System verbs of the provider API.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::{info, warn};

use ukfaas_types::{
    DEFAULT_FUNCTION_NAMESPACE, DeleteFunctionRequest, FunctionDeployment, ScaleServiceRequest,
};

use crate::routes::error_response;
use crate::state::AppState;

/// Decodes a JSON request body; an empty or malformed body is a 400.
fn decode<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "expected a body").into_response());
    }

    serde_json::from_slice(body).map_err(|error| {
        warn!(%error, "error parsing input");
        (StatusCode::BAD_REQUEST, error.to_string()).into_response()
    })
}

/// Deploys a new function.
///
/// POST /system/functions
pub async fn deploy(State(state): State<AppState>, body: Bytes) -> Response {
    let req: FunctionDeployment = match decode(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    info!(service = %req.service, image = %req.image, "deploy request");

    match state.manager.deploy(req).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(%error, "deploy failed");
            error_response(&error)
        }
    }
}

/// Replaces a function's spec.
///
/// PUT /system/functions
pub async fn update(State(state): State<AppState>, body: Bytes) -> Response {
    let req: FunctionDeployment = match decode(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    info!(service = %req.service, image = %req.image, "update request");

    match state.manager.update(req).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(%error, "update failed");
            error_response(&error)
        }
    }
}

/// Removes a function entirely.
///
/// DELETE /system/functions
pub async fn delete(State(state): State<AppState>, body: Bytes) -> Response {
    let req: DeleteFunctionRequest = match decode(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    info!(service = %req.function_name, "delete request");

    match state.manager.delete(req).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(%error, "delete failed");
            error_response(&error)
        }
    }
}

/// Lists every deployed function with replica counts.
///
/// GET /system/functions
pub async fn list(State(state): State<AppState>) -> Response {
    match state.manager.list().await {
        Ok(functions) => (StatusCode::OK, Json(functions)).into_response(),
        Err(error) => {
            warn!(%error, "list failed");
            error_response(&error)
        }
    }
}

/// Status of a single function.
///
/// GET /system/function/{name}
pub async fn status(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.manager.status(&name).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// Adjusts a function's replica count.
///
/// POST /system/scale-function/{name}
pub async fn scale(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let req: ScaleServiceRequest = match decode(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    info!(service = %name, replicas = req.replicas, "scale request");

    match state.manager.scale(req).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => {
            warn!(%error, "scale failed");
            error_response(&error)
        }
    }
}

/// Liveness: 200 with an empty body.
///
/// GET /healthz
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Provider identity and release metadata.
///
/// GET /system/info
pub async fn info(State(state): State<AppState>) -> Response {
    let body = json!({
        "provider": "ukfaas",
        "orchestration": "unikernel",
        "version": state.version,
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// The namespaces functions can live in.
///
/// GET /system/namespaces
pub async fn namespaces() -> Response {
    (StatusCode::OK, Json(vec![DEFAULT_FUNCTION_NAMESPACE])).into_response()
}

/// Secret management is not implemented; report none.
///
/// GET /system/secrets
pub async fn secrets() -> Response {
    (StatusCode::OK, Json(Vec::<String>::new())).into_response()
}

/// Log streaming is not implemented; report nothing.
///
/// GET /system/logs
pub async fn logs() -> StatusCode {
    StatusCode::OK
}
