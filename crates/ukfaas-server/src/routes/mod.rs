//! Provider route handlers.

pub mod proxy;
pub mod system;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ukfaas_manager::{Error, ErrorKind};

/// Maps a coordinator error onto the provider's HTTP taxonomy: plain-text
/// body, status by error kind. Conflicts are reported as 400 with the
/// descriptive message.
pub(crate) fn error_response(error: &Error) -> Response {
    let status = match error.kind() {
        ErrorKind::BadRequest | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string()).into_response()
}
