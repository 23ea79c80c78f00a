use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Error body for the synchronous billing endpoints; `error` carries the
/// machine-readable code clients branch on (`InvalidSignature`,
/// `NoSubscriptionToSync`, ...).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: code.to_string(),
        }),
    )
        .into_response()
}
