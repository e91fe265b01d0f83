use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::Error;

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidAmount(_)
        | Error::SameAccount(_)
        | Error::InsufficientFunds { .. }
        | Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        Error::UnknownAccount(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::DuplicateAccount(_) => StatusCode::CONFLICT,
        Error::IO(_) | Error::Csv(_) | Error::Ingestion(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_to_response(err: Error) -> Response {
    json_error(status_for(&err), err.to_string())
}

pub fn json_error(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}
