//! Error response shaping: a small envelope plus status-code helpers
//! so handlers never build a `Response` by hand.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

pub type HttpResponse = Response;

fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> HttpResponse {
    (
        status,
        Json(ErrorEnvelope {
            code: code.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn internal_error(err: impl std::fmt::Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_sets_400() {
        let response = bad_request("bad hours param");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
