//! HTTP handlers: latest report, health check, endpoint hint.

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::Response;
use tracing::error;

use crate::state::{SharedState, current};

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
    response
}

pub(crate) async fn handle_metadata(State(state): State<SharedState>) -> Response {
    let report = current(&state);
    match serde_json::to_vec_pretty(report.as_ref()) {
        Ok(body) => response(StatusCode::OK, "application/json", body),
        Err(e) => {
            error!(error = %e, "cannot serialize report");
            response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json",
                r#"{"error":"cannot serialize report"}"#,
            )
        }
    }
}

pub(crate) async fn handle_healthz() -> Response {
    response(StatusCode::OK, "text/plain", "ok\n")
}

pub(crate) async fn handle_not_found() -> Response {
    let body = serde_json::json!({
        "error": "Not found",
        "endpoints": ["/metadata", "/healthz"],
    });
    response(StatusCode::NOT_FOUND, "application/json", body.to_string())
}
