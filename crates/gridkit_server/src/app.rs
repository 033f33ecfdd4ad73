//! axum router wiring for the download endpoint.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use gridkit_io_xlsx::RenderDispatcher;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::handler::{C_MSG_RENDER_FAILED, SpecHttpResponse, handle_download_bytes};

pub const C_ROUTE_DOWNLOAD_EXCEL: &str = "/download-excel";

/// Build the service router. Oversized bodies are rejected with 413 before
/// any parsing happens.
pub fn build_router(dispatcher: Arc<RenderDispatcher>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route(C_ROUTE_DOWNLOAD_EXCEL, post(download_excel))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

async fn download_excel(
    State(dispatcher): State<Arc<RenderDispatcher>>,
    body: Bytes,
) -> Response {
    into_axum_response(handle_download_bytes(&dispatcher, &body).await)
}

fn into_axum_response(resp: SpecHttpResponse) -> Response {
    let mut builder = axum::http::Response::builder().status(resp.status);
    for (key, value) in &resp.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder.body(Body::from(resp.body)).unwrap_or_else(|e| {
        error!(error = %e, "Failed to assemble HTTP response");
        (StatusCode::INTERNAL_SERVER_ERROR, C_MSG_RENDER_FAILED).into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_into_axum_response_keeps_status_and_headers() {
        let resp = into_axum_response(SpecHttpResponse {
            status: 400,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: b"Invalid data: nope".to_vec(),
        });

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(b"text/plain".as_slice())
        );
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let resp = into_axum_response(SpecHttpResponse {
            status: 200,
            headers: vec![("Bad Header".to_string(), "x".to_string())],
            body: Vec::new(),
        });

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
