use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::ClientAddr;
use crate::Pipeline;

/// Largest request body buffered before it enters the pipeline.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// An Axum handler that drives each request through a [`Pipeline`].
///
/// Mount it as a fallback with the pipeline as state, and serve the router
/// with `into_make_service_with_connect_info::<SocketAddr>()` so the caller
/// address reaches the address limiter.
pub async fn serve_pipeline(
    State(pipeline): State<Pipeline>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large.").into_response();
        }
    };

    let mut request = http::Request::from_parts(parts, bytes);
    request.extensions_mut().insert(ClientAddr(addr));

    pipeline.handle(request).await.map(Body::from)
}
