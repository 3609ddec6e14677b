use std::net::SocketAddr;

use bytes::Bytes;
use http::HeaderName;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use http::header::HeaderValue;

/// A request flowing through the pipeline.
pub type Request = http::Request<Bytes>;

/// The response produced for a [`Request`].
pub type Response = http::Response<Bytes>;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Header reporting the successful calls left in today's quota.
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// Partition used when a request carries no [`ClientAddr`].
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The remote address of the caller.
///
/// Hosts insert this into the request extensions; the address limiter
/// partitions callers by its IP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// The key the address limiter partitions `request` under.
pub fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ClientAddr>()
        .map(|ClientAddr(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub(crate) fn response_with(status: StatusCode, body: Bytes) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

pub(crate) fn plain_text(status: StatusCode, body: &'static str) -> Response {
    let mut response = response_with(status, Bytes::from_static(body.as_bytes()));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
