use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use http::StatusCode;
use http::header::HeaderValue;
use http::header::RETRY_AFTER;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;
use turnstile_limit::KeyedStrategy;
use turnstile_limit::Reason;

use crate::context::Request;
use crate::context::Response;
use crate::context::client_key;
use crate::context::plain_text;

pub(crate) const TOO_MANY_REQUESTS_BODY: &str = "Too many requests. Try again later.";

/// Rejects callers whose address has used up its current window.
///
/// Rejected requests get a `429` with a plaintext body and a `Retry-After`
/// header; the inner service is never called for them. There is no queue.
#[derive(Debug)]
pub struct AddressLimitService<L, S>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
}

impl<L, S> Clone for AddressLimitService<L, S>
where
    L: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

pin_project! {
    /// Either the inner service's future or an immediate rejection.
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F> {
        Admitted {
            #[pin]
            inner: F,
        },
        Rejected {
            response: Option<Response>,
        },
    }
}

impl<F> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response, BoxError>>,
{
    type Output = Result<Response, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Admitted { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { response } => Poll::Ready(
                response
                    .take()
                    .ok_or_else(|| BoxError::from("rejection polled after completion")),
            ),
        }
    }
}

impl<L, S> Service<Request> for AddressLimitService<L, S>
where
    L: KeyedStrategy + ?Sized + Send + Sync + 'static,
    S: Service<Request, Response = Response, Error = BoxError>,
{
    type Response = Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The partition depends on the request, so admission waits for call().
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let key = client_key(&req);

        match self.limiter.process(&key) {
            ControlFlow::Continue(()) => ResponseFuture::Admitted {
                inner: self.inner.call(req),
            },
            ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                tracing::debug!(
                    client = %key,
                    path = req.uri().path(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "address rate limit exceeded"
                );
                ResponseFuture::Rejected {
                    response: Some(too_many_requests(retry_after)),
                }
            }
        }
    }
}

impl<L, S> AddressLimitService<L, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>) -> Self {
        Self { inner, limiter }
    }
}

fn too_many_requests(retry_after: Duration) -> Response {
    let mut response = plain_text(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_BODY);
    let secs = retry_after.as_millis().div_ceil(1000).max(1) as u64;
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(secs));
    response
}
