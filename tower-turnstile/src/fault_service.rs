use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;

use crate::context::Request;
use crate::context::Response;
use crate::error::FailureKind;

/// The boundary past which no error travels.
///
/// Errors from the inner service, whether raised by `poll_ready` or by the
/// response future, are classified with [`FailureKind`], logged with their
/// detail and replaced by the generic JSON response for their class. This
/// service itself never returns `Err`.
#[derive(Debug)]
pub struct FaultIsolationService<S> {
    pub(crate) inner: S,
    pub(crate) pending_failure: Option<BoxError>,
}

// A readiness failure belongs to the clone that observed it.
impl<S: Clone> Clone for FaultIsolationService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            pending_failure: None,
        }
    }
}

pin_project! {
    #[project = FaultFutureProj]
    pub enum FaultFuture<F> {
        Running {
            #[pin]
            inner: F,
            path: String,
        },
        Failed {
            response: Option<Response>,
        },
    }
}

impl<F> Future for FaultFuture<F>
where
    F: Future<Output = Result<Response, BoxError>>,
{
    type Output = Result<Response, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            FaultFutureProj::Running { inner, path } => match inner.poll(cx) {
                Poll::Ready(Ok(response)) => Poll::Ready(Ok(response)),
                Poll::Ready(Err(err)) => Poll::Ready(Ok(isolate(&err, path.as_str()))),
                Poll::Pending => Poll::Pending,
            },
            FaultFutureProj::Failed { response } => Poll::Ready(Ok(response
                .take()
                .unwrap_or_else(|| FailureKind::Unexpected.into_response()))),
        }
    }
}

impl<S> Service<Request> for FaultIsolationService<S>
where
    S: Service<Request, Response = Response, Error = BoxError>,
{
    type Response = Response;
    type Error = BoxError;
    type Future = FaultFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.pending_failure.is_some() {
            return Poll::Ready(Ok(()));
        }
        match self.inner.poll_ready(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(err)) => {
                // Pretend we are ready, so call() gets invoked and can answer
                // with a classified response.
                self.pending_failure = Some(err);
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let path = req.uri().path().to_string();
        match self.pending_failure.take() {
            Some(err) => FaultFuture::Failed {
                response: Some(isolate(&err, &path)),
            },
            None => FaultFuture::Running {
                inner: self.inner.call(req),
                path,
            },
        }
    }
}

fn isolate(err: &BoxError, path: &str) -> Response {
    let kind = FailureKind::classify(&**err);
    let status = kind.status().as_u16();

    if kind.is_client_error() {
        tracing::warn!(path, status, error = %err, "request failed");
    } else {
        tracing::error!(path, status, error = %err, "unhandled failure");
    }

    kind.into_response()
}
