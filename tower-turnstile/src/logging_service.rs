use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use pin_project_lite::pin_project;
use tokio::time::Instant;
use tower::BoxError;
use tower::Service;

use crate::context::Request;
use crate::context::Response;

#[derive(Clone, Debug)]
struct LoggingServiceMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
}

/// Logs a start event before the inner service runs and a finish event,
/// with status and latency, once it returns.
///
/// Responses and errors pass through untouched.
#[derive(Clone, Debug)]
pub struct LoggingService<S> {
    inner: S,
    instruments: LoggingServiceMetrics,
}

pin_project! {
    /// Wraps the inner future and logs its outcome.
    pub struct LoggingFuture<F> {
        #[pin]
        inner: F,
        path: String,
        start: Instant,
        instruments: LoggingServiceMetrics,
    }
}

impl<F> Future for LoggingFuture<F>
where
    F: Future<Output = Result<Response, BoxError>>,
{
    type Output = Result<Response, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = match this.inner.poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let elapsed = this.start.elapsed();
        let status = match &result {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::info!(
                    path = %this.path,
                    status,
                    latency_ms = elapsed.as_secs_f64() * 1000.0,
                    "request finished"
                );
                i64::from(status)
            }
            Err(err) => {
                tracing::error!(
                    path = %this.path,
                    error = %err,
                    latency_ms = elapsed.as_secs_f64() * 1000.0,
                    "request failed without a response"
                );
                0
            }
        };

        let attributes = [KeyValue::new("status", status)];
        this.instruments.requests.add(1, &attributes);
        this.instruments
            .duration
            .record(elapsed.as_secs_f64(), &attributes);

        Poll::Ready(result)
    }
}

impl<S> Service<Request> for LoggingService<S>
where
    S: Service<Request, Response = Response, Error = BoxError>,
{
    type Response = Response;
    type Error = BoxError;
    type Future = LoggingFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let path = req.uri().path().to_string();
        tracing::info!(method = %req.method(), path = %path, "request started");

        LoggingFuture {
            inner: self.inner.call(req),
            path,
            start: Instant::now(),
            instruments: self.instruments.clone(),
        }
    }
}

impl<S> LoggingService<S> {
    pub fn new(inner: S) -> Self {
        let meter = global::meter("request_pipeline");
        let instruments = LoggingServiceMetrics {
            requests: meter.u64_counter("pipeline_requests").build(),
            duration: meter
                .f64_histogram("pipeline_request_duration")
                .with_unit("s")
                .build(),
        };

        Self { inner, instruments }
    }
}
