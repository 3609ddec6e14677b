use tower::Layer;

use crate::logging_service::LoggingService;

/// Records the start and finish of every request.
#[derive(Clone, Debug, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub fn new() -> Self {
        LoggingLayer
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService::new(inner)
    }
}
