use tower::Layer;

use crate::fault_service::FaultIsolationService;

/// Converts failures from the wrapped stack into classified responses.
#[derive(Clone, Debug, Default)]
pub struct FaultIsolationLayer;

impl FaultIsolationLayer {
    pub fn new() -> Self {
        FaultIsolationLayer
    }
}

impl<S> Layer<S> for FaultIsolationLayer {
    type Service = FaultIsolationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FaultIsolationService {
            inner,
            pending_failure: None,
        }
    }
}
