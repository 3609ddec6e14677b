use std::sync::Arc;

use tower::Layer;
use turnstile_limit::KeyedStrategy;

use crate::service::AddressLimitService;

/// Applies a per caller address admission check to requests.
#[derive(Debug)]
pub struct AddressLimitLayer<L>
where
    L: ?Sized,
{
    limiter: Arc<L>,
}

impl<L> Clone for AddressLimitLayer<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<L> AddressLimitLayer<L>
where
    L: KeyedStrategy + ?Sized,
{
    /// Create an AddressLimitLayer
    ///
    /// Every service produced by this layer shares `limiter`, so clones of the
    /// stack see the same windows.
    pub fn new(limiter: Arc<L>) -> Self {
        AddressLimitLayer { limiter }
    }
}

impl<L, S> Layer<S> for AddressLimitLayer<L>
where
    L: ?Sized,
{
    type Service = AddressLimitService<L, S>;

    fn layer(&self, service: S) -> Self::Service {
        AddressLimitService::new(service, self.limiter.clone())
    }
}
