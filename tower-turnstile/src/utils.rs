use std::sync::Arc;

use tower::ServiceBuilder;
use tower::layer::util::Stack;
use turnstile_limit::CounterStore;
use turnstile_limit::KeyedStrategy;

use crate::AddressLimitLayer;
use crate::ApiKeyQuotaLayer;
use crate::FaultIsolationLayer;
use crate::LoggingLayer;

/// Service Builder Extension adding the pipeline stages to tower::ServiceBuilder.
///
/// Layers added first wrap those added later, so the order of calls is the
/// order a request passes through the stages.
pub trait ServiceBuilderExt<L> {
    /// Add a per address admission check
    fn address_rate_limit(
        self,
        limiter: Arc<dyn KeyedStrategy + Send + Sync + 'static>,
    ) -> ServiceBuilder<Stack<AddressLimitLayer<dyn KeyedStrategy + Send + Sync + 'static>, L>>;

    /// Add start and finish logging
    fn request_logging(self) -> ServiceBuilder<Stack<LoggingLayer, L>>;

    /// Add the fault isolation boundary
    fn fault_isolation(self) -> ServiceBuilder<Stack<FaultIsolationLayer, L>>;

    /// Add a daily quota per API key
    fn api_key_quota(
        self,
        store: Arc<CounterStore>,
        daily_limit: u64,
    ) -> ServiceBuilder<Stack<ApiKeyQuotaLayer, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn address_rate_limit(
        self,
        limiter: Arc<dyn KeyedStrategy + Send + Sync + 'static>,
    ) -> ServiceBuilder<Stack<AddressLimitLayer<dyn KeyedStrategy + Send + Sync + 'static>, L>>
    {
        self.layer(AddressLimitLayer::new(limiter))
    }

    fn request_logging(self) -> ServiceBuilder<Stack<LoggingLayer, L>> {
        self.layer(LoggingLayer::new())
    }

    fn fault_isolation(self) -> ServiceBuilder<Stack<FaultIsolationLayer, L>> {
        self.layer(FaultIsolationLayer::new())
    }

    fn api_key_quota(
        self,
        store: Arc<CounterStore>,
        daily_limit: u64,
    ) -> ServiceBuilder<Stack<ApiKeyQuotaLayer, L>> {
        self.layer(ApiKeyQuotaLayer::new(store, daily_limit))
    }
}
