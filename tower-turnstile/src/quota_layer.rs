use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use tower::Layer;
use turnstile_limit::CounterStore;

use crate::quota_service::ApiKeyQuotaService;

/// Source of the current UTC time for quota windows.
pub type Clock = fn() -> DateTime<Utc>;

/// Enforces a daily quota of successful calls per API key.
#[derive(Clone, Debug)]
pub struct ApiKeyQuotaLayer {
    store: Arc<CounterStore>,
    daily_limit: u64,
    clock: Clock,
}

impl ApiKeyQuotaLayer {
    /// Create an ApiKeyQuotaLayer counting into `store`.
    pub fn new(store: Arc<CounterStore>, daily_limit: u64) -> Self {
        Self {
            store,
            daily_limit,
            clock: Utc::now,
        }
    }

    /// Read the time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl<S> Layer<S> for ApiKeyQuotaLayer {
    type Service = ApiKeyQuotaService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyQuotaService {
            inner,
            store: Arc::clone(&self.store),
            daily_limit: self.daily_limit,
            clock: self.clock,
        }
    }
}
