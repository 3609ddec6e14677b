use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;
use turnstile_limit::CounterStore;
use turnstile_limit::KeyedFixedWindow;

use crate::ApiKeyQuotaLayer;
use crate::PipelineConfig;
use crate::context::Request;
use crate::context::Response;
use crate::error::ConfigError;
use crate::error::FailureKind;
use crate::quota_layer::Clock;
use crate::utils::ServiceBuilderExt;

/// The complete request pipeline in front of an application service.
///
/// Stages run in a fixed order:
///
/// 1. **Address limit**: a fixed window per caller IP, checked before
///    anything else runs.
/// 2. **Logging**: start and finish events, including for requests that
///    later stages short-circuit.
/// 3. **Fault isolation**: application failures become classified JSON
///    responses here and go no further.
/// 4. **API key quota**: the daily quota of successful calls per key.
///
/// `Pipeline` is cheap to clone; clones share the limiter and counter store.
#[derive(Clone)]
pub struct Pipeline {
    service: BoxCloneSyncService<Request, Response, BoxError>,
    limiter: Arc<KeyedFixedWindow>,
    store: Arc<CounterStore>,
}

impl Pipeline {
    /// Builds the pipeline in front of `terminal`.
    ///
    /// `store` is owned by the caller so that it can outlive, or be shared
    /// between, pipelines.
    pub fn new<T>(
        config: &PipelineConfig,
        store: Arc<CounterStore>,
        terminal: T,
    ) -> Result<Self, ConfigError>
    where
        T: Service<Request, Response = Response, Error = BoxError> + Clone + Send + Sync + 'static,
        T::Future: Send + 'static,
    {
        Self::with_clock(config, store, terminal, Utc::now)
    }

    /// Like [`Pipeline::new`], but quota days are read from `clock`.
    pub fn with_clock<T>(
        config: &PipelineConfig,
        store: Arc<CounterStore>,
        terminal: T,
        clock: Clock,
    ) -> Result<Self, ConfigError>
    where
        T: Service<Request, Response = Response, Error = BoxError> + Clone + Send + Sync + 'static,
        T::Future: Send + 'static,
    {
        config.validate()?;
        if config.api_key_daily_rate_limit.limit.is_none() {
            tracing::warn!(
                "ApiKeyDailyRateLimit.Limit is not configured; every API key is limited to 0 calls per day"
            );
        }

        let limiter = Arc::new(KeyedFixedWindow::new(
            config.permit_limit()?,
            config.window()?,
        ));

        let service = ServiceBuilder::new()
            .address_rate_limit(limiter.clone())
            .request_logging()
            .fault_isolation()
            .layer(
                ApiKeyQuotaLayer::new(Arc::clone(&store), config.daily_limit()).with_clock(clock),
            )
            .service(terminal);

        tracing::info!(
            permit_limit = limiter.capacity().get(),
            window_secs = limiter.interval().as_secs(),
            daily_limit = config.daily_limit(),
            "pipeline ready"
        );

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            limiter,
            store,
        })
    }

    /// Drives one request through every stage and returns the final response.
    pub async fn handle(&self, request: Request) -> Response {
        let mut service = self.service.clone();
        let result = match service.ready().await {
            Ok(ready) => ready.call(request).await,
            Err(err) => Err(err),
        };

        // Only reachable when the address limiter's inner stack fails to
        // become ready, which fault isolation prevents.
        result.unwrap_or_else(|err| {
            tracing::error!(error = %err, "pipeline failed without a response");
            FailureKind::Unexpected.into_response()
        })
    }

    /// The counter store holding daily quota counts.
    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    /// The per address limiter.
    pub fn limiter(&self) -> &Arc<KeyedFixedWindow> {
        &self.limiter
    }

    /// Periodically drops idle address windows and expired quota counters.
    ///
    /// Expiry is lazy, so this only bounds memory; limits are enforced
    /// whether or not it runs.
    pub fn spawn_purge(&self, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(&self.limiter);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let partitions = limiter.purge_idle();
                let counters = store.purge_expired();
                tracing::debug!(partitions, counters, "purged idle rate limit state");
            }
        })
    }
}

impl Service<Request> for Pipeline {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the stack is awaited inside handle().
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { Ok(pipeline.handle(req).await) })
    }
}
