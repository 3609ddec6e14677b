use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use chrono::NaiveDate;
use http::StatusCode;
use http::header::HeaderValue;
use tower::BoxError;
use tower::Service;
use turnstile_limit::CounterStore;
use turnstile_limit::next_utc_midnight;

use crate::context::API_KEY_HEADER;
use crate::context::RATE_LIMIT_REMAINING_HEADER;
use crate::context::Request;
use crate::context::Response;
use crate::context::plain_text;
use crate::quota_layer::Clock;

pub(crate) const MISSING_KEY_BODY: &str = "API Key is missing.";
pub(crate) const QUOTA_EXCEEDED_BODY: &str = "Daily API rate limit exceeded.";

/// Counts successful calls per API key per UTC day.
///
/// A request without a visible ASCII `X-API-Key` is answered with `401`
/// before the store is touched. A key that has reached its limit is answered with `429`.
/// Otherwise the inner service runs, and only a `2xx` response consumes a
/// unit of quota and gains an `X-RateLimit-Remaining` header.
///
/// The limit is checked before the inner service runs and the count is
/// written after it returns, so concurrent requests for one key may all pass
/// the check. The increment itself is atomic and never loses a count.
#[derive(Debug)]
pub struct ApiKeyQuotaService<S> {
    pub(crate) inner: S,
    pub(crate) store: Arc<CounterStore>,
    pub(crate) daily_limit: u64,
    pub(crate) clock: Clock,
}

impl<S: Clone> Clone for ApiKeyQuotaService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: Arc::clone(&self.store),
            daily_limit: self.daily_limit,
            clock: self.clock,
        }
    }
}

fn missing_key() -> Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>> {
    Box::pin(std::future::ready(Ok(plain_text(
        StatusCode::UNAUTHORIZED,
        MISSING_KEY_BODY,
    ))))
}

/// The counter key for `api_key` on `day`.
///
/// The date suffix has a fixed width, so distinct key/day pairs never map to
/// the same string.
pub fn quota_key(api_key: &str, day: NaiveDate) -> String {
    format!("{api_key}:{}", day.format("%Y-%m-%d"))
}

impl<S> Service<Request> for ApiKeyQuotaService<S>
where
    S: Service<Request, Response = Response, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Keys are counted by their exact text; a value that is not visible
        // ASCII has no lossless text form and is treated as missing.
        let api_key = match req.headers().get(API_KEY_HEADER).map(HeaderValue::to_str) {
            Some(Ok(key)) if !key.is_empty() => key.to_owned(),
            Some(Err(_)) => {
                tracing::debug!(path = req.uri().path(), "api key is not visible ascii");
                return missing_key();
            }
            _ => {
                tracing::debug!(path = req.uri().path(), "request without api key");
                return missing_key();
            }
        };

        let now = (self.clock)();
        let key = quota_key(&api_key, now.date_naive());
        let count = self
            .store
            .get_or_create_at(&key, next_utc_midnight(now), now);

        if count >= self.daily_limit {
            tracing::info!(
                path = req.uri().path(),
                count,
                limit = self.daily_limit,
                "daily quota exhausted"
            );
            return Box::pin(std::future::ready(Ok(plain_text(
                StatusCode::TOO_MANY_REQUESTS,
                QUOTA_EXCEEDED_BODY,
            ))));
        }

        // The ready service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let store = Arc::clone(&self.store);
        let daily_limit = self.daily_limit;
        let clock = self.clock;

        Box::pin(async move {
            let mut response = inner.call(req).await?;

            if response.status().is_success() {
                let now = clock();
                let new_count = store.increment_at(&key, next_utc_midnight(now) - now, now);
                let remaining = daily_limit.saturating_sub(new_count);
                response
                    .headers_mut()
                    .insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
            }

            Ok(response)
        })
    }
}
