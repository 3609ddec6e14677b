//! # Tower Turnstile
//!
//! `tower-turnstile` is a request pipeline for the
//! [Tower](https://github.com/tower-rs/tower) ecosystem, built from
//! independent stages that each work as a plain [`tower::Layer`]:
//!
//! 1. [`AddressLimitLayer`]: a fixed window per caller address. Callers over
//!    the limit get `429 Too many requests. Try again later.` straight away.
//! 2. [`LoggingLayer`]: start and finish events with status and latency.
//! 3. [`FaultIsolationLayer`]: failures raised below it are classified by
//!    [`FailureKind`] and answered with a generic JSON body. Nothing above it
//!    ever sees an error.
//! 4. [`ApiKeyQuotaLayer`]: a daily quota of successful calls per
//!    `X-API-Key`, counted in a shared [`turnstile_limit::CounterStore`].
//!
//! [`Pipeline`] composes all four, in that order, in front of an application
//! service built from [`PipelineConfig`].
//!
//! ## Feature Flags
//!
//! - `axum`: Enables [`serve_pipeline`], an Axum handler that drives requests
//!   through a [`Pipeline`].

mod config;
mod context;
mod error;
mod fault_layer;
mod fault_service;
mod layer;
mod logging_layer;
mod logging_service;
mod pipeline;
mod quota_layer;
mod quota_service;
mod service;
mod utils;

#[cfg(feature = "axum")]
mod axum_handler;


pub use config::ApiKeyDailyRateLimitConfig;
pub use config::GlobalRateLimitConfig;
pub use config::PipelineConfig;
pub use context::API_KEY_HEADER;
pub use context::ClientAddr;
pub use context::RATE_LIMIT_REMAINING_HEADER;
pub use context::Request;
pub use context::Response;
pub use context::UNKNOWN_CLIENT;
pub use context::client_key;
pub use error::ConfigError;
pub use error::FailureKind;
pub use error::PipelineError;
pub use fault_layer::FaultIsolationLayer;
pub use fault_service::FaultIsolationService;
pub use layer::AddressLimitLayer;
pub use logging_layer::LoggingLayer;
pub use logging_service::LoggingService;
pub use pipeline::Pipeline;
pub use quota_layer::ApiKeyQuotaLayer;
pub use quota_layer::Clock;
pub use quota_service::ApiKeyQuotaService;
pub use quota_service::quota_key;
pub use service::AddressLimitService;
pub use utils::ServiceBuilderExt;

#[cfg(feature = "axum")]
pub use axum_handler::MAX_BODY_BYTES;
#[cfg(feature = "axum")]
pub use axum_handler::serve_pipeline;
