use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use bytes::Bytes;
use tower::BoxError;
use tower::service_fn;
use tower_turnstile::Pipeline;
use tower_turnstile::PipelineConfig;
use tower_turnstile::PipelineError;
use tower_turnstile::Request;
use tower_turnstile::Response;
use tower_turnstile::serve_pipeline;
use tracing_subscriber::EnvFilter;
use turnstile_limit::CounterStore;

/// The application behind the pipeline.
async fn app(req: Request) -> Result<Response, BoxError> {
    match req.uri().path() {
        "/weather" => Ok(Response::new(Bytes::from_static(
            br#"{"summary":"Mild","temperatureC":18}"#,
        ))),
        "/admin" => Err(PipelineError::Authorization("admin role required".into()).into()),
        "/search" => Err(PipelineError::InvalidArgument("query is empty".into()).into()),
        "/crash" => Err("connection pool exhausted".into()),
        other => Err(PipelineError::NotFound(format!("no route for {other}")).into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 1. Configuration: a YAML path as the first argument, or a demo quota
    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default().with_daily_limit(100),
    };

    // 2. Pipeline in front of the application
    let pipeline = Pipeline::new(&config, Arc::new(CounterStore::new()), service_fn(app))?;
    let _purge = pipeline.spawn_purge(Duration::from_secs(60));

    // 3. Every path goes through the pipeline
    let router = Router::new()
        .fallback(serve_pipeline)
        .with_state(pipeline);

    // 4. Serve, keeping the peer address for the address limiter
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on http://127.0.0.1:3000");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
