use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use clap::Parser;
use hdrhistogram::Histogram;
use http::StatusCode;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::service_fn;
use tower_turnstile::API_KEY_HEADER;
use tower_turnstile::ClientAddr;
use tower_turnstile::Pipeline;
use tower_turnstile::PipelineConfig;
use tower_turnstile::PipelineError;
use tower_turnstile::Request;
use tower_turnstile::Response;
use tracing_subscriber::EnvFilter;
use turnstile_limit::CounterStore;

/// Drives a burst of requests through the pipeline and reports outcomes.
#[derive(Parser, Debug)]
#[command(name = "stress_test")]
struct Args {
    /// Total requests to send
    #[arg(long, default_value_t = 50_000)]
    requests: usize,

    /// Distinct caller addresses
    #[arg(long, default_value_t = 500)]
    addresses: usize,

    /// Distinct API keys
    #[arg(long, default_value_t = 50)]
    api_keys: usize,

    /// Requests admitted per address per window
    #[arg(long, default_value_t = 100)]
    permit_limit: usize,

    /// Address window length in seconds
    #[arg(long, default_value_t = 10)]
    window_secs: u64,

    /// Successful calls allowed per API key per day
    #[arg(long, default_value_t = 500)]
    daily_limit: u64,

    /// Optional YAML configuration, overriding the limit flags
    #[arg(long)]
    config: Option<String>,

    /// Simulated application latency in milliseconds
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// One request in this many fails with a not-found error
    #[arg(long, default_value_t = 20)]
    fail_every: usize,
}

async fn mock_app(req: Request, latency: Duration, fail_every: usize) -> Result<Response, BoxError> {
    // Simulate real-world work
    sleep(latency).await;

    let id: usize = req
        .uri()
        .path()
        .trim_start_matches("/items/")
        .parse()
        .unwrap_or(0);
    if fail_every > 0 && id % fail_every == 0 {
        return Err(PipelineError::NotFound(format!("item {id}")).into());
    }
    Ok(Response::new(Bytes::from_static(b"{\"ok\":true}")))
}

fn build_request(i: usize, args: &Args) -> Result<Request, BoxError> {
    let host = i % args.addresses.max(1);
    let addr: SocketAddr = format!("10.0.{}.{}:5000", host / 256, host % 256).parse()?;
    let mut request = http::Request::builder()
        .uri(format!("/items/{i}"))
        .header(API_KEY_HEADER, format!("key-{}", i % args.api_keys.max(1)))
        .body(Bytes::new())?;
    request.extensions_mut().insert(ClientAddr(addr));
    Ok(request)
}

async fn run_load_test(name: &str, pipeline: Pipeline, args: Arc<Args>) -> Result<(), BoxError> {
    let mut hist_elapsed = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;
    let mut statuses: BTreeMap<u16, usize> = BTreeMap::new();

    let mut tasks = JoinSet::new();
    let barrier = Arc::new(Barrier::new(args.requests));
    let start = Instant::now();

    for i in 0..args.requests {
        let request = build_request(i, &args)?;
        let pipeline = pipeline.clone();
        let bar = barrier.clone();
        tasks.spawn(async move {
            bar.wait().await;
            let req_start = Instant::now();
            let response = pipeline.handle(request).await;
            (response.status(), req_start.elapsed())
        });
    }

    while let Some(task) = tasks.join_next().await {
        let (status, elapsed) = task?;
        *statuses.entry(status.as_u16()).or_default() += 1;
        if status.is_success() {
            hist_elapsed.record(elapsed.as_micros() as u64)?;
        }
    }

    let total_duration = start.elapsed();
    let successes = statuses
        .iter()
        .filter(|(code, _)| StatusCode::from_u16(**code).is_ok_and(|s| s.is_success()))
        .map(|(_, count)| count)
        .sum::<usize>();

    println!("--- {} ---", name);
    println!("Total Duration:  {:.2?}", total_duration);
    println!("Success/Total:   {}/{}", successes, args.requests);
    println!(
        "Total Rate:      {:.2} req/sec",
        args.requests as f64 / total_duration.as_secs_f64()
    );
    println!(
        "Success Rate:    {:.2} req/sec (Goodput)",
        successes as f64 / total_duration.as_secs_f64()
    );

    if successes > 0 {
        println!("P50 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.5));
        println!("P99 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.99));
    }

    println!("Statuses:");
    for (code, count) in &statuses {
        println!("  └─ {}: {}", code, count);
    }
    println!("Stored counters: {}", pipeline.store().len());
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let args = Arc::new(Args::parse());
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default()
            .with_daily_limit(args.daily_limit)
            .with_global_limit(args.permit_limit, args.window_secs),
    };

    let latency = Duration::from_millis(args.latency_ms);
    let fail_every = args.fail_every;
    let app = service_fn(move |req| mock_app(req, latency, fail_every));

    let pipeline = Pipeline::new(&config, Arc::new(CounterStore::new()), app)?;
    run_load_test("Full Pipeline", pipeline, args).await
}
