use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use browser_runner::browser::ChromeDriver;
use browser_runner::config::Config;
use browser_runner::http::{self, AppState};
use browser_runner::queue::InMemoryQueue;
use browser_runner::runner::JobExecutor;
use browser_runner::worker::{Worker, WorkerStatus};

/// Queue-driven headless browser automation worker.
#[derive(Parser, Debug)]
#[command(name = "browser-runner", version, about)]
struct Cli {
    /// Address for the submission/health endpoints.
    #[arg(long)]
    bind: Option<String>,

    /// Number of jobs processed concurrently.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Run the browser with a visible window.
    #[arg(long)]
    headed: bool,

    /// Directory for screenshot artifacts.
    #[arg(long)]
    screenshots_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(bind) = cli.bind {
        config.http.bind = bind;
    }
    if let Some(concurrency) = cli.concurrency {
        config.worker.concurrency = concurrency.max(1);
    }
    if cli.headed {
        config.browser.headless = false;
    }
    if let Some(dir) = cli.screenshots_dir {
        config.artifacts.screenshots_dir = dir;
    }

    info!(
        queue = %config.queue.name,
        concurrency = config.worker.concurrency,
        "starting browser runner"
    );

    let queue = Arc::new(InMemoryQueue::new(&config.queue));
    let status = Arc::new(WorkerStatus::new());
    let executor = Arc::new(JobExecutor::new(ChromeDriver, config.clone()));
    let worker = Arc::new(Worker::new(
        queue.clone(),
        executor,
        status.clone(),
        config.worker.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));

    let app = http::router(AppState {
        queue: queue.clone(),
        status: status.clone(),
    });
    let listener = tokio::net::TcpListener::bind(config.http.bind.as_str()).await?;
    info!(bind = %config.http.bind, "submission endpoint listening");

    let mut http_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Let the in-flight job reach session close, then cut our losses.
    let grace = Duration::from_millis(config.worker.shutdown_grace_ms);
    if tokio::time::timeout(grace, worker_handle).await.is_err() {
        warn!(
            grace_ms = config.worker.shutdown_grace_ms,
            "graceful shutdown window elapsed; abandoning in-flight work"
        );
    }
    server.abort();
    Ok(())
}
