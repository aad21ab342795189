//! qosagent CLI — operator interface to the node agent's async workers.

use clap::{Parser, Subcommand};
use qosagent::config::Config;
use qosagent::engine::AsyncWorkers;
use qosagent::model::Work;
use qosagent::telemetry::{TelemetryConfig, init_telemetry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "qosagent", about = "Node-local QoS agent")]
struct Cli {
    /// TOML config file. Environment variables are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the async workers with a synthetic reconcile load
    Simulate {
        /// Number of distinct pod keys
        #[arg(long, default_value_t = 4)]
        keys: usize,
        /// Total works to add, round-robin over the keys
        #[arg(long, default_value_t = 100)]
        submissions: usize,
        /// Delay between two submissions
        #[arg(long, default_value_t = 5)]
        interval_ms: u64,
        /// How long each work runs unless cancelled
        #[arg(long, default_value_t = 50)]
        work_ms: u64,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Default)]
struct Counters {
    started: AtomicUsize,
    finished: AtomicUsize,
    cancelled: AtomicUsize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Simulate {
            keys,
            submissions,
            interval_ms,
            work_ms,
        } => cmd_simulate(config, keys, submissions, interval_ms, work_ms).await,
        Command::Config => cmd_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    Ok(config)
}

async fn cmd_simulate(
    config: Config,
    keys: usize,
    submissions: usize,
    interval_ms: u64,
    work_ms: u64,
) -> anyhow::Result<()> {
    if keys == 0 {
        anyhow::bail!("--keys must be at least 1");
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "qosagent".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let workers = AsyncWorkers::with_config(config.workers.clone());
    let stop = CancellationToken::new();
    let cleanup = workers.start(stop.clone());

    let counters = Arc::new(Counters::default());
    let work_time = Duration::from_millis(work_ms);

    for i in 0..submissions {
        let key = format!("pod-{}", i % keys);
        let counters = Arc::clone(&counters);
        let work = Work::new(move |ctx, _params| {
            let counters = Arc::clone(&counters);
            async move {
                counters.started.fetch_add(1, Ordering::Relaxed);
                tokio::select! {
                    _ = ctx.cancelled() => {
                        counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    }
                    _ = tokio::time::sleep(work_time) => {
                        counters.finished.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(())
            }
        })
        .param(i as u64)
        .param(key.clone());

        workers.add_work(&key, work)?;
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }

    // Every key drains once its last replacement has run.
    while (0..keys).any(|k| workers.is_working(&format!("pod-{k}"))) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    stop.cancel();
    cleanup.await?;

    let started = counters.started.load(Ordering::Relaxed);
    println!("workers:    {}", workers.name());
    println!("submitted:  {submissions}");
    println!("executed:   {started}");
    println!("finished:   {}", counters.finished.load(Ordering::Relaxed));
    println!("cancelled:  {}", counters.cancelled.load(Ordering::Relaxed));
    println!("coalesced:  {}", submissions.saturating_sub(started));

    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("Workers:          {}", config.workers.name);
    println!(
        "Cleanup interval: {}s",
        config.workers.cleanup_interval.as_secs()
    );
    println!(
        "OTel endpoint:    {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!("Log level:        {}", config.log_level);
    Ok(())
}
