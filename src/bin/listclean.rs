//! listclean CLI: operator interface to the verification queue.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use listclean_rs::config::Config;
use listclean_rs::config::secrets::ExposeSecret;
use listclean_rs::engine::{Pool, PoolConfig, RunReport, cancel_on};
use listclean_rs::ingest::{self, DEFAULT_COLUMN};
use listclean_rs::model::Stats;
use listclean_rs::proxy::ProxySelector;
use listclean_rs::store::{self, RedisStore};
use listclean_rs::telemetry::{TelemetryConfig, init_telemetry};
use listclean_rs::transport::{Connector, ProxyConnector};
use listclean_rs::verify::{DnsResolver, SmtpVerifier};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "listclean", about = "Verify a list of addresses against their mail servers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed the queue from a CSV export
    Load {
        /// CSV file, one record per line
        csv: PathBuf,
        /// Zero-based column holding the address
        #[arg(long, default_value_t = DEFAULT_COLUMN)]
        column: usize,
        /// Clear todo, accepted and rejected before loading
        #[arg(long)]
        reset: bool,
    },
    /// Drain the queue (Ctrl-C stops cleanly; run again to resume)
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show set sizes
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write todo.txt, accepted.txt and rejected.txt into a directory
    Export {
        /// Output directory
        dir: PathBuf,
    },
    /// Clear all three sets
    Reset {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "listclean".to_string(),
        log_level: config.log_level.clone(),
        queue_namespace: config.namespace.clone(),
    })?;

    let store = RedisStore::connect(config.redis_url.expose_secret(), &config.namespace)
        .await
        .context("connecting to queue store")?;
    store.health_check().await?;

    match cli.command {
        Command::Load { csv, column, reset } => cmd_load(&store, csv, column, reset).await,
        Command::Run { json } => cmd_run(config, Arc::new(store), json).await,
        Command::Stats { json } => cmd_stats(&store, json).await,
        Command::Export { dir } => cmd_export(&store, dir).await,
        Command::Reset { yes } => cmd_reset(&store, yes).await,
    }
}

async fn cmd_load(store: &RedisStore, csv: PathBuf, column: usize, reset: bool) -> anyhow::Result<()> {
    let file = std::fs::File::open(&csv).with_context(|| format!("opening {}", csv.display()))?;
    let values = ingest::read_csv_column(std::io::BufReader::new(file), column)?;
    let report = ingest::seed(store, values, reset).await?;

    println!(
        "Loaded {} record(s), skipped {}, {} in queue.",
        report.offered - report.filtered,
        report.filtered,
        report.todo
    );
    Ok(())
}

async fn cmd_run(mut config: Config, store: Arc<RedisStore>, json: bool) -> anyhow::Result<()> {
    let selector = Arc::new(ProxySelector::new(
        std::mem::take(&mut config.proxies),
        config.proxy_policy,
    ));
    let connector: Arc<dyn Connector> = Arc::new(ProxyConnector::new(Arc::clone(&selector)));
    let resolver = Arc::new(DnsResolver::from_system_conf()?);
    let verifier = Arc::new(SmtpVerifier::new(connector, resolver, config.smtp.clone()));

    let pool_config = PoolConfig::for_proxies(selector.len())
        .with_pacing(config.pacing)
        .with_shutdown_grace(config.shutdown_grace);
    let pool = Pool::new(store.clone(), verifier, pool_config);

    let cancel = CancellationToken::new();
    cancel_on(tokio::signal::ctrl_c(), cancel.clone());

    let report = pool.run(cancel).await?;
    let stats = store::stats(store.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        print_stats(&stats);
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} worker(s) stopped on queue store errors",
            report.worker_failures.len()
        );
    }
    Ok(())
}

async fn cmd_stats(store: &RedisStore, json: bool) -> anyhow::Result<()> {
    let stats = store::stats(store).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

async fn cmd_export(store: &RedisStore, dir: PathBuf) -> anyhow::Result<()> {
    let stats = listclean_rs::export::write_sets(store, &dir).await?;
    println!("Exported to {}", dir.display());
    print_stats(&stats);
    Ok(())
}

async fn cmd_reset(store: &RedisStore, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to clear all sets without --yes");
    }
    store::clear_all(store).await?;
    println!("Cleared todo, accepted and rejected.");
    Ok(())
}

fn print_report(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "Run {} {} after {}s with {} worker(s).",
        report.run_id,
        if report.cancelled { "cancelled" } else { "finished" },
        elapsed.num_seconds(),
        report.workers
    );
    println!(
        "Classified {} ({} accepted, {} rejected, {} verification errors).",
        report.stats.classified(),
        report.stats.accepted,
        report.stats.rejected,
        report.stats.verify_errors
    );
    if report.stats.requeued > 0 || report.stats.lost > 0 || report.aborted_workers > 0 {
        println!(
            "Interrupted: {} returned to queue, {} lost, {} worker(s) aborted.",
            report.stats.requeued, report.stats.lost, report.aborted_workers
        );
    }
    for failure in &report.worker_failures {
        match failure.worker {
            Some(worker) => eprintln!("worker {worker} failed: {}", failure.error),
            None => eprintln!("worker failed: {}", failure.error),
        }
    }
}

fn print_stats(stats: &Stats) {
    println!("REMAINING: {}", stats.todo);
    println!("GOOD:      {}", stats.accepted);
    println!("BAD:       {}", stats.rejected);
}
