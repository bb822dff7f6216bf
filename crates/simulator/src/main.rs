use std::{io, path::PathBuf};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod customer;
mod driver;
mod errors;
mod ledger;
mod vendor;

use config::{ConfigOverrides, Configuration};
use driver::{run_simulation, RunPlan};
use vendor::VENDOR_BATCH_SIZE;

const DEFAULT_VENDORS: usize = 2;
const DEFAULT_CUSTOMERS: usize = 1;

#[derive(Parser)]
/// Simulate vendors and customers trading through a bounded ticket pool.
/// Values missing from both the flags and the config file are asked for on stdin.
struct Opts {
    /// JSON configuration file to read values from
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the resolved configuration to this JSON file before starting
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,

    /// Total number of tickets that will ever be issued
    #[arg(long, allow_negative_numbers = true)]
    total_tickets: Option<i64>,

    /// Pause between vendor releases (ms)
    #[arg(long, allow_negative_numbers = true)]
    release_rate_ms: Option<i64>,

    /// Pause between customer purchases (ms)
    #[arg(long, allow_negative_numbers = true)]
    retrieval_rate_ms: Option<i64>,

    /// Maximum number of tickets held in the pool at once
    #[arg(long, allow_negative_numbers = true)]
    max_capacity: Option<i64>,

    /// Number of vendor tasks
    #[arg(long, default_value_t = DEFAULT_VENDORS)]
    vendors: usize,

    /// Number of customer tasks
    #[arg(long, default_value_t = DEFAULT_CUSTOMERS)]
    customers: usize,

    /// Tickets offered by a vendor per release
    #[arg(long, default_value_t = VENDOR_BATCH_SIZE)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Opts::parse();

    let base = match &opts.config {
        Some(path) => Some(Configuration::load_from_file(path).await?),
        None => None,
    };
    let overrides = ConfigOverrides {
        total_tickets: opts.total_tickets,
        ticket_release_rate: opts.release_rate_ms,
        customer_retrieval_rate: opts.retrieval_rate_ms,
        max_ticket_capacity: opts.max_capacity,
    };

    // prompting reads stdin, keep it off the async workers
    let config = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        config::resolve(overrides, base, &mut stdin.lock(), &mut stdout)
    })
    .await??;

    let settings = config.validate()?;

    if let Some(path) = &opts.save_config {
        config.save_to_file(path).await?;
        info!("configuration saved to {}", path.display());
    }

    let plan = RunPlan {
        settings,
        vendors: opts.vendors,
        customers: opts.customers,
        batch_size: opts.batch_size,
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("stop requested, cancelling workers");
                    cancel.cancel();
                }
                Err(e) => error!("failed to listen for ctrl_c: {}", e),
            }
        });
    }

    let report = run_simulation(plan, cancel).await?;

    if report.cancelled {
        println!("Simulation stopped early.");
    } else {
        println!("All tickets sold. Program terminated.");
    }
    println!(
        "run {}: {} of {} tickets sold, {} left in pool",
        report.run_id,
        report.tickets_sold(),
        report.total_tickets,
        report.left_in_pool
    );
    for vendor in &report.vendors {
        let tally = report.tallies.get(&vendor.name).cloned().unwrap_or_default();
        println!(
            "  {}: {} releases, {} tickets added, {} found the pool full",
            vendor.name, vendor.releases, tally.added, tally.empty_releases
        );
    }
    for customer in &report.customers {
        println!("  {}: purchased {}", customer.name, customer.purchased.len());
    }
    if !report.is_consistent() {
        warn!("tickets bought and tickets left in the pool do not add up to tickets issued");
    }
    println!(
        "started {}, total time: {:.2?}",
        report.started_at.format(ticket_pool::TIMESTAMP_FORMAT),
        report.elapsed
    );

    Ok(())
}
