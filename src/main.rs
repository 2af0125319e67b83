use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use policy_billing::application::{BillingEngine, SweepScheduler};
use policy_billing::config::{BillingConfig, LogFormat};
use policy_billing::domain::policy::{Customer, PolicyProduct};
use policy_billing::domain::ports::ClockBox;
use policy_billing::infrastructure::clock::{ManualClock, SystemClock};
use policy_billing::infrastructure::in_memory::{InMemoryBillingStore, InMemoryCatalog};
use policy_billing::infrastructure::notifier::LogNotifier;
use policy_billing::interfaces::csv::catalog_reader::CatalogReader;
use policy_billing::interfaces::csv::command_reader::CommandReader;
use policy_billing::interfaces::csv::replay::Replay;
use policy_billing::interfaces::csv::subscription_writer::{SubscriptionRow, SubscriptionWriter};
use policy_billing::telemetry;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a CSV of dated business commands and print subscription state
    Replay {
        /// Input commands CSV file
        input: PathBuf,

        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Run the daily reconciliation sweep until interrupted
    Schedule {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

#[derive(Args)]
struct CatalogArgs {
    /// Policy products CSV file
    #[arg(long)]
    policies: PathBuf,

    /// Customers CSV file
    #[arg(long)]
    customers: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "POLICY_BILLING_DB_PATH")]
    db_path: Option<PathBuf>,
}

/// Command line settings; these win over `POLICY_BILLING__*` variables.
#[derive(Args)]
struct Overrides {
    #[arg(long, global = true)]
    grace_period_days: Option<u32>,

    #[arg(long, global = true)]
    lapse_threshold: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

impl Overrides {
    fn apply(&self, config: &mut BillingConfig) {
        if let Some(days) = self.grace_period_days {
            config.grace_period_days = days;
        }
        if let Some(threshold) = self.lapse_threshold {
            config.lapse_threshold = threshold;
        }
        if self.json_logs {
            config.log_format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BillingConfig::load().into_diagnostic()?;
    cli.overrides.apply(&mut config);
    telemetry::init(config.log_format);

    match cli.command {
        Commands::Replay { input, catalog } => replay(&input, &catalog, config).await,
        Commands::Schedule { catalog } => schedule(&catalog, config).await,
    }
}

async fn replay(input: &Path, catalog: &CatalogArgs, config: BillingConfig) -> Result<()> {
    // Moved forward to each command's date as the replay runs.
    let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
    let engine = build_engine(catalog, Box::new(clock.clone()), config).await?;

    let file = File::open(input).into_diagnostic()?;
    let summary = Replay::new(&engine, clock, Box::new(LogNotifier))
        .run(CommandReader::new(file))
        .await;
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        malformed = summary.malformed,
        "Replay finished"
    );

    let rows = SubscriptionRow::collect(&engine).await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = SubscriptionWriter::new(stdout.lock());
    writer.write_subscriptions(rows).into_diagnostic()?;

    Ok(())
}

async fn schedule(catalog: &CatalogArgs, config: BillingConfig) -> Result<()> {
    let engine = build_engine(catalog, Box::new(SystemClock), config).await?;
    let scheduler = SweepScheduler::new(Arc::new(engine), Box::new(LogNotifier));
    scheduler
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

fn read_catalog(args: &CatalogArgs) -> Result<(Vec<PolicyProduct>, Vec<Customer>)> {
    let policies = CatalogReader::new(File::open(&args.policies).into_diagnostic()?)
        .policies()
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;
    let customers = CatalogReader::new(File::open(&args.customers).into_diagnostic()?)
        .customers()
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;
    Ok((policies, customers))
}

async fn build_engine(args: &CatalogArgs, clock: ClockBox, config: BillingConfig) -> Result<BillingEngine> {
    let (policies, customers) = read_catalog(args)?;
    info!(policies = policies.len(), customers = customers.len(), "Catalog loaded");

    if let Some(db_path) = &args.db_path {
        return open_persistent(db_path, &policies, &customers, clock, config);
    }

    // Use in-memory storage
    let catalog = InMemoryCatalog::new();
    for policy in policies {
        catalog.add_policy(policy).await;
    }
    for customer in customers {
        catalog.add_customer(customer).await;
    }
    Ok(BillingEngine::new(
        Box::new(InMemoryBillingStore::new()),
        Box::new(catalog.clone()),
        Box::new(catalog),
        clock,
        config,
    ))
}

#[cfg(feature = "storage-rocksdb")]
fn open_persistent(
    db_path: &Path,
    policies: &[PolicyProduct],
    customers: &[Customer],
    clock: ClockBox,
    config: BillingConfig,
) -> Result<BillingEngine> {
    use policy_billing::infrastructure::rocksdb::RocksDBStore;

    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    for policy in policies {
        store.put_policy(policy).into_diagnostic()?;
    }
    for customer in customers {
        store.put_customer(customer).into_diagnostic()?;
    }
    Ok(BillingEngine::new(
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store),
        clock,
        config,
    ))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_persistent(
    db_path: &Path,
    _policies: &[PolicyProduct],
    _customers: &[Customer],
    _clock: ClockBox,
    _config: BillingConfig,
) -> Result<BillingEngine> {
    Err(miette::miette!(
        "--db-path {} requires building with the storage-rocksdb feature",
        db_path.display()
    ))
}
