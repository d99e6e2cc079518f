//! txnflow CLI: run the pipeline jobs by hand or as a daemon.
//!
//! Commands:
//! - `extract`: pull last month from the aggregation API into `to_process/`
//! - `transform`: turn pending raw artifacts into CSV batches and archive them
//! - `window`: print the reporting window for a reference date
//! - `status`: list pending, processed, claimed and output blobs
//! - `daemon`: monthly extraction plus transform-on-new-artifact loop

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use txnflow_core::data::{open_store, BlobStore, PlaidClient};
use txnflow_core::domain::artifact;
use txnflow_core::ReportingWindow;
use txnflow_runner::{
    collect_status, run_daemon, ArtifactOutcome, Extractor, Settings, TransformReport,
    Transformer,
};

#[derive(Parser)]
#[command(
    name = "txnflow",
    version,
    about = "txnflow: monthly transaction extraction and CSV transform pipeline"
)]
struct Cli {
    /// TOML file with non-secret settings. Defaults to $TXNFLOW_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the month before the reference date into the raw container.
    Extract {
        /// Reference date (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        reference_date: Option<String>,
    },
    /// Transform every pending raw artifact.
    Transform {
        /// Reference date (YYYY-MM-DD) for output naming. Defaults to today (UTC).
        #[arg(long)]
        reference_date: Option<String>,
    },
    /// Print the reporting window for a reference date.
    Window {
        /// Reference date (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        reference_date: Option<String>,
    },
    /// List pending, processed, claimed and output blobs.
    Status,
    /// Run the scheduler and pending-artifact watcher.
    ///
    /// There is no graceful stop: the loop runs until the process is killed.
    Daemon,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Window { reference_date } => run_window(reference_date),
        Commands::Extract { reference_date } => {
            let settings = load_settings(cli.config)?;
            run_extract(&settings, reference_date)
        }
        Commands::Transform { reference_date } => {
            let settings = load_settings(cli.config)?;
            run_transform(&settings, reference_date)
        }
        Commands::Status => {
            let settings = load_settings(cli.config)?;
            run_status(&settings)
        }
        Commands::Daemon => {
            let settings = load_settings(cli.config)?;
            run_daemon_cmd(&settings)
        }
    }
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let settings = Settings::load(path.as_deref()).context("loading configuration")?;
    log::debug!("{settings:?}");
    Ok(settings)
}

fn reference_date(arg: Option<String>) -> Result<NaiveDate> {
    arg.as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--reference-date must be YYYY-MM-DD")
        .map(|d| d.unwrap_or_else(|| Utc::now().date_naive()))
}

fn open_configured_store(settings: &Settings) -> Result<Box<dyn BlobStore>> {
    let store = open_store(&settings.storage.connection_string)
        .context("opening blob store from STORAGE_CONNECTION_STRING")?;
    log::info!("using blob store {}", store.describe());
    Ok(store)
}

fn build_client(settings: &Settings) -> Result<PlaidClient> {
    Ok(PlaidClient::new(
        settings.api.host.clone(),
        settings.credentials.clone(),
        settings.api_timeout(),
    )?
    .with_page_size(settings.api.page_size))
}

fn run_window(arg: Option<String>) -> Result<()> {
    let reference = reference_date(arg)?;
    let window = ReportingWindow::for_reference_date(reference);

    println!("Reference date: {reference}");
    println!("Window:         {} .. {}", window.start_date, window.end_date);
    println!("Days:           {}", window.len_days());
    println!("Raw artifact:   {}", artifact::pending_path(&window));
    println!("Transactions:   {}", artifact::transactions_output_path(&window));
    println!("Accounts:       {}", artifact::accounts_output_path(&window));
    Ok(())
}

fn run_extract(settings: &Settings, arg: Option<String>) -> Result<()> {
    let reference = reference_date(arg)?;
    let store = open_configured_store(settings)?;
    let client = build_client(settings)?;

    let extractor = Extractor::new(
        &client,
        store.as_ref(),
        settings.storage.raw_container.clone(),
        settings.extract_options(),
    );
    let report = extractor.run(reference).context("extraction failed")?;

    println!("=== Extraction Summary ===");
    println!("Window:       {}", report.window);
    println!("Blob:         {}/{}", report.container, report.blob_path);
    println!("Transactions: {}", report.transactions);
    println!("Accounts:     {}", report.accounts);
    println!("Size:         {} bytes", report.bytes);
    Ok(())
}

fn run_transform(settings: &Settings, arg: Option<String>) -> Result<()> {
    let reference = reference_date(arg)?;
    let store = open_configured_store(settings)?;

    let transformer = Transformer::new(
        store.as_ref(),
        settings.storage.raw_container.clone(),
        settings.storage.output_container.clone(),
        settings.transform_options(),
    );
    let report = transformer.run(reference).context("transform failed")?;
    print_transform_report(&report);

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_transform_report(report: &TransformReport) {
    println!("=== Transform Summary ===");
    println!("Invocation window: {}", report.window);
    if report.outcomes.is_empty() {
        println!("No pending artifacts.");
        return;
    }

    println!();
    println!("{:<50} {:>11}  Detail", "Artifact", "Outcome");
    println!("{}", "-".repeat(100));
    for outcome in &report.outcomes {
        match outcome {
            ArtifactOutcome::Transformed { artifact, result } => println!(
                "{:<50} {:>11}  {} txns, {} accounts -> {}",
                artifact, "transformed", result.transactions, result.accounts, result.window
            ),
            ArtifactOutcome::Skipped { artifact, reason } => {
                println!("{:<50} {:>11}  {}", artifact, "skipped", reason)
            }
            ArtifactOutcome::Failed { artifact, error } => {
                println!("{:<50} {:>11}  {}", artifact, "FAILED", error)
            }
        }
    }
    println!();
    println!(
        "{} transformed, {} skipped, {} failed",
        report.transformed(),
        report.skipped(),
        report.failed()
    );
}

fn run_status(settings: &Settings) -> Result<()> {
    let store = open_configured_store(settings)?;
    let raw = &settings.storage.raw_container;
    let output = &settings.storage.output_container;
    let status = collect_status(store.as_ref(), raw, output)?;

    println!("Store: {}", store.describe());
    println!();
    println!("Pending ({raw}):");
    print_blobs(&status.pending);
    println!("Processed ({raw}):");
    print_blobs(&status.processed);
    println!("Claims ({raw}):");
    if status.leases.is_empty() {
        println!("  (none)");
    }
    for entry in &status.leases {
        match &entry.lease {
            Some(lease) => println!(
                "  {:<56} owner {} since {}",
                entry.path, lease.owner, lease.claimed_at
            ),
            None => println!("  {:<56} (unreadable)", entry.path),
        }
    }
    println!("Outputs ({output}):");
    print_blobs(&status.outputs);
    Ok(())
}

fn print_blobs(blobs: &[txnflow_core::data::BlobInfo]) {
    if blobs.is_empty() {
        println!("  (none)");
    }
    for blob in blobs {
        println!("  {:<70} {:>10} bytes", blob.name, blob.size);
    }
}

fn run_daemon_cmd(settings: &Settings) -> Result<()> {
    let store = open_configured_store(settings)?;
    let client = build_client(settings)?;

    let extractor = Extractor::new(
        &client,
        store.as_ref(),
        settings.storage.raw_container.clone(),
        settings.extract_options(),
    );
    let transformer = Transformer::new(
        store.as_ref(),
        settings.storage.raw_container.clone(),
        settings.storage.output_container.clone(),
        settings.transform_options(),
    );

    run_daemon(
        &extractor,
        &transformer,
        store.as_ref(),
        &settings.schedule_options(),
        &AtomicBool::new(false),
    );
    Ok(())
}
