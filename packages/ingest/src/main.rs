#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the vPIC harvest tool.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use vpic_harvest_cli_utils::{IndicatifProgress, MultiProgress, init_logger};
use vpic_harvest_database::{Connection, paths, store};
use vpic_harvest_ingest::{
    IngestError, harvest_makes, harvest_makes_from_wmi, harvest_manufacturers, harvest_models,
    harvest_wmi_by_manufacturer,
};
use vpic_harvest_source::vpic::VpicClient;

#[derive(Parser)]
#[command(name = "vpic_harvest_ingest", about = "NHTSA vPIC reference data harvester")]
struct Cli {
    /// Path to the DuckDB file. Defaults to the `VPIC_HARVEST_DB`
    /// environment variable, then `data/vpic.duckdb`.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the manufacturer and make listings
    MfrMake,
    /// Harvest WMI codes per manufacturer, then decode each WMI
    Wmi {
        /// Maximum number of keys per keyed stage (for testing)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Harvest model names per make, year, and vehicle type
    Models {
        /// Maximum number of make IDs to expand into requests (for testing)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run all three harvest jobs in order
    All {
        /// Maximum number of keys per keyed stage (for testing)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(paths::default_db_path);
    log::info!("Using store at {}", db_path.display());
    let conn = store::open(&db_path)?;
    let client = VpicClient::new();

    let started = Instant::now();

    match cli.command {
        Commands::MfrMake => run_mfr_make(&client, &conn).await?,
        Commands::Wmi { limit } => run_wmi(&client, &conn, &multi, limit).await?,
        Commands::Models { limit } => run_models(&client, &conn, &multi, limit).await?,
        Commands::All { limit } => {
            run_mfr_make(&client, &conn).await?;
            run_wmi(&client, &conn, &multi, limit).await?;
            run_models(&client, &conn, &multi, limit).await?;
        }
    }

    log::info!("Harvest finished in {:.1?}", started.elapsed());
    Ok(())
}

async fn run_mfr_make(client: &VpicClient, conn: &Connection) -> Result<(), IngestError> {
    let published = harvest_manufacturers(client, conn).await?;
    log::info!("manufacturers: {published} rows");

    let published = harvest_makes(client, conn).await?;
    log::info!("makes: {published} rows");

    Ok(())
}

async fn run_wmi(
    client: &VpicClient,
    conn: &Connection,
    multi: &MultiProgress,
    limit: Option<usize>,
) -> Result<(), IngestError> {
    let bar = IndicatifProgress::keys_bar(multi, "Fetching WMI codes per manufacturer");
    let published = harvest_wmi_by_manufacturer(client, conn, limit, Some(&bar)).await?;
    bar.finish(format!("wmi_by_mfr: {published} rows"));

    let bar = IndicatifProgress::keys_bar(multi, "Decoding WMI codes");
    let published = harvest_makes_from_wmi(client, conn, limit, Some(&bar)).await?;
    bar.finish(format!("wmi_by_make: {published} rows"));

    Ok(())
}

async fn run_models(
    client: &VpicClient,
    conn: &Connection,
    multi: &MultiProgress,
    limit: Option<usize>,
) -> Result<(), IngestError> {
    let bar = IndicatifProgress::keys_bar(multi, "Fetching model names");
    let published = harvest_models(client, conn, limit, Some(&bar)).await?;
    bar.finish(format!("models: {published} rows"));

    Ok(())
}
