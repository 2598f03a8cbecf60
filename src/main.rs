//! hotel-import CLI
//!
//! Imports hotel TV sales workbooks into SQLite, exports the map snapshot and
//! bundles province map scripts.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use hotel_geo_import::{
    init_tracing, merge_js_files, open_store, write_snapshot, AppConfig, ImportPipeline,
};

#[derive(Parser)]
#[command(name = "hotel-import")]
#[command(about = "Hotel TV sales import and map data tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a workbook into the hotels table, geocoding every address
    Import {
        /// Workbook to read (xlsx, xls, xlsb, ods or csv)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// SQLite database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Only import these sheets (repeatable)
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// Sheets whose first column is the sub-brand (repeatable)
        #[arg(long = "subbrand-sheet")]
        subbrand_sheets: Vec<String>,
    },

    /// Write data.json and filters.json for the map front-end
    Export {
        /// SQLite database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Merge every .js file of a folder into one script
    BundleJs {
        /// Folder containing the scripts
        folder: PathBuf,

        /// Merged output file
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env();

    match cli.command {
        Commands::Import {
            input,
            database,
            sheets,
            subbrand_sheets,
        } => {
            if let Some(input) = input {
                config.spreadsheet_path = input;
            }
            if let Some(database) = database {
                config.database_path = database;
            }
            if !sheets.is_empty() {
                config.import_sheets = Some(sheets);
            }
            if !subbrand_sheets.is_empty() {
                config.subbrand_sheets = subbrand_sheets;
            }

            info!(
                config = %serde_json::to_string(&config.public_profile())?,
                "starting import"
            );
            let pipeline =
                ImportPipeline::new(&config).context("failed to build import pipeline")?;
            let report = pipeline
                .run(&config.spreadsheet_path)
                .await
                .with_context(|| {
                    format!("import of {} failed", config.spreadsheet_path.display())
                })?;
            info!(
                inserted = report.inserted(),
                duplicates = report.duplicates(),
                geocode_misses = report.geocode_misses(),
                sheets = report.sheets.len(),
                "import complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Export { database, out_dir } => {
            let database = database.unwrap_or(config.database_path);
            let out_dir = out_dir.unwrap_or(config.export_dir);
            let connection = open_store(&database)
                .with_context(|| format!("failed to open {}", database.display()))?;
            let files = write_snapshot(&connection, &out_dir)?;
            info!(markers = files.markers, "snapshot exported");
        }
        Commands::BundleJs { folder, output } => {
            let merged = merge_js_files(&folder, &output)
                .with_context(|| format!("failed to bundle {}", folder.display()))?;
            info!(files = merged, output = %output.display(), "bundle written");
        }
    }
    Ok(())
}
