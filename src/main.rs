use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod charts;
mod db;
mod error;
mod ingest;
mod models;
mod report;

#[derive(Parser)]
#[command(name = "hr-report")]
#[command(about = "Employee performance reporting pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an employee activity CSV into the store, replacing any previous batch
    Load {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "hr.db")]
        db: PathBuf,
    },
    /// Run the aggregation script and write the CSV exports and charts
    Analyze {
        #[arg(long, default_value = "hr.db")]
        db: PathBuf,
        #[arg(long, default_value = "src/queries.sql")]
        sql: PathBuf,
        #[arg(long, default_value = "outputs")]
        outdir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load { csv, db: db_path } => {
            let records = ingest::read_records(&csv)?;
            let pool = db::connect(&db_path).await?;
            let loaded = db::replace_employees(&pool, &records).await?;
            pool.close().await;
            println!(
                "Loaded {loaded} rows from {} into {} (table: {})",
                csv.display(),
                db_path.display(),
                db::EMPLOYEES_TABLE
            );
        }
        Commands::Analyze { db: db_path, sql, outdir } => {
            // Analyze never creates the store; a missing file means load was skipped.
            if !db_path.exists() {
                return Err(error::PipelineError::InputNotFound(db_path).into());
            }
            let pool = db::connect(&db_path).await?;
            report::run_analysis(&pool, &sql, &outdir).await?;
            pool.close().await;
            println!("Artifacts saved to: {}", outdir.display());
        }
    }

    Ok(())
}
