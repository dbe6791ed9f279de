//! floe CLI: one-shot catalog and event ETL to Parquet.

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use floe::{CliArgs, init_metrics, init_tracing, run};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let metrics = match init_metrics() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to initialize metrics: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Starting floe ({} -> {})",
        config.input_root, config.output_root
    );

    let result = run(&config).await;

    if let Some(path) = &config.metrics.textfile {
        if let Err(e) = metrics.write_textfile(path) {
            warn!(error = %e, "Failed to write metrics snapshot");
        }
    }

    match result {
        Ok(summary) => {
            for table in &summary.tables {
                info!("  {}: {} rows", table.table, table.rows);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Job failed: {e}");
            ExitCode::FAILURE
        }
    }
}
