use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use column_splitter::commands::{split_status, submit_split_file, SplitStatusResponse};
use column_splitter::{logging, AppState, SplitterConfig};

/// Split a CSV or Excel file into one file per distinct value of a column.
#[derive(Debug, Parser)]
#[command(name = "column-splitter", version, about)]
struct Cli {
    /// CSV (.csv) or Excel (.xlsx, .xls) file to split.
    file: PathBuf,

    /// Column whose values decide the output file of each row.
    #[arg(short, long)]
    column: String,

    /// Directory for uploads, partition files and archives.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Maximum CSV rows read per chunk.
    #[arg(long)]
    chunk_rows: Option<u64>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value_t = 3600)]
    timeout_secs: u64,
}

fn build_config(cli: &Cli) -> Result<SplitterConfig> {
    let mut config = SplitterConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(out) = &cli.out {
        config.upload_dir = out.join("uploads");
        config.output_dir = out.join("output");
        config.archive_dir = out.join("archives");
    }
    if let Some(rows) = cli.chunk_rows {
        config.csv_chunk_rows = rows;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    logging::init(&config.logging);

    let state = AppState::new(config).context("Failed to start job manager")?;

    let started = submit_split_file(&state, &cli.file, &cli.column).await?;
    tracing::info!(job_id = %started.job_id, "Submitted");

    state
        .jobs
        .wait_for_terminal(&started.job_id, Duration::from_secs(cli.timeout_secs))
        .await?;
    let status = split_status(&state, started.job_id.as_str()).await?;
    state.shutdown().await;

    match status {
        SplitStatusResponse::Ready {
            archive_path,
            files,
            ..
        } => {
            eprintln!("Created {} file(s)", files.len());
            println!("{}", archive_path.display());
            Ok(())
        }
        SplitStatusResponse::Failed { error, .. } => {
            match error.action {
                Some(action) => bail!("{}: {} ({})", error.title, error.message, action),
                None => bail!("{}: {}", error.title, error.message),
            }
        }
        SplitStatusResponse::Processing { state: job_state } => {
            bail!("Job {} is still {}", started.job_id, job_state)
        }
    }
}
