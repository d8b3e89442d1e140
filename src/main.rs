//! Tier Buffer - Binary Entry Point
//!
//! Samples a random value every tick into a file-backed persistent tier and
//! dumps it to JSON files. Each line read from stdin is an action:
//! `dump`, `stats`, `quit`, or anything else to log it as an event.
//! When stdin closes the pipeline keeps running until Ctrl+C.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tier_buffer::tier::{
    FileKvStore, FileSink, Pipeline, PipelineConfig, PromotionScheduler, RandomSource,
    SchedulerHandle, TierError, TierResult,
};

#[derive(Debug, Parser)]
#[command(name = "tier-buffer", version, about = "Two-tier event buffering pipeline")]
struct Args {
    /// Directory holding the persistent tier
    #[arg(long, env = "TIER_DATA_DIR", default_value = "data/tier")]
    data_dir: PathBuf,

    /// Directory receiving exported dumps
    #[arg(long, env = "TIER_DUMP_DIR", default_value = "data/dumps")]
    dump_dir: PathBuf,

    /// JSON config file (camelCase keys)
    #[arg(long, env = "TIER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> TierResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides()?;

    let mut store = FileKvStore::open(&args.data_dir).map_err(|e| {
        TierError::Config(format!("cannot open {}: {}", args.data_dir.display(), e))
    })?;
    if let Some(capacity) = config.max_store_entries {
        store = store.with_capacity(capacity);
    }

    let mut pipeline = Pipeline::new(config, store, FileSink::new(&args.dump_dir))?;
    pipeline.reconcile()?;
    let stats = pipeline.stats()?;
    tracing::info!(
        events = stats.events_stored,
        batches = stats.batches_stored,
        data_dir = %args.data_dir.display(),
        dump_dir = %args.dump_dir.display(),
        "persistent tier opened"
    );

    let (handle, task) = PromotionScheduler::new(pipeline, RandomSource::new()).spawn();

    tokio::select! {
        result = read_commands(BufReader::new(tokio::io::stdin()), &handle) => match result {
            Ok(InputEnd::Quit) => {}
            Ok(InputEnd::Eof) => {
                tracing::info!("stdin closed, running until interrupted");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "cannot listen for Ctrl+C");
                }
            }
            Err(e) => tracing::error!(error = %e, "stdin closed with error"),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }

    if let Err(e) = handle.shutdown().await {
        tracing::warn!(error = %e, "scheduler already stopped");
    }
    if let Err(e) = task.await {
        tracing::error!(error = %e, "scheduler task failed");
    }
    Ok(())
}

/// Why the command reader stopped
#[derive(Debug, PartialEq, Eq)]
enum InputEnd {
    /// `quit`/`exit`, or the scheduler is gone
    Quit,
    Eof,
}

async fn read_commands<R>(reader: R, handle: &SchedulerHandle) -> std::io::Result<InputEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match line {
            "quit" | "exit" => return Ok(InputEnd::Quit),
            "dump" => handle.dump_now().await.map(|m| {
                println!("dumped {}", m.file_name());
            }),
            "stats" => handle.stats().await.map(|s| {
                println!(
                    "events stored: {}, samples buffered: {}, batches stored: {}, dumps: {} ({:?})",
                    s.events_stored, s.samples_buffered, s.batches_stored, s.dumps_completed, s.state
                );
            }),
            event => handle.log_event(event).await.map(|o| {
                println!("logged event {}", o.index);
                if let Some(e) = o.export_error {
                    eprintln!("export failed: {}", e);
                }
            }),
        };

        if let Err(e) = result {
            eprintln!("error: {}", e);
            if matches!(e, TierError::SchedulerStopped) {
                return Ok(InputEnd::Quit);
            }
        }
    }

    Ok(InputEnd::Eof)
}
