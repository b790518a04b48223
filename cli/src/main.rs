//! `dirsync` command-line entry point.
//!
//! The binary owns everything the watch core deliberately does not: argument
//! parsing, root validation, logging setup and process exit codes. The
//! record sink here just prints; a transfer layer would consume the same
//! stream.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dirsync_watcher::{OverflowPolicy, WatchSession, WatcherConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirsync", about = "Directory synchronization client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a directory tree and print every classified change.
    Watch {
        /// Root directory to watch.
        root: PathBuf,

        /// Depth of the outgoing record queue.
        #[arg(long, default_value_t = 256)]
        queue_depth: usize,

        /// Behavior when the record queue is full.
        #[arg(long, value_enum, default_value = "block")]
        overflow: OverflowArg,

        /// Print records as JSON lines instead of the human form.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OverflowArg {
    /// Wait for the consumer; never drop a record.
    Block,

    /// Drop the newest record when the queue is full.
    Reject,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::Block => OverflowPolicy::Block,
            OverflowArg::Reject => OverflowPolicy::RejectNewest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Watch {
            root,
            queue_depth,
            overflow,
            json,
        } => watch(root, queue_depth, overflow.into(), json).await,
    }
}

async fn watch(
    root: PathBuf,
    queue_depth: usize,
    overflow: OverflowPolicy,
    json: bool,
) -> Result<()> {
    // Root validation lives out here; the core assumes a valid root and
    // reports failure otherwise.
    let meta = std::fs::metadata(&root)
        .with_context(|| format!("watch directory {} does not exist", root.display()))?;
    if !meta.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let config = WatcherConfig::default()
        .with_queue_depth(queue_depth)
        .with_overflow(overflow);
    let mut session =
        WatchSession::start(&root, &config).context("failed to start watch session")?;
    info!("client started watching {}", root.display());

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            maybe = session.recv() => match maybe {
                Some(record) => {
                    if json {
                        println!("{}", serde_json::to_string(&record)?);
                    } else {
                        println!("{record}");
                    }
                }
                None => {
                    info!("watch stream ended");
                    return Ok(());
                }
            },
        }
    }

    session.shutdown().await;
    Ok(())
}
