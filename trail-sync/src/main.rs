//! Trail CLI
//!
//! Drives a trail session against the file-backed store.
//!
//! ## Usage
//!
//! ```bash
//! # Show progress for a user
//! trail --user alice status
//!
//! # Record 8 of 10 correct answers on a node
//! trail --user alice submit sec1-n1 8 10
//!
//! # Complete a node without a score
//! TRAIL_USER=alice trail complete sec1-n2
//!
//! # Start over
//! trail --user alice reset
//!
//! # List nodes and their routes
//! trail routes
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trail_engine::Catalog;
use trail_sync::{
    spawn_logging_listener, FileStore, IdentityHandle, LoadOutcome, SyncConfig, TrailSession,
    UserId,
};

#[derive(Parser, Debug)]
#[command(name = "trail")]
#[command(about = "Learning trail progress for Moneva")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory holding progress documents
    #[arg(long, env = "TRAIL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Signed-in user id
    #[arg(short, long, env = "TRAIL_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the trail summary as JSON
    Status,
    /// Record a scored attempt
    Submit {
        node: String,
        correct: u32,
        total: u32,
    },
    /// Complete a node at 100%
    Complete { node: String },
    /// Wipe all progress
    Reset,
    /// List every node with its route
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("trail_sync=info".parse()?)
                .add_directive("trail_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    let catalog = Arc::new(Catalog::standard());

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let store = Arc::new(FileStore::new(&config.data_dir).await?);
    let identity = Arc::new(IdentityHandle::new(args.user.map(UserId::new)));
    let session = TrailSession::new(catalog, identity, store, config);
    let listener = spawn_logging_listener(session.events());

    if let LoadOutcome::Degraded(reason) = session.start().await {
        anyhow::bail!("could not read stored progress: {}", reason);
    }

    match args.command {
        Command::Status => {}
        Command::Submit {
            node,
            correct,
            total,
        } => {
            let outcome = session.submit_score(&node, correct, total)?;
            println!(
                "{}: {}% (+{} XP){}",
                node,
                outcome.score,
                outcome.xp_gain,
                if outcome.completed { ", completed" } else { "" }
            );
        }
        Command::Complete { node } => {
            let outcome = session.complete_by_id(&node)?;
            println!("{}: completed (+{} XP)", node, outcome.xp_gain);
        }
        Command::Reset => {
            session.reset()?;
            println!("Progress reset");
        }
        Command::Routes => {
            for node in session.catalog().nodes() {
                println!("{}\t{}\t{}", node.id, node.title, session.route_for(&node.id));
            }
            return Ok(());
        }
    }

    session.flush().await?;
    println!("{}", serde_json::to_string_pretty(&session.summary())?);

    listener.abort();
    Ok(())
}
