//! tidemark CLI
//!
//! Command-line tools for tidemark sync streams.
//!
//! # Commands
//!
//! - `list` - List streams with a stored checkpoint
//! - `show` - Display one stream's checkpoint
//! - `init` - Create a checkpoint at a start value
//! - `clear` - Delete a checkpoint
//! - `sync` - Sync a JSON-lines file through a stream

mod commands;
mod error;
mod store;
mod value;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use store::StoreKind;
use tracing_subscriber::EnvFilter;
use value::ValueKind;

/// Checkpointed incremental sync tools.
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Checkpoint store backend
    #[arg(global = true, long, value_enum, default_value = "file")]
    store: StoreKind,

    /// State directory (file store) or database file (sqlite store)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Table holding checkpoints (sqlite store)
    #[arg(global = true, long, default_value = tidemark_store::DEFAULT_TABLE)]
    table: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List streams with a stored checkpoint
    List,

    /// Display one stream's checkpoint
    Show {
        /// Stream name
        stream: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create a checkpoint at a start value
    Init {
        /// Stream name
        stream: String,

        /// Initial checkpoint value
        #[arg(short, long)]
        start: String,

        /// How to interpret the start value
        #[arg(short, long, value_enum, default_value = "auto")]
        kind: ValueKind,
    },

    /// Delete a checkpoint
    Clear {
        /// Stream name
        stream: String,
    },

    /// Sync a JSON-lines file through a stream, printing new records
    Sync {
        /// Stream name
        stream: String,

        /// JSON-lines input, one object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Field holding each record's checkpoint key
        #[arg(long)]
        key: String,

        /// Page size
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Declare that no two records share a key
        #[arg(long)]
        unique: bool,

        /// Stop after this many cycles (0 = unbounded)
        #[arg(long, default_value = "0")]
        max_iterations: u64,

        /// Stop once the input has nothing new instead of waiting. Without
        /// it, non-unique input re-emits its last key group every cycle
        #[arg(long)]
        until_caught_up: bool,

        /// Create the checkpoint at this value
        #[arg(long)]
        start: Option<String>,

        /// Dry-run one page from this value without saving
        #[arg(long)]
        test: Option<String>,

        /// How to interpret key, start and test values
        #[arg(short, long, value_enum, default_value = "auto")]
        kind: ValueKind,

        /// Seconds to wait after an empty page
        #[arg(long, default_value = "3")]
        idle_secs: u64,

        /// Records written per output batch
        #[arg(long, default_value = "100")]
        batch: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries synced records
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = store::open(cli.store, cli.path.as_deref(), &cli.table)?;

    match cli.command {
        Commands::List => commands::list::run(&store)?,
        Commands::Show { stream, format } => commands::show::run(&store, &stream, &format)?,
        Commands::Init {
            stream,
            start,
            kind,
        } => commands::init::run(store, &stream, &start, kind)?,
        Commands::Clear { stream } => commands::clear::run(&store, &stream)?,
        Commands::Sync {
            stream,
            input,
            key,
            limit,
            unique,
            max_iterations,
            until_caught_up,
            start,
            test,
            kind,
            idle_secs,
            batch,
        } => {
            let options = commands::sync::SyncOptions {
                input,
                key,
                limit,
                unique,
                max_iterations,
                until_caught_up,
                start,
                test,
                kind,
                idle_secs,
                batch,
            };
            commands::sync::run(store, &stream, &options)?;
        }
    }

    Ok(())
}
