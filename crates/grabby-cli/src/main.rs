//! grabby — drive merged readers from the command line.
//!
//! # Usage
//!
//! ```text
//! grabby simulate --members 3 --messages 500 --kill 1 --format json
//! grabby config --queue jobs --track
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "grabby",
    about = "grabby — fan-in reader for replicated queues",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the streams of in-memory members and report what was read.
    ///
    /// Every member is seeded with `--messages` payloads and ends once they
    /// are drained. `--kill` members are failed halfway through the run.
    Simulate {
        /// Number of members in the simulated cluster
        #[arg(short, long, default_value = "3")]
        members: usize,
        /// Messages preloaded on each member
        #[arg(long, default_value = "100")]
        messages: usize,
        /// Members to fail mid-run
        #[arg(short, long, default_value = "0")]
        kill: usize,
        /// Reader config file (TOML); overrides --queue and --track
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Queue name
        #[arg(short, long, default_value = "jobs")]
        queue: String,
        /// Track outstanding reads
        #[arg(long)]
        track: bool,
        /// Give up and close the reader after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print a reader config as TOML
    Config {
        #[arg(short, long, default_value = "jobs")]
        queue: String,
        #[arg(long)]
        track: bool,
        #[arg(long)]
        stats_scope: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grabby=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            members,
            messages,
            kill,
            config,
            queue,
            track,
            timeout_secs,
            format,
        } => {
            let options = commands::simulate::Options {
                members,
                messages,
                kill,
                timeout_secs,
            };
            let config = commands::load_config(config.as_deref(), &queue, track, None)?;
            commands::simulate::run(&config, &options, &format).await
        }
        Commands::Config {
            queue,
            track,
            stats_scope,
        } => {
            let config = commands::load_config(None, &queue, track, stats_scope.as_deref())?;
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
