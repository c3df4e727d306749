// ABOUTME: CLI entry point for mysql-snapshot
// ABOUTME: Parses commands, loads configuration and routes to handlers

use clap::{Parser, Subcommand};
use mysql_snapshot::commands::{self, RestoreOptions};
use mysql_snapshot::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysql-snapshot")]
#[command(about = "Streaming MySQL backup, restore and schema verification", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a database to a SQL dump file
    Export {
        #[arg(long)]
        url: String,
        /// Destination file
        #[arg(long)]
        output: PathBuf,
        /// Rows per INSERT statement (overrides dump.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Path to a mysql-snapshot TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replay a SQL dump file into a database
    Restore {
        #[arg(long)]
        url: String,
        /// Dump file to replay
        #[arg(long)]
        input: PathBuf,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Path to a mysql-snapshot TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compare the tables of a dump with a live database without changing it
    Verify {
        #[arg(long)]
        url: String,
        /// Dump file to inspect
        #[arg(long)]
        input: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Path to a mysql-snapshot TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set.
    // Logs go to stderr so --json output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            url,
            output,
            batch_size,
            config,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(batch_size) = batch_size {
                config.dump.batch_size = batch_size;
                config.validate()?;
            }
            let summary = commands::export(&url, &output, &config).await?;
            println!(
                "✓ Exported {} table(s), {} row(s) to {}",
                summary.tables.len(),
                summary.total_rows(),
                output.display()
            );
            if !summary.failed_tables.is_empty() {
                println!("⚠ {} table(s) could not be read:", summary.failed_tables.len());
                for failure in &summary.failed_tables {
                    println!("  ✗ {}", failure);
                }
            }
            Ok(())
        }
        Commands::Restore {
            url,
            input,
            yes,
            json,
            config,
        } => {
            let config = Config::load(config.as_deref())?;
            commands::restore(&url, &input, RestoreOptions { yes, json }, &config).await?;
            Ok(())
        }
        Commands::Verify {
            url,
            input,
            json,
            config,
        } => {
            let config = Config::load(config.as_deref())?;
            commands::verify(&url, &input, json, &config).await?;
            Ok(())
        }
    }
}
