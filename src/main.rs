use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{check_config, run, serve, RunParams, ServeParams};

#[derive(Parser)]
#[command(
    name = "autopost",
    version,
    about = "Scheduled, human-approved publishing queue for generated content",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, env = "AUTOPOST_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Configuration file (TOML); environment variables are used when absent
    #[arg(short, long, global = true, env = "AUTOPOST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch with approval on this terminal
    Run {
        /// Topics, one item each
        items: Vec<String>,

        /// File with one topic per line
        #[arg(short = 'f', long)]
        items_file: Option<PathBuf>,

        /// Hours between items
        #[arg(long, conflicts_with = "daily_times")]
        interval: Option<f64>,

        /// Times of day (HH:MM) by batch position, comma separated
        #[arg(long, value_delimiter = ',')]
        daily_times: Vec<String>,

        /// IANA timezone for daily times
        #[arg(long)]
        timezone: Option<String>,

        /// Ask for approval before publishing each item
        #[arg(short, long)]
        approve: bool,

        /// Publish live instead of as drafts
        #[arg(long)]
        live: bool,
    },

    /// Start the control server
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration
    CheckConfig {
        /// Also check that the endpoints respond
        #[arg(long)]
        probe: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Run {
            items,
            items_file,
            interval,
            daily_times,
            timezone,
            approve,
            live,
        } => {
            tracing::info!(
                items = items.len(),
                items_file = ?items_file,
                interval = ?interval,
                daily_times = ?daily_times,
                approve,
                live,
                "Starting run command"
            );
            run(RunParams {
                config: cli.config,
                items,
                items_file,
                interval_hours: interval,
                daily_times,
                timezone,
                approve,
                live,
            })
            .await?;
        }

        Commands::Serve { host, port } => {
            tracing::info!(host = ?host, port = ?port, "Starting serve command");
            serve(ServeParams {
                config: cli.config,
                host,
                port,
            })
            .await?;
        }

        Commands::CheckConfig { probe } => {
            check_config(cli.config, probe).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let default_level = std::env::var("AUTOPOST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("autopost=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("autopost={default_level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
