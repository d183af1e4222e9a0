use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "schemagate",
    version,
    about = "Structured-data (JSON-LD) generation and canonical linking service",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve schema endpoints and the admin API
    Serve {
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the bind address
        #[arg(short, long)]
        bind: Option<String>,

        /// Entity keys (type/id) to refresh before serving
        #[arg(long = "warm", value_name = "KEY")]
        warm: Vec<String>,
    },

    /// Generate JSON-LD documents from an entities file
    Generate {
        /// JSON file with one entity or an array of entities
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Site origin used for canonical URLs
        #[arg(long, default_value = "https://example.com")]
        origin: String,

        /// Use the parallel endpoint layout
        #[arg(long, default_value = "false")]
        parallel: bool,
    },

    /// Validate entities without generating documents
    Validate {
        /// JSON file with one entity or an array of entities
        #[arg(short, long)]
        input: PathBuf,

        /// Site origin used to check explicit content URLs
        #[arg(long, default_value = "https://example.com")]
        origin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve { config, bind, warm } => {
            tracing::info!(config = ?config, bind = ?bind, "Starting serve command");
            commands::serve(commands::ServeParams { config, bind, warm }).await?;
        }

        Commands::Generate {
            input,
            output,
            origin,
            parallel,
        } => {
            tracing::info!(
                input = %input.display(),
                output = ?output,
                origin = %origin,
                "Starting generate command"
            );
            commands::generate(input, output, origin, parallel).await?;
        }

        Commands::Validate { input, origin } => {
            tracing::info!(input = %input.display(), "Starting validate command");
            commands::validate(input, origin)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("schemagate=debug,tower_http=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new("schemagate=info,warn")
        }
    });

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
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
