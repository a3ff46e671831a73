use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "attache")]
#[command(about = "Replicated attachment storage tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "attache.toml", env = "ATTACHE_CONFIG")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a file on the primary and replicate it to every secondary
    Save {
        /// File to upload
        file: PathBuf,
    },

    /// Resolve an attachment to a local file, searching secondaries on a miss
    Fetch {
        /// Attachment path, e.g. attachment/20261016/3f1c....png
        path: String,
    },

    /// Delete an attachment from every container
    Delete {
        /// Attachment path
        path: String,
    },

    /// Map a local file on the primary back to its attachment path
    Resolve {
        /// Local file under the primary's root
        file: PathBuf,
    },

    /// Check whether a request target would be served as an attachment
    Route {
        /// Request target, e.g. /attachment/20261016/a.png
        target: String,
    },

    /// List the configured containers
    Containers,
}

fn init_tracing(config: &attache::config::ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.log_format.clone());

    // Logs go to stderr so command output stays pipeable.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = attache::Config::load_or_default(&cli.config)?;
    init_tracing(&config.observability);
    tracing::debug!("Config file: {}", cli.config.display());

    let manager = attache::ContainerFactory::build_manager(&config)?;

    let output = match cli.command {
        Commands::Save { file } => commands::run_save(&manager, &file).await?,
        Commands::Fetch { path } => commands::run_fetch(&manager, &path).await?,
        Commands::Delete { path } => commands::run_delete(&manager, &path).await,
        Commands::Resolve { file } => commands::run_resolve(&manager, &file)?,
        Commands::Route { target } => commands::run_route(&manager, &target).await,
        Commands::Containers => commands::run_containers(&manager),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", commands::render_text(&output));
    }

    Ok(())
}
