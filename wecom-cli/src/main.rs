//! WeCom CLI
//!
//! Command-line interface for sending WeCom application messages and
//! inspecting the stored access token.
//!
//! # Usage
//!
//! ```bash
//! # Send a text message to two users
//! wecom send-text --user alice --user bob "Deploy finished"
//!
//! # Print the current access token, refreshing it if needed
//! wecom token --format json
//!
//! # Validate the configuration file
//! wecom check-config
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};
use wecom_core::{ClientConfig, WecomClient};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "wecom")]
#[command(about = "Send WeCom application messages and manage access tokens")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a text message
    SendText {
        /// Message text
        content: String,

        /// Recipient user ID (repeatable; "@all" for everyone)
        #[arg(short, long = "user")]
        users: Vec<String>,

        /// Recipient department ID (repeatable)
        #[arg(short, long = "party")]
        parties: Vec<String>,

        /// Recipient tag ID (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Sending application ID; defaults to `agent_id` from the config
        #[arg(short, long)]
        agent_id: Option<i64>,

        /// Send as a confidential message
        #[arg(long)]
        safe: bool,
    },

    /// Print a usable access token
    Token {
        /// Exchange for a new token even if the stored one is valid
        #[arg(short, long)]
        refresh: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Remove the stored access token
    ClearToken,

    /// Load the configuration and report problems
    CheckConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::SendText {
            content,
            users,
            parties,
            tags,
            agent_id,
            safe,
        } => {
            let request = commands::SendTextArgs {
                content,
                users,
                parties,
                tags,
                agent_id: agent_id.or(config.agent_id),
                safe,
            };
            commands::send_text(&build_client(&config)?, request, &mut out).await
        }
        Commands::Token { refresh, format } => {
            let json = format == OutputFormat::Json;
            commands::token(&build_client(&config)?, refresh, json, &mut out).await
        }
        Commands::ClearToken => commands::clear_token(&build_client(&config)?, &mut out).await,
        Commands::CheckConfig => commands::check_config(&config, &mut out),
    }
}

fn build_client(config: &ClientConfig) -> Result<WecomClient> {
    WecomClient::from_config(config).context("Failed to create WeCom client")
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ClientConfig> {
    let path = match path {
        Some(path) => path,
        None => ClientConfig::default_path().context("Failed to locate configuration directory")?,
    };

    tracing::debug!("Loading configuration from {:?}", path);
    ClientConfig::load_from_path(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
