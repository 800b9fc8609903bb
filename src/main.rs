//! acd-token - keep acd_cli's OAuth token fresh
//!
//! Signs in to the acd_cli OAuth endpoint the way a browser would and
//! writes the returned token to acd_cli's `oauth_data` settings file.
//! Installing acd_cli and mounting the drive are left to the caller.

mod auth;
mod config;
mod store;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser)]
#[command(name = "acd-token")]
#[command(about = "Obtain and refresh the acd_cli OAuth token", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: platform config dir/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Settings that override the config file
#[derive(Args)]
struct Overrides {
    /// OAuth endpoint serving the sign-in form
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Account email
    #[arg(long, global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "ACD_TOKEN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// acd_cli settings directory
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Owner of the token file
    #[arg(long, global = true)]
    user: Option<String>,

    /// Group of the token file
    #[arg(long, global = true)]
    group: Option<String>,

    /// Refresh tokens older than this many seconds
    #[arg(long, global = true)]
    max_age: Option<u64>,

    /// User-Agent presented to the provider
    #[arg(long, global = true)]
    user_agent: Option<String>,
}

impl From<Overrides> for Config {
    fn from(o: Overrides) -> Self {
        Config {
            endpoint: o.endpoint,
            email: o.email,
            password: o.password,
            settings_dir: o.settings_dir,
            user: o.user,
            group: o.group,
            max_age_secs: o.max_age,
            user_agent: o.user_agent,
            request_timeout_secs: None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and write a new token if the stored one is missing or stale
    Refresh {
        /// Sign in even if the stored token is still fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Show the stored token's age and freshness
    Status,

    /// Delete the stored token
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let file_config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = file_config.merge(cli.overrides.into());

    match cli.command {
        Commands::Refresh { force } => match auth::refresh(&config, force).await? {
            auth::RefreshOutcome::Fresh => {
                println!("Token is fresh. Use --force to sign in anyway.");
            }
            auth::RefreshOutcome::Refreshed => {
                println!("Token refreshed.");
            }
        },
        Commands::Status => {
            auth::status(&config)?;
        }
        Commands::Clear => {
            auth::clear(&config)?;
        }
    }

    Ok(())
}
