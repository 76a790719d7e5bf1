//! cgr-keyring - keyring backend issuing chainctl tokens for *.cgr.dev

use cgr_keyring_cli::commands;
use cgr_keyring_config::{ConfigError, GlobalConfig};
use cgr_keyring_core::CredentialResolver;
use cgr_keyring_issuer::{CancellationToken, CliIssuer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "cgr-keyring")]
#[command(author, version, about = "Keyring backend for *.cgr.dev package repositories", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(long, global = true, env = "CGR_KEYRING_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token for a service
    Get {
        /// Service URL, e.g. https://libraries.cgr.dev/python/simple
        service: String,
        /// Account name (accepted for keyring compatibility)
        account: String,
        /// Print a JSON credential with username and password
        #[arg(long)]
        json: bool,
    },

    /// Store a password (not supported, tokens are issued on demand)
    Set {
        service: String,
        account: String,
    },

    /// Delete a password (not supported, tokens are issued on demand)
    Del {
        service: String,
        account: String,
    },

    /// Print shell exports with tokens for the configured package indexes
    Env,

    /// Run a command with tokens for the configured package indexes in its environment
    Exec {
        /// Command to run
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },

    /// Check that the token tool is installed and working
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries tokens
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let (config, config_path) = match cli.config {
        Some(path) => (GlobalConfig::load_from(&path)?, Some(path)),
        None => match GlobalConfig::load() {
            Ok(config) => (config, GlobalConfig::config_path().ok()),
            Err(ConfigError::NoConfigDir) => (GlobalConfig::default(), None),
            Err(e) => return Err(e.into()),
        },
    };

    let issuer = Arc::new(CliIssuer::from_config(&config.issuer));
    let resolver = CredentialResolver::from_config(&config.resolver, issuer);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let code = match cli.command {
        Commands::Get {
            service,
            account,
            json,
        } => {
            if commands::get(&resolver, &service, &account, json, &cancel, &mut stdout).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Set { service, account } => {
            commands::set(&resolver, &service, &account).await?;
            ExitCode::SUCCESS
        }
        Commands::Del { service, account } => {
            commands::delete(&resolver, &service, &account).await?;
            ExitCode::SUCCESS
        }
        Commands::Env => {
            commands::env(&resolver, &config.hook.targets, &cancel, &mut stdout).await?;
            ExitCode::SUCCESS
        }
        Commands::Exec { cmd } => {
            let status = commands::exec(&resolver, &config.hook.targets, &cmd, &cancel).await?;
            ExitCode::from(u8::try_from(status).unwrap_or(1))
        }
        Commands::Check => {
            if commands::check(&resolver, &cancel, &mut stdout).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Config { init } => {
            commands::config(&config, config_path.as_deref(), init, &mut stdout)?;
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
