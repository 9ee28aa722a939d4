use anyhow::Result;
use clap::{Parser, Subcommand};
use statekeep::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// statekeep - per-user JSON state behind a signed session cookie
#[derive(Parser)]
#[command(name = "statekeep", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default if no command given)
    Serve {
        /// Override gateway.host
        #[arg(long)]
        host: Option<String>,

        /// Override gateway.port (and the PORT environment variable)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with credentials redacted
    Show,
    /// Print the JSON schema of config.toml
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statekeep=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            statekeep::run_gateway(config).await
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => {
                    let config =
                        Config::resolve(cli.config.as_deref(), |key| std::env::var(key).ok())?;
                    print!("{}", config.to_redacted_toml()?);
                    if let Err(e) = config.validate() {
                        eprintln!("Warning: `serve` would refuse this configuration: {e:#}");
                    }
                }
                ConfigAction::Schema => println!("{}", Config::json_schema()?),
            }
            Ok(())
        }
    }
}
