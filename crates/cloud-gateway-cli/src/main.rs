mod commands;
mod config;
mod providers;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloud_gateway::ProviderId;
use cloud_gateway_sheets::ParseCache;
use tracing_subscriber::EnvFilter;

use crate::server::AppState;

#[derive(Parser)]
#[command(name = "cloud-gateway")]
#[command(about = "Move files, messages and log events through configured cloud providers")]
struct Cli {
    /// Config file (defaults to ~/.config/cloud-gateway/gateway.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe every configured provider
    Health,
    /// List objects in a storage provider
    List {
        provider: String,
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Upload a local file
    Upload {
        provider: String,
        file: PathBuf,
        /// Object key (defaults to the file name)
        #[arg(long)]
        key: Option<String>,
    },
    /// Download an object
    Download {
        provider: String,
        key: String,
        /// Write the bytes here instead of embedding them as base64
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete an object
    Delete { provider: String, key: String },
    /// Publish a message to a queue provider
    Publish { provider: String, message: String },
    /// Send a structured event to the log sink
    Log {
        #[arg(long, default_value = "cloud-gateway")]
        source: String,
        #[arg(long, default_value = "manual")]
        sourcetype: String,
        /// Event payload as JSON
        event: String,
    },
    /// Parse a spreadsheet and print its sheet summary
    Parse { provider: String, key: String },
    /// Parse a spreadsheet and print one sheet's rows
    Sheet {
        provider: String,
        key: String,
        /// Sheet name (defaults to the first sheet)
        #[arg(long)]
        name: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Overrides `server.bind` from the config file
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let app_config = config::load_config(cli.config.as_deref())?;
    let gateway = Arc::new(providers::build_gateway(&app_config)?);
    let cache = ParseCache::new(gateway.clone(), app_config.cache.to_cache_config());

    let success = match cli.command {
        Command::Health => commands::print(&commands::health::run(&gateway).await)?,
        Command::List { provider, prefix } => commands::print(
            &commands::objects::list(&gateway, &ProviderId::new(provider), prefix.as_deref())
                .await,
        )?,
        Command::Upload {
            provider,
            file,
            key,
        } => {
            let uploaded = commands::objects::upload(
                &gateway,
                &ProviderId::new(provider),
                &file,
                key.as_deref(),
            )
            .await?;
            let success = commands::print(&uploaded.envelope)?;
            // Flush the audit event before the runtime shuts down.
            if let Some(audit) = uploaded.audit
                && let Err(e) = audit.await
            {
                tracing::warn!(error = %e, "upload audit event task failed");
            }
            success
        }
        Command::Download {
            provider,
            key,
            output,
        } => commands::print(
            &commands::objects::download(
                &gateway,
                &ProviderId::new(provider),
                &key,
                output.as_deref(),
            )
            .await?,
        )?,
        Command::Delete { provider, key } => commands::print(
            &commands::objects::delete(&gateway, &ProviderId::new(provider), &key).await,
        )?,
        Command::Publish { provider, message } => commands::print(
            &commands::messaging::publish(&gateway, &ProviderId::new(provider), &message).await,
        )?,
        Command::Log {
            source,
            sourcetype,
            event,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&event).context("event must be valid JSON")?;
            commands::print(
                &commands::messaging::log(&gateway, &source, &sourcetype, payload).await,
            )?
        }
        Command::Parse { provider, key } => commands::print(
            &commands::sheets::parse(&cache, &ProviderId::new(provider), &key).await,
        )?,
        Command::Sheet {
            provider,
            key,
            name,
        } => commands::print(
            &commands::sheets::sheet(&cache, &ProviderId::new(provider), &key, name.as_deref())
                .await,
        )?,
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| app_config.server.bind.clone());
            let sweep_every = app_config
                .cache
                .to_cache_config()
                .max_age
                .map(|age| (age / 4).max(Duration::from_secs(1)));
            server::serve(AppState { gateway, cache }, &bind, sweep_every).await?;
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
