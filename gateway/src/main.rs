use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use gateway::config::{Config, DEFAULT_TOKEN_MAP_ENV};
use gateway::token::{InstallationTokenStore, StaticTokenStore, TokenStore};
use gateway::web::{self, AppState};
use github_mcp::ToolConfig;

#[derive(Parser)]
#[command(name = "mcp-gateway")]
#[command(about = "HTTP-to-MCP bridge with per-caller GitHub credential resolution")]
struct Cli {
    /// Port to listen on (overrides the PORT env var)
    #[arg(long)]
    listen: Option<u16>,

    /// GitHub host (overrides the GITHUB_HOST env var)
    #[arg(long)]
    github_host: Option<String>,

    /// Version string reported by /health
    #[arg(long, default_value = "mcp-gateway")]
    version_string: String,

    /// Name of the env var holding the caller-key mapping
    #[arg(long, default_value = DEFAULT_TOKEN_MAP_ENV)]
    token_map_env: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    mcp_common::init_tracing("gateway")?;

    let cli = Cli::parse();

    let mut config =
        Config::from_env(&cli.token_map_env).context("configuration validation failed")?;
    if let Some(host) = cli.github_host {
        config.github_host = host;
    }
    let port = cli.listen.unwrap_or(config.port);
    let api_base = config.api_base();

    tracing::info!(
        version = %cli.version_string,
        port,
        github_host = %config.github_host,
        read_only = config.read_only,
        lockdown = config.lockdown,
        mappings = config.token_map.len(),
        "starting mcp gateway"
    );

    let store: Arc<dyn TokenStore> = match &config.app {
        Some(app) => {
            tracing::info!(app_id = app.app_id, "github app credentials detected");
            Arc::new(
                InstallationTokenStore::new(
                    app.app_id,
                    &app.private_key_pem,
                    config.token_map.clone(),
                    api_base.clone(),
                )
                .context("failed to initialize installation token store")?,
            )
        }
        None => {
            tracing::info!("no github app credentials, using static token store");
            Arc::new(StaticTokenStore::new(config.token_map.clone()))
        }
    };

    let tools = ToolConfig {
        api_base: api_base.clone(),
        read_only: config.read_only,
        lockdown: config.lockdown,
    };
    let state = AppState::new(store, tools, cli.version_string, api_base)
        .context("failed to build health probe client")?;

    web::serve(state, port).await
}
