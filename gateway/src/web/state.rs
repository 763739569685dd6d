use std::sync::Arc;
use std::time::{Duration, Instant};

use github_mcp::ToolConfig;

use crate::token::TokenStore;

/// Bound on the health endpoint's GitHub reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TokenStore>,
    pub tools: ToolConfig,
    pub version: String,
    pub api_base: String,
    pub started_at: Instant,
    /// Client reserved for the health probe, so a slow probe never ties up
    /// the minting client.
    pub probe: reqwest::Client,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TokenStore>,
        tools: ToolConfig,
        version: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            store,
            tools,
            version: version.into(),
            api_base: api_base.into(),
            started_at: Instant::now(),
            probe: reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?,
        })
    }
}
