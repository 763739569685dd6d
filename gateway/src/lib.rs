//! GitHub MCP gateway
//!
//! A thin HTTP bridge in front of the MCP server: each inbound `POST /mcp`
//! connection presents an opaque API key, the gateway resolves it to a GitHub
//! credential (a direct token or a freshly minted GitHub App installation
//! token), binds the credential to that connection, and streams protocol
//! bytes between the HTTP connection and the MCP transport until the client
//! disconnects.
//!
//! Modules:
//!
//! - [`config`] - environment-variable validation, applied once at startup
//! - [`token`] - caller-key -> GitHub credential resolution and the
//!   per-installation token cache
//! - [`web`] - the axum server: `/mcp` bridging and `/health`

pub mod config;
pub mod token;
pub mod web;
