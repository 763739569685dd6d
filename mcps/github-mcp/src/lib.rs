//! GitHub MCP server
//!
//! The gateway constructs one [`GitHubMcpServer`] per inbound connection,
//! carrying the GitHub credential resolved for that caller. The credential
//! lives only in that server instance - it is never shared across
//! connections and is dropped when the connection closes.

mod client;
mod server;
mod types;

pub use client::GitHubClient;
pub use server::{GitHubMcpServer, ToolConfig};
pub use types::{Issue, PullRequest, User};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
