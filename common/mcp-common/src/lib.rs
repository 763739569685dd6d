//! MCP Common - Shared utilities for the GitHub MCP gateway
//!
//! This crate provides functionality shared between the gateway binary and
//! the MCP server crate:
//!
//! - **Errors**: the structured error taxonomy returned to callers, both as
//!   HTTP bodies and as MCP tool errors
//! - **Initialization**: standardized tracing setup
//! - **Results**: helper functions for creating `CallToolResult` responses
//!
//! Every error surfaced to a caller is valid JSON with a stable shape:
//!
//! ```json
//! {"error": {"type": "rate_limit_exceeded", "message": "...", "details": {...}}}
//! ```
//!
//! so a calling agent can branch on `type` without string-matching `message`.

pub mod error;
pub mod init;
pub mod result;

// Re-export commonly used items at crate root
pub use error::{ErrorBody, ErrorEnvelope, ErrorKind, IntoMcpError, ResultExt};
pub use init::{init_tracing, InitError};
pub use result::json_success;
