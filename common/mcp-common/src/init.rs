//! Tracing initialization
//!
//! Logging goes to stderr so stdout stays clean for anything piping the
//! process. Set `LOG_FORMAT=json` for structured JSON output (production /
//! log aggregation); default is human-readable text.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The default filter directive built from the crate name was unparsable.
#[derive(Debug, thiserror::Error)]
#[error("invalid tracing filter directive: {0}")]
pub struct InitError(#[from] tracing_subscriber::filter::ParseError);

/// Initialize tracing for a gateway component.
///
/// Filtering follows `RUST_LOG`, with a default `info` directive for the
/// named crate.
///
/// # Example
///
/// ```rust,ignore
/// mcp_common::init_tracing("gateway")?;
/// ```
pub fn init_tracing(crate_name: &str) -> Result<(), InitError> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    Ok(())
}
