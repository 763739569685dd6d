//! Structured error taxonomy for the gateway
//!
//! Every error a caller can observe is categorized by an [`ErrorKind`] and
//! carried in an [`ErrorBody`] with a human-readable message plus a
//! kind-specific `details` payload. The wire shape is stable so agents can
//! branch on `type` programmatically.

use chrono::{DateTime, Utc};
use rmcp::ErrorData as McpError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Category of a caller-visible error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller credentials were present but not accepted upstream
    AuthenticationError,
    /// The authenticated identity lacks permission for the operation
    AuthorizationError,
    /// Upstream rate limit exhausted
    RateLimitExceeded,
    /// Requested resource does not exist
    NotFound,
    /// Malformed or rejected input
    ValidationError,
    /// Generic GitHub API failure passthrough
    GithubApiError,
    /// Unexpected internal failure
    InternalError,
    /// Wrong HTTP method on an endpoint
    MethodNotAllowed,
    /// No usable `Authorization: Bearer` header on the request
    MissingAuthorization,
    /// Bearer key was present but not found in the token mapping
    InvalidToken,
}

impl ErrorKind {
    /// HTTP status this kind maps to when returned as an HTTP response.
    pub fn http_status(self) -> u16 {
        match self {
            Self::AuthenticationError | Self::MissingAuthorization | Self::InvalidToken => 401,
            Self::AuthorizationError => 403,
            Self::RateLimitExceeded => 429,
            Self::NotFound => 404,
            Self::ValidationError => 400,
            Self::GithubApiError => 502,
            Self::MethodNotAllowed => 405,
            Self::InternalError => 500,
        }
    }
}

/// A single structured error: machine-readable kind, human message,
/// kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Wire wrapper: `{"error": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Wraps this body in the `{"error": ...}` envelope.
    pub fn envelope(self) -> ErrorEnvelope {
        ErrorEnvelope { error: self }
    }

    /// Rate-limit error with the payload agents need to back off correctly.
    ///
    /// `retry_after` is derived from `reset_at` and clamped at zero so a
    /// reset time in the past never produces a negative wait.
    pub fn rate_limit(limit: i64, remaining: i64, reset_at: DateTime<Utc>) -> Self {
        let retry_after = (reset_at - Utc::now()).num_seconds().max(0);
        Self::new(
            ErrorKind::RateLimitExceeded,
            format!(
                "GitHub API rate limit exceeded. Limit: {}, Remaining: {}. Resets at {}",
                limit,
                remaining,
                reset_at.to_rfc3339()
            ),
        )
        .with_details(json!({
            "limit": limit,
            "remaining": remaining,
            "reset_at": reset_at.to_rfc3339(),
            "retry_after": retry_after,
        }))
    }

    /// Permission-denied error, optionally naming the scopes that would be
    /// required and the resource that was touched.
    pub fn permission_denied(
        message: impl Into<String>,
        required_scopes: &[&str],
        resource: Option<&str>,
    ) -> Self {
        let mut details = json!({
            "required_scopes": required_scopes,
        });
        if let Some(resource) = resource {
            details["resource"] = json!(resource);
        }
        Self::new(ErrorKind::AuthorizationError, message).with_details(details)
    }

    /// Upstream authentication failure (credentials rejected by GitHub).
    pub fn authentication(message: impl Into<String>, hint: Option<&str>) -> Self {
        let body = Self::new(ErrorKind::AuthenticationError, message);
        match hint {
            Some(hint) => body.with_details(json!({ "hint": hint })),
            None => body,
        }
    }

    /// Generic GitHub API error carrying the upstream status code.
    pub fn github_api(
        status_code: u16,
        message: impl Into<String>,
        documentation_url: Option<&str>,
    ) -> Self {
        let mut details = json!({ "status_code": status_code });
        if let Some(url) = documentation_url {
            details["documentation_url"] = json!(url);
        }
        Self::new(ErrorKind::GithubApiError, message).with_details(details)
    }

    /// 405 response body for the MCP endpoint.
    pub fn method_not_allowed(received: &str, required: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotAllowed,
            format!("Only {} method is supported for MCP endpoint", required),
        )
        .with_details(json!({
            "method_received": received,
            "method_required": required,
        }))
    }

    /// 401 body for requests without a usable bearer credential.
    pub fn missing_authorization() -> Self {
        Self::new(
            ErrorKind::MissingAuthorization,
            "Authorization header with Bearer token is required",
        )
        .with_details(json!({
            "header_format": "Authorization: Bearer <token>",
        }))
    }

    /// 401 body for a bearer key that is not in the token mapping.
    pub fn invalid_token() -> Self {
        Self::new(
            ErrorKind::InvalidToken,
            "The provided MCP token is not valid or not found in token mapping",
        )
        .with_details(json!({
            "hint": "Verify that your token is correctly configured in GITHUB_MCP_TOKEN_MAP",
        }))
    }

    /// HTTP status for this error.
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// Converts this error into an MCP tool error, preserving the details
    /// payload so tool callers get the same machine-readable data as HTTP
    /// callers.
    pub fn into_mcp_error(self) -> McpError {
        let data = Some(json!({
            "type": self.kind,
            "details": self.details,
        }));
        match self.kind {
            ErrorKind::ValidationError => McpError::invalid_params(self.message, data),
            ErrorKind::MethodNotAllowed
            | ErrorKind::MissingAuthorization
            | ErrorKind::InvalidToken
            | ErrorKind::AuthenticationError
            | ErrorKind::AuthorizationError => McpError::invalid_request(self.message, data),
            ErrorKind::RateLimitExceeded
            | ErrorKind::NotFound
            | ErrorKind::GithubApiError
            | ErrorKind::InternalError => McpError::internal_error(self.message, data),
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Trait for converting errors into MCP-compatible errors
///
/// Implement this for external error types to enable the `?` operator in
/// tool implementations.
pub trait IntoMcpError {
    /// Convert this error into an MCP error
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for ErrorBody {
    fn into_mcp_error(self) -> McpError {
        ErrorBody::into_mcp_error(self)
    }
}

/// Extension trait for Result types to convert to MCP errors
pub trait ResultExt<T> {
    /// Convert the error to an MCP error
    fn to_mcp_err(self) -> Result<T, McpError>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> Result<T, McpError> {
        self.map_err(|e| e.into_mcp_error())
    }
}
