//! The `/mcp` bridge handler
//!
//! Each accepted POST becomes one MCP session: the request body is the read
//! side of the transport, the streamed response body is the write side, and
//! a per-connection `GitHubMcpServer` carrying the caller's resolved
//! credential owns the message framing in between. The 200 status commits
//! before streaming begins; handler errors after that point are logged, the
//! status cannot change.

use std::io;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use rmcp::ServiceExt;
use tokio_util::io::{ReaderStream, StreamReader};

use github_mcp::GitHubMcpServer;
use mcp_common::ErrorBody;

use super::state::AppState;
use super::ApiError;

/// Buffer between the MCP server's writes and the HTTP response stream.
const BRIDGE_BUFFER_BYTES: usize = 8 * 1024;

/// Pulls the caller key out of `Authorization: Bearer <key>`.
///
/// The scheme word is matched case-insensitively and the token is trimmed;
/// a wrong scheme, empty token, or absent header all collapse to `None` -
/// the caller gets the same "missing authorization" answer for each.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = raw.trim().splitn(2, ' ');
    let scheme = parts.next()?;
    let token = parts.next()?.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

pub async fn mcp_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method != Method::POST {
        tracing::warn!(method = %method, "rejected non-POST request to /mcp");
        return ApiError(ErrorBody::method_not_allowed(method.as_str(), "POST")).into_response();
    }

    let Some(caller_key) = extract_bearer(&headers) else {
        tracing::warn!("rejected /mcp request without a usable bearer credential");
        return ApiError(ErrorBody::missing_authorization()).into_response();
    };

    let Some(github_token) = state.store.resolve(&caller_key).await else {
        tracing::warn!("rejected /mcp request with an unresolvable caller key");
        return ApiError(ErrorBody::invalid_token()).into_response();
    };
    tracing::debug!("caller credential resolved, starting mcp session");

    // Read side: the inbound body, surfaced to the transport as AsyncRead.
    let inbound = StreamReader::new(body.into_data_stream().map_err(io::Error::other));

    // Write side: a duplex pipe. The server writes into one half; the other
    // half feeds the response stream, so bytes flush as they are produced
    // rather than buffering until the session ends.
    let (server_write, client_read) = tokio::io::duplex(BRIDGE_BUFFER_BYTES);

    let server = GitHubMcpServer::new(github_token, state.tools.clone());
    tokio::spawn(async move {
        match server.serve((inbound, server_write)).await {
            Ok(session) => {
                if let Err(e) = session.waiting().await {
                    tracing::warn!(error = %e, "mcp session ended with error");
                } else {
                    tracing::debug!("mcp session closed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to start mcp session"),
        }
    });

    let mut response = Response::new(Body::from_stream(ReaderStream::new(client_read)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_basic() {
        let headers = headers_with_auth("Bearer tok123");
        assert_eq!(extract_bearer(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_bearer_scheme_is_case_insensitive() {
        for scheme in ["bearer", "BEARER", "BeArEr"] {
            let headers = headers_with_auth(&format!("{} tok123", scheme));
            assert_eq!(extract_bearer(&headers).as_deref(), Some("tok123"));
        }
    }

    #[test]
    fn test_extract_bearer_trims_token_whitespace() {
        let headers = headers_with_auth("Bearer   tok123  ");
        assert_eq!(extract_bearer(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_bearer_rejects_wrong_scheme() {
        let headers = headers_with_auth("Basic dXNlcjpwYXNz");
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn test_extract_bearer_rejects_empty_token() {
        assert_eq!(extract_bearer(&headers_with_auth("Bearer ")), None);
        assert_eq!(extract_bearer(&headers_with_auth("Bearer")), None);
    }

    #[test]
    fn test_extract_bearer_rejects_missing_header() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
