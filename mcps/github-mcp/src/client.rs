//! Thin GitHub REST client
//!
//! One client per connection, bound to the credential the gateway resolved
//! for that caller. Non-2xx responses are translated into the shared error
//! taxonomy so tool callers can branch on the error `type`.

use chrono::{DateTime, Utc};
use mcp_common::{ErrorBody, ErrorKind};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{Issue, PullRequest, User};

const API_VERSION: &str = "2022-11-28";

/// GitHub REST client authenticated with a single bearer credential.
#[derive(Clone)]
pub struct GitHubClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::builder()
                .user_agent("github-mcp-gateway")
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "failed to build HTTP client, using defaults");
                    reqwest::Client::default()
                }),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ErrorBody> {
        let response = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .query(query)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ErrorBody> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .json(body)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    /// The authenticated user (or the app installation's bot identity).
    pub async fn get_user(&self) -> Result<User, ErrorBody> {
        self.get("/user", &[]).await
    }

    pub async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        state: Option<&str>,
        labels: Option<&str>,
        per_page: Option<u32>,
    ) -> Result<Vec<Issue>, ErrorBody> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(state) = state {
            query.push(("state", state.to_string()));
        }
        if let Some(labels) = labels {
            query.push(("labels", labels.to_string()));
        }
        if let Some(per_page) = per_page {
            query.push(("per_page", per_page.to_string()));
        }
        self.get(&format!("/repos/{}/{}/issues", owner, repo), &query)
            .await
    }

    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        payload: &Value,
    ) -> Result<Issue, ErrorBody> {
        self.post(&format!("/repos/{}/{}/issues", owner, repo), payload)
            .await
    }

    pub async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        state: Option<&str>,
        base: Option<&str>,
        per_page: Option<u32>,
    ) -> Result<Vec<PullRequest>, ErrorBody> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(state) = state {
            query.push(("state", state.to_string()));
        }
        if let Some(base) = base {
            query.push(("base", base.to_string()));
        }
        if let Some(per_page) = per_page {
            query.push(("per_page", per_page.to_string()));
        }
        self.get(&format!("/repos/{}/{}/pulls", owner, repo), &query)
            .await
    }

    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        payload: &Value,
    ) -> Result<PullRequest, ErrorBody> {
        self.post(&format!("/repos/{}/{}/pulls", owner, repo), payload)
            .await
    }
}

fn transport_error(e: reqwest::Error) -> ErrorBody {
    ErrorBody::github_api(502, format!("GitHub API request failed: {}", e), None)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ErrorBody> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_from_response(response).await);
    }
    response.json::<T>().await.map_err(|e| {
        ErrorBody::new(
            ErrorKind::GithubApiError,
            format!("failed to decode GitHub API response: {}", e),
        )
    })
}

/// Maps a non-2xx GitHub response onto the error taxonomy.
async fn error_from_response(response: reqwest::Response) -> ErrorBody {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["message"]
        .as_str()
        .unwrap_or("GitHub API error")
        .to_string();
    let doc_url = body["documentation_url"].as_str();

    match status {
        401 => ErrorBody::authentication(
            message,
            Some("The resolved GitHub credential was rejected upstream"),
        ),
        403 if rate_limit_exhausted(&headers) => {
            let limit = header_i64(&headers, "x-ratelimit-limit").unwrap_or(0);
            let reset = header_i64(&headers, "x-ratelimit-reset")
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));
            ErrorBody::rate_limit(limit, 0, reset)
        }
        403 => ErrorBody::permission_denied(message, &[], None),
        404 => ErrorBody::new(ErrorKind::NotFound, message),
        422 => ErrorBody::new(ErrorKind::ValidationError, message),
        _ => ErrorBody::github_api(status, message, doc_url),
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    header_i64(headers, "x-ratelimit-remaining") == Some(0)
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .and_then(|v| v.parse().ok())
}
