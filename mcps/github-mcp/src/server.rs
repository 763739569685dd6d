//! MCP server implementation
//!
//! One `GitHubMcpServer` is created per gateway connection with the
//! credential resolved for that caller. Tools are passthrough wrappers over
//! the GitHub REST API; upstream failures surface through the shared error
//! taxonomy rather than as raw transport errors.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use mcp_common::{json_success, ErrorBody, ErrorKind, ResultExt};

use crate::client::GitHubClient;
use crate::DEFAULT_API_BASE;

/// Per-process tool behavior, fixed at startup.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// GitHub API base URL (public or GHE).
    pub api_base: String,
    /// Reject write tools when set.
    pub read_only: bool,
    /// Redact free-form content (issue/PR bodies) from responses.
    pub lockdown: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            read_only: false,
            lockdown: false,
        }
    }
}

/// The GitHub MCP server for a single connection.
#[derive(Clone)]
pub struct GitHubMcpServer {
    client: GitHubClient,
    config: ToolConfig,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Parameter Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListIssuesParams {
    #[schemars(description = "Repository in OWNER/REPO format")]
    pub repo: String,
    #[schemars(description = "Issue state filter (open, closed, all)")]
    pub state: Option<String>,
    #[schemars(description = "Comma-separated label names to filter by")]
    pub labels: Option<String>,
    #[schemars(description = "Maximum number of issues to return (default: 30)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateIssueParams {
    #[schemars(description = "Repository in OWNER/REPO format")]
    pub repo: String,
    #[schemars(description = "Issue title")]
    pub title: String,
    #[schemars(description = "Issue body in markdown")]
    pub body: Option<String>,
    #[schemars(description = "Labels to add")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "Usernames to assign")]
    pub assignees: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListPullRequestsParams {
    #[schemars(description = "Repository in OWNER/REPO format")]
    pub repo: String,
    #[schemars(description = "PR state filter (open, closed, all)")]
    pub state: Option<String>,
    #[schemars(description = "Filter by base branch")]
    pub base: Option<String>,
    #[schemars(description = "Maximum number of PRs to return")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreatePullRequestParams {
    #[schemars(description = "Repository in OWNER/REPO format")]
    pub repo: String,
    #[schemars(description = "Pull request title")]
    pub title: String,
    #[schemars(description = "Head branch with changes")]
    pub head: String,
    #[schemars(description = "Base branch to merge into")]
    pub base: String,
    #[schemars(description = "Pull request body in markdown")]
    pub body: Option<String>,
    #[schemars(description = "Create as draft PR")]
    pub draft: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetMeParams {}

// ============================================================================
// Tools
// ============================================================================

#[tool_router]
impl GitHubMcpServer {
    /// Creates a server bound to one caller's resolved GitHub credential.
    pub fn new(github_token: impl Into<String>, config: ToolConfig) -> Self {
        Self {
            client: GitHubClient::new(config.api_base.clone(), github_token),
            config,
            tool_router: Self::tool_router(),
        }
    }

    fn ensure_writable(&self, tool: &str) -> Result<(), McpError> {
        if self.config.read_only {
            return Err(ErrorBody::new(
                ErrorKind::ValidationError,
                format!("{} is unavailable: the gateway is running in read-only mode", tool),
            )
            .into_mcp_error());
        }
        Ok(())
    }

    #[tool(description = "Get the authenticated GitHub user or installation identity")]
    async fn get_me(
        &self,
        Parameters(_params): Parameters<GetMeParams>,
    ) -> Result<CallToolResult, McpError> {
        let user = self.client.get_user().await.to_mcp_err()?;
        json_success(&user)
    }

    #[tool(description = "List issues in a GitHub repository with optional filters")]
    async fn list_issues(
        &self,
        Parameters(params): Parameters<ListIssuesParams>,
    ) -> Result<CallToolResult, McpError> {
        let (owner, repo) = split_repo(&params.repo)?;
        let mut issues = self
            .client
            .list_issues(
                owner,
                repo,
                params.state.as_deref(),
                params.labels.as_deref(),
                params.limit,
            )
            .await
            .to_mcp_err()?;
        if self.config.lockdown {
            issues = issues.into_iter().map(|i| i.redacted()).collect();
        }
        json_success(&issues)
    }

    #[tool(description = "Create a new issue in a GitHub repository")]
    async fn create_issue(
        &self,
        Parameters(params): Parameters<CreateIssueParams>,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_writable("create_issue")?;
        let (owner, repo) = split_repo(&params.repo)?;

        let mut payload = json!({ "title": params.title });
        if let Some(body) = &params.body {
            payload["body"] = json!(body);
        }
        if let Some(labels) = &params.labels {
            payload["labels"] = json!(labels);
        }
        if let Some(assignees) = &params.assignees {
            payload["assignees"] = json!(assignees);
        }

        let issue = self
            .client
            .create_issue(owner, repo, &payload)
            .await
            .to_mcp_err()?;
        tracing::info!(repo = %params.repo, number = issue.number, "created issue");
        json_success(&issue)
    }

    #[tool(description = "List pull requests in a GitHub repository")]
    async fn list_pull_requests(
        &self,
        Parameters(params): Parameters<ListPullRequestsParams>,
    ) -> Result<CallToolResult, McpError> {
        let (owner, repo) = split_repo(&params.repo)?;
        let mut pulls = self
            .client
            .list_pull_requests(
                owner,
                repo,
                params.state.as_deref(),
                params.base.as_deref(),
                params.limit,
            )
            .await
            .to_mcp_err()?;
        if self.config.lockdown {
            pulls = pulls.into_iter().map(|p| p.redacted()).collect();
        }
        json_success(&pulls)
    }

    #[tool(description = "Create a new pull request")]
    async fn create_pull_request(
        &self,
        Parameters(params): Parameters<CreatePullRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_writable("create_pull_request")?;
        let (owner, repo) = split_repo(&params.repo)?;

        let mut payload = json!({
            "title": params.title,
            "head": params.head,
            "base": params.base,
        });
        if let Some(body) = &params.body {
            payload["body"] = json!(body);
        }
        if let Some(draft) = params.draft {
            payload["draft"] = json!(draft);
        }

        let pr = self
            .client
            .create_pull_request(owner, repo, &payload)
            .await
            .to_mcp_err()?;
        tracing::info!(repo = %params.repo, number = pr.number, "created pull request");
        json_success(&pr)
    }
}

fn split_repo(repo: &str) -> Result<(&str, &str), McpError> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(ErrorBody::new(
            ErrorKind::ValidationError,
            format!("invalid repository '{}': expected OWNER/REPO", repo),
        )
        .into_mcp_error()),
    }
}

#[tool_handler]
impl rmcp::ServerHandler for GitHubMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "GitHub MCP gateway - provides tools for interacting with GitHub \
                 repositories, issues and pull requests using the credential resolved \
                 for this connection."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
