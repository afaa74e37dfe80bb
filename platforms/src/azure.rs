//! Azure DevOps adapter (Git REST API 7.1, pull request threads).
//!
//! API:
//! - GET   {base}/threads                          (listing)
//! - POST  {base}/threads                          (new inline / file thread)
//! - PATCH {base}/threads/{thread}/comments/{id}   (body update)
//! - PATCH {base}/threads/{thread}                 (status=fixed)
//!
//! where `{base}` = `{org}/{project}/_apis/git/repositories/{repo}/pullRequests/{id}`.
//!
//! Thread file paths carry a leading slash on this platform. The slash is
//! added here when posting and left as-is when listing; the engine
//! canonicalizes incoming paths itself.

use reconcile::{CanonicalPath, ExistingComment, PlanAction};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::ensure_success;
use crate::errors::{PlatformError, PlatformResult};

const API_VERSION: &str = "7.1";

/// Connection settings for one pull request.
#[derive(Debug, Clone)]
pub struct AzureDevOpsConfig {
    /// e.g. `https://dev.azure.com/contoso`.
    pub org_url: String,
    pub project: String,
    pub repository: String,
    /// Personal access token (basic auth, empty user).
    pub token: String,
    pub pull_request_id: u64,
}

#[derive(Debug, Clone)]
pub struct AzureDevOpsClient {
    http: Client,
    cfg: AzureDevOpsConfig,
}

impl AzureDevOpsClient {
    pub fn new(http: Client, cfg: AzureDevOpsConfig) -> Self {
        Self { http, cfg }
    }

    fn pr_base(&self) -> String {
        format!(
            "{}/{}/_apis/git/repositories/{}/pullRequests/{}",
            self.cfg.org_url.trim_end_matches('/'),
            urlencoding::encode(&self.cfg.project),
            urlencoding::encode(&self.cfg.repository),
            self.cfg.pull_request_id
        )
    }

    /// Lists comments of all PR threads, skipping deleted ones.
    pub async fn list_comments(&self) -> PlatformResult<Vec<ExistingComment>> {
        let url = format!("{}/threads?api-version={API_VERSION}", self.pr_base());
        let resp = self
            .http
            .get(url)
            .basic_auth("", Some(&self.cfg.token))
            .send()
            .await?;
        let list: ThreadList = ensure_success(resp).await?.json().await?;
        let comments = threads_to_comments(list);
        info!(
            pr = self.cfg.pull_request_id,
            comments = comments.len(),
            "azure: thread comments listed"
        );
        Ok(comments)
    }

    /// Executes one plan action. Returns the remote thread/comment id.
    pub async fn apply_action(&self, action: &PlanAction) -> PlatformResult<Option<String>> {
        match action {
            PlanAction::Create {
                path, line, body, ..
            } => {
                let url = format!("{}/threads?api-version={API_VERSION}", self.pr_base());
                debug!(%path, line = ?line, "azure: POST thread");
                let resp = self
                    .http
                    .post(url)
                    .basic_auth("", Some(&self.cfg.token))
                    .json(&create_thread_request(path, *line, body))
                    .send()
                    .await?;
                let created: CreatedThread = ensure_success(resp).await?.json().await?;
                Ok(Some(created.id.to_string()))
            }
            PlanAction::Update {
                target_comment_id,
                thread_id,
                body,
                ..
            } => {
                let thread_id = require_thread(target_comment_id, thread_id.as_deref())?;
                let url = format!(
                    "{}/threads/{}/comments/{}?api-version={API_VERSION}",
                    self.pr_base(),
                    thread_id,
                    target_comment_id
                );
                debug!(thread = %thread_id, comment = %target_comment_id, "azure: PATCH comment");
                let resp = self
                    .http
                    .patch(url)
                    .basic_auth("", Some(&self.cfg.token))
                    .json(&json!({ "content": body }))
                    .send()
                    .await?;
                ensure_success(resp).await?;
                Ok(Some(target_comment_id.clone()))
            }
            PlanAction::ResolveThread {
                target_comment_id,
                thread_id,
                ..
            } => {
                let thread_id = require_thread(target_comment_id, thread_id.as_deref())?;
                let url = format!(
                    "{}/threads/{}?api-version={API_VERSION}",
                    self.pr_base(),
                    thread_id
                );
                debug!(thread = %thread_id, "azure: PATCH thread status=fixed");
                let resp = self
                    .http
                    .patch(url)
                    .basic_auth("", Some(&self.cfg.token))
                    .json(&json!({ "status": "fixed" }))
                    .send()
                    .await?;
                ensure_success(resp).await?;
                Ok(Some(thread_id.to_string()))
            }
        }
    }
}

fn require_thread<'a>(comment_id: &str, thread_id: Option<&'a str>) -> PlatformResult<&'a str> {
    thread_id.ok_or_else(|| {
        PlatformError::Validation(format!("comment {comment_id} is missing its thread id"))
    })
}

/// Thread paths on Azure DevOps are rooted: `src/a.rs` → `/src/a.rs`.
pub fn to_azure_path(path: &CanonicalPath) -> String {
    format!("/{}", path.as_str())
}

/// Request body for a new thread. File-level when `line` is `None`.
pub fn create_thread_request(path: &CanonicalPath, line: Option<u32>, body: &str) -> Value {
    let mut context = json!({ "filePath": to_azure_path(path) });
    if let Some(line) = line {
        context["rightFileStart"] = json!({ "line": line, "offset": 1 });
        context["rightFileEnd"] = json!({ "line": line, "offset": 1 });
    }
    json!({
        "comments": [
            { "parentCommentId": 0, "content": body, "commentType": 1 }
        ],
        "status": "active",
        "threadContext": context,
    })
}

/// `active`, `pending` and `unknown` threads are open. Any other status is a
/// closed state such as `fixed` or `wontFix`.
fn is_resolved_status(status: Option<&str>) -> bool {
    match status {
        None => false,
        Some(s) => !matches!(s, "active" | "pending" | "unknown"),
    }
}

fn threads_to_comments(list: ThreadList) -> Vec<ExistingComment> {
    let mut out = Vec::new();
    for t in list.value {
        if t.is_deleted {
            continue;
        }
        let resolved = is_resolved_status(t.status.as_deref());
        let (path, line) = match &t.thread_context {
            Some(ctx) => (
                ctx.file_path.clone(),
                ctx.right_file_start.as_ref().map(|p| p.line),
            ),
            None => (None, None),
        };
        for c in t.comments {
            if c.is_deleted {
                continue;
            }
            out.push(ExistingComment {
                id: c.id.to_string(),
                body: c.content.unwrap_or_default(),
                thread_id: Some(t.id.to_string()),
                path: path.clone(),
                line,
                is_resolved: resolved,
            });
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct ThreadList {
    #[serde(default)]
    value: Vec<Thread>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thread {
    id: u64,
    status: Option<String>,
    #[serde(default)]
    is_deleted: bool,
    thread_context: Option<ThreadContext>,
    #[serde(default)]
    comments: Vec<ThreadComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadContext {
    file_path: Option<String>,
    right_file_start: Option<FilePosition>,
}

#[derive(Debug, Deserialize)]
struct FilePosition {
    line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadComment {
    id: u64,
    content: Option<String>,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedThread {
    id: u64,
}
