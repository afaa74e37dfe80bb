//! GitHub adapter (REST v3 + GraphQL v4).
//!
//! Endpoints used:
//! - POST /graphql                                   (reviewThreads listing, resolveReviewThread)
//! - POST /repos/{owner}/{repo}/pulls/{n}/comments   (inline / file-level review comment)
//! - PATCH /repos/{owner}/{repo}/pulls/comments/{id} (body update)
//!
//! Review comments are listed through GraphQL because REST does not expose
//! thread ids or the resolved flag.

use reconcile::{CanonicalPath, ExistingComment, PlanAction};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::errors::{PlatformError, PlatformResult, ProviderError};
use crate::ensure_success;

const THREADS_PAGE_SIZE: u32 = 100;

const REVIEW_THREADS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $first: Int!, $cursor: String) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      reviewThreads(first: $first, after: $cursor) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id
          isResolved
          path
          line
          comments(first: 100) { nodes { databaseId body } }
        }
      }
    }
  }
}"#;

const RESOLVE_THREAD_MUTATION: &str = r#"
mutation($threadId: ID!) {
  resolveReviewThread(input: { threadId: $threadId }) {
    thread { id isResolved }
  }
}"#;

/// Connection settings for one pull request.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST root, e.g. `https://api.github.com` or `https://ghe.host/api/v3`.
    pub api_url: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub pull_number: u64,
    /// Commit new review comments are anchored to.
    pub head_sha: String,
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    cfg: GitHubConfig,
}

impl GitHubClient {
    pub fn new(http: Client, cfg: GitHubConfig) -> Self {
        Self { http, cfg }
    }

    fn rest_base(&self) -> &str {
        self.cfg.api_url.trim_end_matches('/')
    }

    fn headers(&self) -> PlatformResult<HeaderMap> {
        let mut h = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.cfg.token))
            .map_err(|_| PlatformError::Validation("GITHUB_TOKEN is not a valid header".into()))?;
        h.insert(AUTHORIZATION, auth);
        h.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        h.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(h)
    }

    /// Lists every comment of every review thread on the PR.
    pub async fn list_comments(&self) -> PlatformResult<Vec<ExistingComment>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let vars = json!({
                "owner": self.cfg.owner,
                "repo": self.cfg.repo,
                "number": self.cfg.pull_number,
                "first": THREADS_PAGE_SIZE,
                "cursor": cursor,
            });
            let data: ThreadsData = self.graphql(REVIEW_THREADS_QUERY, vars).await?;
            let (comments, next) = threads_page_to_comments(data)?;
            out.extend(comments);
            pages += 1;
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        info!(
            pr = self.cfg.pull_number,
            pages,
            comments = out.len(),
            "github: review comments listed"
        );
        Ok(out)
    }

    /// Executes one plan action. Returns the remote comment/thread id.
    pub async fn apply_action(&self, action: &PlanAction) -> PlatformResult<Option<String>> {
        match action {
            PlanAction::Create {
                path, line, body, ..
            } => {
                let url = format!(
                    "{}/repos/{}/{}/pulls/{}/comments",
                    self.rest_base(),
                    self.cfg.owner,
                    self.cfg.repo,
                    self.cfg.pull_number
                );
                let req = create_comment_request(path, *line, body, &self.cfg.head_sha);
                debug!(%path, line = ?line, "github: POST review comment");
                let resp = self
                    .http
                    .post(url)
                    .headers(self.headers()?)
                    .json(&req)
                    .send()
                    .await?;
                let created: RestComment = ensure_success(resp).await?.json().await?;
                Ok(Some(created.id.to_string()))
            }
            PlanAction::Update {
                target_comment_id,
                body,
                ..
            } => {
                let url = format!(
                    "{}/repos/{}/{}/pulls/comments/{}",
                    self.rest_base(),
                    self.cfg.owner,
                    self.cfg.repo,
                    target_comment_id
                );
                debug!(comment = %target_comment_id, "github: PATCH review comment");
                let resp = self
                    .http
                    .patch(url)
                    .headers(self.headers()?)
                    .json(&json!({ "body": body }))
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
                let thread_id = thread_id.as_deref().ok_or_else(|| {
                    PlatformError::Validation(format!(
                        "comment {target_comment_id} has no review thread to resolve"
                    ))
                })?;
                debug!(thread = %thread_id, "github: resolveReviewThread");
                let data: ResolveData = self
                    .graphql(RESOLVE_THREAD_MUTATION, json!({ "threadId": thread_id }))
                    .await?;
                Ok(Some(data.resolve_review_thread.thread.id))
            }
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> PlatformResult<T> {
        let resp = self
            .http
            .post(graphql_url(&self.cfg.api_url))
            .headers(self.headers()?)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let envelope: GraphQlResponse<T> = ensure_success(resp).await?.json().await?;
        envelope.into_data()
    }
}

/// GraphQL endpoint for a REST root. GitHub Enterprise serves REST under
/// `/api/v3` and GraphQL under `/api/graphql`.
pub fn graphql_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    match base.strip_suffix("/api/v3") {
        Some(host) => format!("{host}/api/graphql"),
        None => format!("{base}/graphql"),
    }
}

/// Request body for a new review comment. File-level when `line` is `None`.
pub fn create_comment_request(
    path: &CanonicalPath,
    line: Option<u32>,
    body: &str,
    head_sha: &str,
) -> Value {
    match line {
        Some(line) => json!({
            "body": body,
            "commit_id": head_sha,
            "path": path.as_str(),
            "line": line,
            "side": "RIGHT",
        }),
        None => json!({
            "body": body,
            "commit_id": head_sha,
            "path": path.as_str(),
            "subject_type": "file",
        }),
    }
}

/// Flattens one reviewThreads page into comments. Returns the next cursor
/// when more pages exist.
fn threads_page_to_comments(
    data: ThreadsData,
) -> PlatformResult<(Vec<ExistingComment>, Option<String>)> {
    let pr = data
        .repository
        .and_then(|r| r.pull_request)
        .ok_or_else(|| ProviderError::InvalidResponse("pull request not found".into()))?;
    let threads = pr.review_threads;

    let mut out = Vec::new();
    for t in threads.nodes.into_iter().flatten() {
        for c in t.comments.nodes.into_iter().flatten() {
            // Comments from deleted accounts or pending reviews come back without an id.
            let Some(id) = c.database_id else {
                continue;
            };
            out.push(ExistingComment {
                id: id.to_string(),
                body: c.body,
                thread_id: Some(t.id.clone()),
                path: t.path.clone(),
                line: t.line,
                is_resolved: t.is_resolved,
            });
        }
    }

    let next = if threads.page_info.has_next_page {
        threads.page_info.end_cursor
    } else {
        None
    };
    Ok((out, next))
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> PlatformResult<T> {
        if !self.errors.is_empty() {
            let msg = self
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProviderError::GraphQl(msg).into());
        }
        self.data.ok_or_else(|| {
            ProviderError::InvalidResponse("graphql response without data".into()).into()
        })
    }
}

#[derive(Debug, Deserialize)]
struct ThreadsData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_request: Option<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    review_threads: ThreadConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<ThreadNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    id: String,
    is_resolved: bool,
    path: Option<String>,
    /// Null when the thread is outdated.
    line: Option<u32>,
    comments: CommentConnection,
}

#[derive(Debug, Deserialize)]
struct CommentConnection {
    #[serde(default)]
    nodes: Vec<Option<CommentNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    database_id: Option<u64>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveData {
    resolve_review_thread: ResolvePayload,
}

#[derive(Debug, Deserialize)]
struct ResolvePayload {
    thread: ResolvedThread,
}

#[derive(Debug, Deserialize)]
struct ResolvedThread {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RestComment {
    id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubClient {
        GitHubClient::new(
            Client::new(),
            GitHubConfig {
                api_url: "https://api.github.com".into(),
                token: "t".into(),
                owner: "o".into(),
                repo: "r".into(),
                pull_number: 7,
                head_sha: "abc".into(),
            },
        )
    }

    #[test]
    fn graphql_url_for_public_and_enterprise() {
        assert_eq!(graphql_url("https://api.github.com"), "https://api.github.com/graphql");
        assert_eq!(graphql_url("https://api.github.com/"), "https://api.github.com/graphql");
        assert_eq!(graphql_url("https://ghe.local/api/v3"), "https://ghe.local/api/graphql");
    }

    #[test]
    fn create_request_inline_and_file_level() {
        let path = CanonicalPath::new("src/x.ts");
        let inline = create_comment_request(&path, Some(12), "b", "sha");
        assert_eq!(inline["line"], 12);
        assert_eq!(inline["side"], "RIGHT");
        assert_eq!(inline["commit_id"], "sha");
        assert!(inline.get("subject_type").is_none());

        let file = create_comment_request(&path, None, "b", "sha");
        assert_eq!(file["subject_type"], "file");
        assert_eq!(file["path"], "src/x.ts");
        assert!(file.get("line").is_none());
    }

    #[test]
    fn threads_page_flattens_comments() {
        let raw = json!({
            "data": {
                "repository": { "pullRequest": { "reviewThreads": {
                    "pageInfo": { "hasNextPage": true, "endCursor": "CUR" },
                    "nodes": [
                        {
                            "id": "T1", "isResolved": false, "path": "src/x.ts", "line": 5,
                            "comments": { "nodes": [
                                { "databaseId": 11, "body": "first" },
                                { "databaseId": null, "body": "ghost" },
                                { "databaseId": 12, "body": "reply" }
                            ]}
                        },
                        {
                            "id": "T2", "isResolved": true, "path": "lib/y.rs", "line": null,
                            "comments": { "nodes": [ { "databaseId": 21, "body": "old" } ] }
                        }
                    ]
                }}}
            }
        });
        let env: GraphQlResponse<ThreadsData> = serde_json::from_value(raw).unwrap();
        let (comments, next) = threads_page_to_comments(env.into_data().unwrap()).unwrap();
        assert_eq!(next.as_deref(), Some("CUR"));
        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].id, "11");
        assert_eq!(comments[0].thread_id.as_deref(), Some("T1"));
        assert_eq!(comments[0].line, Some(5));
        assert_eq!(comments[1].id, "12");
        assert!(comments[2].is_resolved);
        assert_eq!(comments[2].line, None);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let raw = json!({
            "repository": { "pullRequest": { "reviewThreads": {
                "pageInfo": { "hasNextPage": false, "endCursor": "END" },
                "nodes": []
            }}}
        });
        let data: ThreadsData = serde_json::from_value(raw).unwrap();
        let (comments, next) = threads_page_to_comments(data).unwrap();
        assert!(comments.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn graphql_errors_surface() {
        let raw = json!({
            "data": null,
            "errors": [ { "message": "Could not resolve to a node" } ]
        });
        let env: GraphQlResponse<ThreadsData> = serde_json::from_value(raw).unwrap();
        let err = env.into_data().unwrap_err();
        assert!(matches!(
            err,
            PlatformError::Provider(ProviderError::GraphQl(ref m)) if m.contains("resolve")
        ));
    }

    #[test]
    fn missing_pull_request_is_invalid_response() {
        let data: ThreadsData =
            serde_json::from_value(json!({ "repository": { "pullRequest": null } })).unwrap();
        assert!(matches!(
            threads_page_to_comments(data),
            Err(PlatformError::Provider(ProviderError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn resolve_without_thread_is_rejected_before_any_request() {
        let action = PlanAction::ResolveThread {
            target_comment_id: "5".into(),
            thread_id: None,
            stale_count: 1,
        };
        let err = client().apply_action(&action).await.unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
    }
}
