//! Platform adapters for the reconciliation engine.
//!
//! The engine is shared; only the API boundary differs per platform. Each
//! adapter implements the narrow [`PlatformAdapter`] capability:
//! - `list_comments`   → `ExistingComment[]` read once before reconciliation;
//! - `apply_post_plan` → executes the `PostPlan` once after reconciliation.
//!
//! No `async-trait` and no heap trait objects: the trait uses native `async
//! fn`, and [`PlatformClient`] dispatches over the concrete clients with an
//! enum.
//!
//! Format transforms required by a platform (Azure DevOps wants `/path`) are
//! applied inside the adapter only; the engine always sees canonical paths.

pub mod azure;
pub mod errors;
pub mod github;

use futures::stream::{self, StreamExt};
use reconcile::config::{env_opt_u32, must_env};
use reconcile::{ExistingComment, PlanAction, PostPlan};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use errors::{PlatformError, PlatformResult, ProviderError};

/// Supported review platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformKind {
    GitHub,
    AzureDevOps,
}

/// Settings for executing a plan.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// If true, do not send anything; just log what would be done.
    pub dry_run: bool,
    /// Maximum in-flight requests while executing a plan.
    pub max_concurrency: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dry_run: env_bool("REVIEW_SYNC_DRY_RUN", true),
            max_concurrency: env_usize("REVIEW_SYNC_CONCURRENCY", 2),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Result for one executed (or skipped) plan action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Position of the action in the plan.
    pub index: usize,
    /// `create`, `update` or `resolve_thread`.
    pub action: &'static str,
    /// Was a network call performed successfully?
    pub performed: bool,
    /// Reason if nothing was sent (dry-run).
    pub skipped_reason: Option<String>,
    /// Identifier of the created/edited remote object.
    pub remote_id: Option<String>,
    /// Failure message; the remaining actions still ran.
    pub error: Option<String>,
}

/// Capability interface every platform implements.
#[allow(async_fn_in_trait)]
pub trait PlatformAdapter {
    fn kind(&self) -> PlatformKind;

    /// Lists review comments currently on the PR.
    async fn list_comments(&self) -> PlatformResult<Vec<ExistingComment>>;

    /// Executes a single action; returns the remote id when there is one.
    async fn apply_action(&self, action: &PlanAction) -> PlatformResult<Option<String>>;

    /// Executes a whole plan with bounded concurrency. Outcomes keep plan
    /// order; a failed action is recorded and does not stop the others.
    async fn apply_post_plan(&self, plan: &PostPlan, cfg: &PublishConfig) -> Vec<ActionOutcome> {
        if cfg.dry_run {
            return plan
                .actions
                .iter()
                .enumerate()
                .map(|(index, action)| {
                    info!(
                        platform = ?self.kind(),
                        index,
                        action = action_name(action),
                        target = %action_target(action),
                        "publish: dry-run"
                    );
                    ActionOutcome {
                        index,
                        action: action_name(action),
                        performed: false,
                        skipped_reason: Some("dry-run".into()),
                        remote_id: None,
                        error: None,
                    }
                })
                .collect();
        }

        let outcomes: Vec<ActionOutcome> = stream::iter(plan.actions.iter().enumerate())
            .map(|(index, action)| async move {
                let res = self.apply_action(action).await;
                let name = action_name(action);
                match res {
                    Ok(remote_id) => ActionOutcome {
                        index,
                        action: name,
                        performed: true,
                        skipped_reason: None,
                        remote_id,
                        error: None,
                    },
                    Err(e) => {
                        warn!(
                            platform = ?self.kind(),
                            index,
                            action = name,
                            target = %action_target(action),
                            error = %e,
                            "publish: action failed"
                        );
                        ActionOutcome {
                            index,
                            action: name,
                            performed: false,
                            skipped_reason: None,
                            remote_id: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .buffered(cfg.max_concurrency.max(1))
            .collect()
            .await;

        let done = outcomes.iter().filter(|o| o.performed).count();
        info!(
            platform = ?self.kind(),
            performed = done,
            failed = outcomes.len() - done,
            "publish: plan executed"
        );
        outcomes
    }
}

/// Short name of an action for logs and outcomes.
pub fn action_name(action: &PlanAction) -> &'static str {
    match action {
        PlanAction::Create { .. } => "create",
        PlanAction::Update { .. } => "update",
        PlanAction::ResolveThread { .. } => "resolve_thread",
    }
}

fn action_target(action: &PlanAction) -> String {
    match action {
        PlanAction::Create {
            path,
            line: Some(l),
            ..
        } => format!("{path}:{l}"),
        PlanAction::Create { path, line: None, .. } => path.to_string(),
        PlanAction::Update {
            target_comment_id, ..
        }
        | PlanAction::ResolveThread {
            target_comment_id, ..
        } => format!("comment {target_comment_id}"),
    }
}

/// Passes successful responses through; maps the rest to [`ProviderError`],
/// reading `Retry-After` on 429.
pub(crate) async fn ensure_success(resp: reqwest::Response) -> PlatformResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 429 {
        let retry_after_secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(ProviderError::RateLimited { retry_after_secs }.into());
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    debug!(
        %url,
        status = status.as_u16(),
        body = %truncate(&body, 300),
        "platform: request failed"
    );
    Err(ProviderError::from_status(status.as_u16()).into())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Runtime configuration for any platform client.
#[derive(Debug, Clone)]
pub enum PlatformConfig {
    GitHub(github::GitHubConfig),
    AzureDevOps(azure::AzureDevOpsConfig),
}

impl PlatformConfig {
    /// Reads `REVIEW_SYNC_PLATFORM` and the platform variables.
    /// `Ok(None)` when no platform is configured (offline runs).
    pub fn from_env() -> PlatformResult<Option<Self>> {
        let kind = match std::env::var("REVIEW_SYNC_PLATFORM") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };
        let pr = env_opt_u32("REVIEW_SYNC_PR")?.ok_or(reconcile::Error::Config(
            reconcile::errors::ConfigError::MissingVar("REVIEW_SYNC_PR"),
        ))?;

        match kind.trim().to_lowercase().as_str() {
            "github" => {
                let repository = must_env("GITHUB_REPOSITORY")?;
                let (owner, repo) = repository.split_once('/').ok_or_else(|| {
                    PlatformError::Validation(format!(
                        "GITHUB_REPOSITORY must be owner/repo, got {repository:?}"
                    ))
                })?;
                Ok(Some(Self::GitHub(github::GitHubConfig {
                    api_url: std::env::var("GITHUB_API_URL")
                        .ok()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| "https://api.github.com".into()),
                    token: must_env("GITHUB_TOKEN")?,
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    pull_number: u64::from(pr),
                    head_sha: must_env("REVIEW_SYNC_HEAD_SHA")?,
                })))
            }
            "azure" | "azure-devops" | "azuredevops" => {
                Ok(Some(Self::AzureDevOps(azure::AzureDevOpsConfig {
                    org_url: must_env("AZURE_DEVOPS_ORG_URL")?,
                    project: must_env("AZURE_DEVOPS_PROJECT")?,
                    repository: must_env("AZURE_DEVOPS_REPOSITORY")?,
                    token: must_env("AZURE_DEVOPS_TOKEN")?,
                    pull_request_id: u64::from(pr),
                })))
            }
            other => Err(PlatformError::Validation(format!(
                "unsupported REVIEW_SYNC_PLATFORM: {other}"
            ))),
        }
    }
}

/// Concrete platform client (enum-dispatch).
#[derive(Debug, Clone)]
pub enum PlatformClient {
    GitHub(github::GitHubClient),
    AzureDevOps(azure::AzureDevOpsClient),
}

impl PlatformClient {
    /// Constructs a concrete client from generic config.
    pub fn from_config(cfg: PlatformConfig) -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("review-sync/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;
        Ok(match cfg {
            PlatformConfig::GitHub(c) => Self::GitHub(github::GitHubClient::new(http, c)),
            PlatformConfig::AzureDevOps(c) => {
                Self::AzureDevOps(azure::AzureDevOpsClient::new(http, c))
            }
        })
    }
}

impl PlatformAdapter for PlatformClient {
    fn kind(&self) -> PlatformKind {
        match self {
            Self::GitHub(_) => PlatformKind::GitHub,
            Self::AzureDevOps(_) => PlatformKind::AzureDevOps,
        }
    }

    async fn list_comments(&self) -> PlatformResult<Vec<ExistingComment>> {
        match self {
            Self::GitHub(c) => c.list_comments().await,
            Self::AzureDevOps(c) => c.list_comments().await,
        }
    }

    async fn apply_action(&self, action: &PlanAction) -> PlatformResult<Option<String>> {
        match self {
            Self::GitHub(c) => c.apply_action(action).await,
            Self::AzureDevOps(c) => c.apply_action(action).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::CanonicalPath;
    use std::ffi::OsString;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets (or removes) a variable and restores the previous value on drop.
    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var_os(key);
            match value {
                Some(v) => unsafe { std::env::set_var(key, v) },
                None => unsafe { std::env::remove_var(key) },
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(prev) => unsafe { std::env::set_var(self.key, prev) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn publish_defaults_are_dry_run_with_two_in_flight() {
        let _lock = env_lock();
        let _a = EnvGuard::set("REVIEW_SYNC_DRY_RUN", None);
        let _b = EnvGuard::set("REVIEW_SYNC_CONCURRENCY", None);
        let cfg = PublishConfig::default();
        assert!(cfg.dry_run);
        assert_eq!(cfg.max_concurrency, 2);
    }

    #[test]
    fn publish_env_overrides() {
        let _lock = env_lock();
        let _b = EnvGuard::set("REVIEW_SYNC_CONCURRENCY", Some("8"));
        for (raw, expected) in [("false", false), ("0", false), ("TRUE", true), ("on", true)] {
            let _a = EnvGuard::set("REVIEW_SYNC_DRY_RUN", Some(raw));
            assert_eq!(PublishConfig::default().dry_run, expected, "{raw}");
        }
        assert_eq!(PublishConfig::default().max_concurrency, 8);

        let _c = EnvGuard::set("REVIEW_SYNC_CONCURRENCY", Some("many"));
        assert_eq!(PublishConfig::default().max_concurrency, 2);
    }

    #[test]
    fn no_platform_means_offline() {
        let _lock = env_lock();
        let _p = EnvGuard::set("REVIEW_SYNC_PLATFORM", None);
        assert!(PlatformConfig::from_env().unwrap().is_none());
        let _p = EnvGuard::set("REVIEW_SYNC_PLATFORM", Some(" "));
        assert!(PlatformConfig::from_env().unwrap().is_none());
    }

    #[test]
    fn github_config_from_env() {
        let _lock = env_lock();
        let _env = [
            EnvGuard::set("REVIEW_SYNC_PLATFORM", Some("GitHub")),
            EnvGuard::set("REVIEW_SYNC_PR", Some("42")),
            EnvGuard::set("GITHUB_API_URL", None),
            EnvGuard::set("GITHUB_TOKEN", Some("tok")),
            EnvGuard::set("GITHUB_REPOSITORY", Some("acme/widgets")),
            EnvGuard::set("REVIEW_SYNC_HEAD_SHA", Some("deadbeef")),
        ];
        let Some(PlatformConfig::GitHub(cfg)) = PlatformConfig::from_env().unwrap() else {
            panic!("expected github config");
        };
        assert_eq!(cfg.api_url, "https://api.github.com");
        assert_eq!((cfg.owner.as_str(), cfg.repo.as_str()), ("acme", "widgets"));
        assert_eq!(cfg.pull_number, 42);

        let _bad = EnvGuard::set("GITHUB_REPOSITORY", Some("widgets"));
        assert!(matches!(
            PlatformConfig::from_env(),
            Err(PlatformError::Validation(_))
        ));
    }

    #[test]
    fn missing_pr_number_is_a_config_error() {
        let _lock = env_lock();
        let _env = [
            EnvGuard::set("REVIEW_SYNC_PLATFORM", Some("azure")),
            EnvGuard::set("REVIEW_SYNC_PR", None),
        ];
        assert!(matches!(
            PlatformConfig::from_env(),
            Err(PlatformError::Config(_))
        ));
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let _lock = env_lock();
        let _env = [
            EnvGuard::set("REVIEW_SYNC_PLATFORM", Some("gitlab")),
            EnvGuard::set("REVIEW_SYNC_PR", Some("1")),
        ];
        assert!(matches!(
            PlatformConfig::from_env(),
            Err(PlatformError::Validation(_))
        ));
    }

    /// Adapter that records nothing and fails every update.
    struct Flaky;

    impl PlatformAdapter for Flaky {
        fn kind(&self) -> PlatformKind {
            PlatformKind::GitHub
        }

        async fn list_comments(&self) -> PlatformResult<Vec<ExistingComment>> {
            Ok(Vec::new())
        }

        async fn apply_action(&self, action: &PlanAction) -> PlatformResult<Option<String>> {
            match action {
                PlanAction::Update { .. } => Err(ProviderError::from_status(500).into()),
                _ => Ok(Some("remote".into())),
            }
        }
    }

    fn plan() -> PostPlan {
        PostPlan {
            actions: vec![
                PlanAction::Create {
                    path: CanonicalPath::new("src/a.rs"),
                    line: Some(3),
                    findings: vec![],
                    body: "b".into(),
                },
                PlanAction::Update {
                    target_comment_id: "1".into(),
                    thread_id: None,
                    markers_to_remove: vec!["F".into()],
                    stale_count: 1,
                    body: "b".into(),
                },
                PlanAction::ResolveThread {
                    target_comment_id: "2".into(),
                    thread_id: Some("t".into()),
                    stale_count: 2,
                },
            ],
        }
    }

    #[tokio::test]
    async fn failures_are_recorded_and_do_not_stop_the_plan() {
        let cfg = PublishConfig {
            dry_run: false,
            max_concurrency: 2,
        };
        let out = Flaky.apply_post_plan(&plan(), &cfg).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out.iter().map(|o| o.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(out[0].performed);
        assert!(!out[1].performed);
        assert!(out[1].error.as_deref().unwrap().contains("500"));
        assert_eq!(out[2].action, "resolve_thread");
        assert!(out[2].performed);
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let cfg = PublishConfig {
            dry_run: true,
            max_concurrency: 2,
        };
        let out = Flaky.apply_post_plan(&plan(), &cfg).await;
        assert!(
            out.iter()
                .all(|o| !o.performed && o.skipped_reason.as_deref() == Some("dry-run"))
        );
    }
}
