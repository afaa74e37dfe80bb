use chrono::{DateTime, Utc};
use colored::Colorize;
use platforms::{ActionOutcome, PlatformKind};
use reconcile::ReconcileOutcome;
use serde::Serialize;

/// JSON document printed to stdout after a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    /// `None` for offline runs.
    pub platform: Option<PlatformKind>,
    pub dry_run: bool,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
    pub actions: Vec<ActionOutcome>,
}

impl RunReport {
    pub fn new(
        platform: Option<PlatformKind>,
        dry_run: bool,
        outcome: ReconcileOutcome,
        actions: Vec<ActionOutcome>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            platform,
            dry_run,
            outcome,
            actions,
        }
    }

    pub fn failed_actions(&self) -> usize {
        self.actions.iter().filter(|a| a.error.is_some()).count()
    }

    /// Human summary for stderr.
    pub fn summary(&self) -> String {
        let s = &self.outcome.stats;
        let mut out = format!(
            "{} {} findings: {} posted, {} duplicate, {} near-duplicate, {} on deleted files, {} auto-fixed",
            "review-sync".cyan().bold(),
            s.total_findings,
            s.posted.to_string().green(),
            s.skipped_exact,
            s.skipped_proximity,
            s.dropped_deleted,
            s.auto_fixed,
        );
        out.push_str(&format!(
            "\n{} {} resolved, {} updated",
            "threads".cyan(),
            s.resolved_threads,
            s.updated_comments
        ));
        if !self.outcome.skipped.is_empty() {
            out.push_str(&format!(
                "\n{} {} skipped items",
                "warning".yellow().bold(),
                self.outcome.skipped.len()
            ));
        }
        let failed = self.failed_actions();
        if failed > 0 {
            out.push_str(&format!(
                "\n{} {failed} of {} actions failed",
                "error".red().bold(),
                self.actions.len()
            ));
        } else if self.dry_run && !self.outcome.plan.is_empty() {
            out.push_str(&format!(
                "\n{} {} actions not sent",
                "dry-run".yellow(),
                self.outcome.plan.len()
            ));
        }
        out
    }
}
