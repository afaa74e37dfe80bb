//! `review-sync`: reconciles analysis findings with a pull request's review
//! comments and applies the resulting plan.
//!
//! Inputs are JSON files named by env (`REVIEW_SYNC_FINDINGS`,
//! `REVIEW_SYNC_DIFF`). Existing comments come from the configured platform,
//! or from `REVIEW_SYNC_COMMENTS` when `REVIEW_SYNC_PLATFORM` is unset.
//! The run report is printed to stdout as JSON.

mod report;
mod telemetry;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use platforms::{PlatformAdapter, PlatformClient, PlatformConfig, PublishConfig};
use reconcile::config::must_env;
use reconcile::{CanonicalDiffFile, ExistingComment, Finding, ReconcileConfig};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::report::RunReport;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; CI passes plain env vars.
    dotenvy::dotenv().ok();
    telemetry::init();

    let started = Instant::now();
    let cfg = ReconcileConfig::from_env().context("invalid engine configuration")?;
    let findings: Vec<Finding> = read_json(&must_env("REVIEW_SYNC_FINDINGS")?)?;
    let diff_files: Vec<CanonicalDiffFile> = read_json(&must_env("REVIEW_SYNC_DIFF")?)?;

    let client = PlatformConfig::from_env()
        .context("invalid platform configuration")?
        .map(PlatformClient::from_config)
        .transpose()
        .context("failed to build platform client")?;

    let comments: Vec<ExistingComment> = match &client {
        Some(c) => c
            .list_comments()
            .await
            .with_context(|| format!("failed to list comments on {:?}", c.kind()))?,
        None => match std::env::var("REVIEW_SYNC_COMMENTS") {
            Ok(p) if !p.trim().is_empty() => read_json(&p)?,
            _ => Vec::new(),
        },
    };

    info!(
        findings = findings.len(),
        diff_files = diff_files.len(),
        comments = comments.len(),
        online = client.is_some(),
        "review-sync: inputs loaded"
    );

    let outcome = reconcile::run(findings, &diff_files, &comments, &cfg);

    let publish = PublishConfig::default();
    let actions = match &client {
        Some(c) => c.apply_post_plan(&outcome.plan, &publish).await,
        None => Vec::new(),
    };

    let report = RunReport::new(
        client.as_ref().map(|c| c.kind()),
        client.is_none() || publish.dry_run,
        outcome,
        actions,
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!("{}", report.summary());
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "review-sync: done");

    if report.failed_actions() > 0 {
        anyhow::bail!("{} plan actions failed", report.failed_actions());
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let path = Path::new(path);
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
