//! Retention Engine (§4.F): time-bounded history compaction via synthetic
//! baseline + rebase, with safety backup and abort/recovery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::commit_engine;
use crate::error::{CoreError, CoreResult};
use crate::log::emit;
use crate::repo_driver::{Commit, RepoDriver};
use crate::settings::SettingsStore;
use crate::tracked_paths::is_tracked;

pub struct RetentionWindow {
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl RetentionWindow {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::days(self.months * 30)
            + chrono::Duration::weeks(self.weeks)
            + chrono::Duration::days(self.days)
            + chrono::Duration::hours(self.hours)
            + chrono::Duration::minutes(self.minutes)
            + chrono::Duration::seconds(self.seconds)
    }
}

#[derive(Debug, Clone)]
pub struct RetentionPreview {
    pub cutoff: DateTime<Utc>,
    pub split_size: usize,
    pub sample_merged: Vec<Commit>,
    pub within_retention: bool,
}

#[derive(Debug, Clone)]
pub struct RetentionReport {
    pub merged_count: usize,
    pub baseline_hash: Option<String>,
    pub backup_branch: Option<String>,
    pub kept_count: usize,
}

/// Guards concurrent retention runs with `try_lock` so a concurrent
/// caller fails fast with `CleanupInProgress` rather than queueing
/// (§4.F, §7, SPEC_FULL §B).
pub struct RetentionEngine {
    driver: Arc<RepoDriver>,
    settings: Arc<SettingsStore>,
    cleanup_lock: Mutex<()>,
}

impl RetentionEngine {
    pub fn new(driver: Arc<RepoDriver>, settings: Arc<SettingsStore>) -> Self {
        Self {
            driver,
            settings,
            cleanup_lock: Mutex::new(()),
        }
    }

    /// Non-mutating preview of what a run would do right now (§6).
    pub async fn preview(&self) -> CoreResult<RetentionPreview> {
        let settings = self.settings.snapshot();
        let cutoff = Utc::now() - settings.retention_duration();
        let log = self.driver.log(None).await?;

        match split_index(&log, cutoff) {
            None => Ok(RetentionPreview {
                cutoff,
                split_size: 0,
                sample_merged: Vec::new(),
                within_retention: true,
            }),
            Some(split) => {
                let merged = &log[split..];
                Ok(RetentionPreview {
                    cutoff,
                    split_size: merged.len(),
                    sample_merged: merged.iter().take(5).cloned().collect(),
                    within_retention: false,
                })
            }
        }
    }

    /// Runs a full retention pass (§4.F steps 1-9).
    pub async fn run(&self) -> CoreResult<RetentionReport> {
        let _cleanup_guard = self
            .cleanup_lock
            .try_lock()
            .map_err(|_| CoreError::CleanupInProgress)?;

        // 1. Clean working tree precondition.
        self.ensure_clean_working_tree().await?;

        // 2. Resolve cutoff.
        let settings = self.settings.snapshot();
        let cutoff = Utc::now() - settings.retention_duration();

        // 3. Classify commits.
        let log = self.driver.log(None).await?;
        let Some(split) = split_index(&log, cutoff) else {
            emit("INFO", format_args!("retention: nothing older than cutoff, no-op"));
            return Ok(RetentionReport {
                merged_count: 0,
                baseline_hash: None,
                backup_branch: None,
                kept_count: log.len(),
            });
        };

        let merged = &log[split..];
        let kept = &log[..split];

        // 5. Safety backup.
        let branch_tip = self.driver.rev_parse("HEAD").await?;
        let backup_branch = format!("backup-before-cleanup-{}", Utc::now().timestamp_millis());
        self.driver.create_branch(&backup_branch, &branch_tip).await?;

        let result = self.splice(merged, kept, &backup_branch).await;

        match result {
            Ok(baseline_hash) => {
                // 8. Object prune.
                self.driver.reflog_expire_now().await?;
                self.driver.gc().await?;
                Ok(RetentionReport {
                    merged_count: merged.len(),
                    baseline_hash,
                    backup_branch: Some(backup_branch),
                    kept_count: kept.len(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn ensure_clean_working_tree(&self) -> CoreResult<()> {
        let status = self.driver.status().await?;
        if status.clean {
            return Ok(());
        }

        let extensions = self.settings.snapshot().tracked_extensions;
        let tracked_dirty: Vec<String> = status
            .files
            .iter()
            .filter(|f| is_tracked(&f.path, &extensions))
            .map(|f| f.path.clone())
            .collect();

        if tracked_dirty.is_empty() {
            self.driver.reset_head(None).await?;
            return Ok(());
        }

        self.driver.add(&["."]).await?;
        let refs: Vec<&str> = tracked_dirty.iter().map(|s| s.as_str()).collect();
        let message = commit_engine::compose_message(&refs);
        match self.driver.commit(&message).await {
            Ok(_) => Ok(()),
            Err(CoreError::NothingToCommit) => Ok(()),
            Err(_) => Err(CoreError::DirtyWorkingTree),
        }
    }

    /// Steps 6-7: synthesises the baseline commit and splices kept
    /// commits onto it (normal path) or hard-resets onto it (everything
    /// merged path).
    async fn splice(
        &self,
        merged: &[Commit],
        kept: &[Commit],
        backup_branch: &str,
    ) -> CoreResult<Option<String>> {
        // newest merged = merged[0] (log is newest-first); oldest merged
        // = merged.last().
        let newest_merged = merged.first().expect("split guarantees >=1 merged commit");
        let oldest_merged = merged.last().expect("split guarantees >=1 merged commit");

        let tree_hash = self.driver.tree_hash_of(&newest_merged.hash).await?;
        let baseline_message = format!(
            "Merged history {}",
            oldest_merged.committer_time.to_rfc3339()
        );

        let baseline_hash = self
            .driver
            .commit_tree(
                &tree_hash,
                &baseline_message,
                newest_merged.committer_time,
                newest_merged.committer_time,
                &[],
            )
            .await?;

        if kept.is_empty() {
            // 7b: everything merged, hard-reset the branch.
            self.driver.reset_hard(&baseline_hash).await?;
            return Ok(Some(baseline_hash));
        }

        // 7a: normal path, rebase kept commits onto the baseline.
        let oldest_kept = kept.last().expect("kept non-empty");
        let upstream = match self.driver.first_parent(&oldest_kept.hash).await? {
            Some(parent) => parent,
            None => oldest_kept.hash.clone(),
        };

        let current_branch_status = self.driver.status().await?;
        let branch = current_branch_status.branch;

        if let Err(err) = self
            .driver
            .rebase_onto(&baseline_hash, &upstream, &branch)
            .await
        {
            emit(
                "WARN",
                format_args!(
                    "retention rebase conflicted; safety branch `{backup_branch}` left intact"
                ),
            );
            return Err(match err {
                CoreError::Git { .. } | CoreError::TimeoutExceeded { .. } => {
                    CoreError::RebaseConflict {
                        backup_branch: backup_branch.to_string(),
                    }
                }
                other => other,
            });
        }

        Ok(Some(baseline_hash))
    }
}

/// Finds the split index (§4.F step 3): the position of the first commit
/// (in newest-first order) whose committer timestamp is `<= cutoff`.
/// Everything above is kept, everything from the split down is merged.
fn split_index(log: &[Commit], cutoff: DateTime<Utc>) -> Option<usize> {
    log.iter().position(|c| c.committer_time <= cutoff)
}
