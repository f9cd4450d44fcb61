//! Restore Engine (§4.G): per-file, per-commit-set, and hard-reset
//! restores. Working-tree writes are re-observed by the Watcher, which
//! produces the actual new commits — this module only performs the
//! `Checkout`/staging side, plus the platform reload hook dispatch.

use std::sync::Arc;

use crate::error::CoreResult;
use crate::log::emit;
use crate::repo_driver::{ChangeKind, RepoDriver};
use crate::settings::SettingsStore;
use crate::tracked_paths::{is_tracked, RELOAD_TRIGGERING_PATHS};

#[derive(Debug, Clone, Default)]
pub struct ReloadOutcome {
    pub automations_reloaded: bool,
    pub scripts_reloaded: bool,
}

/// External reload hook (§6 "Platform reload hook"): two fire-and-forget
/// calls, bounded 5s timeout each, non-fatal on failure. This trait lets
/// the CLI/HTTP layer supply the real platform integration while tests
/// supply a recording stub.
#[async_trait::async_trait]
pub trait ReloadHook: Send + Sync {
    async fn reload_automations(&self);
    async fn reload_scripts(&self);
    async fn request_restart(&self);
}

pub struct NoopReloadHook;

#[async_trait::async_trait]
impl ReloadHook for NoopReloadHook {
    async fn reload_automations(&self) {}
    async fn reload_scripts(&self) {}
    async fn request_restart(&self) {}
}

pub struct RestoreEngine {
    driver: Arc<RepoDriver>,
    settings: Arc<SettingsStore>,
    reload_hook: Arc<dyn ReloadHook>,
}

impl RestoreEngine {
    pub fn new(
        driver: Arc<RepoDriver>,
        settings: Arc<SettingsStore>,
        reload_hook: Arc<dyn ReloadHook>,
    ) -> Self {
        Self {
            driver,
            settings,
            reload_hook,
        }
    }

    /// 1. Restore single file (§4.G.1).
    pub async fn restore_file(&self, commit: &str, path: &str) -> CoreResult<ReloadOutcome> {
        self.driver.checkout(commit, path).await?;
        Ok(self.maybe_reload(&[path.to_string()]).await)
    }

    /// 2. Restore commit, partial (§4.G.2).
    pub async fn restore_commit(
        &self,
        source_commit: &str,
        target_commit: &str,
    ) -> CoreResult<(Vec<String>, ReloadOutcome)> {
        let mut changed = self.driver.commit_details(source_commit).await?;
        if changed.is_empty() {
            // fall back to a diff against parent per §4.G.2.
            if let Some(parent) = self.driver.first_parent(source_commit).await? {
                let diff_text = self.driver.diff(&parent, source_commit, None).await?;
                changed = diff_paths_from_unified(&diff_text);
            }
        }

        let extensions = self.settings.snapshot().tracked_extensions;
        let paths: Vec<String> = changed
            .into_iter()
            .map(|c| c.path)
            .filter(|p| is_tracked(p, &extensions))
            .collect();

        for path in &paths {
            self.driver.checkout(target_commit, path).await?;
        }

        let reload = self.maybe_reload(&paths).await;
        Ok((paths, reload))
    }

    /// 3. Hard reset (§4.G.3). Does not rewrite branch shape: it stacks
    /// forward commits (optional safety backup, then the restore).
    pub async fn hard_reset(
        &self,
        commit: &str,
        create_backup: bool,
        human_target_date: &str,
        short_hash: &str,
    ) -> CoreResult<HardResetOutcome> {
        let mut backup_hash = None;

        if create_backup {
            self.driver.add(&["."]).await?;
            let status = self.driver.status().await?;
            if !status.clean {
                let now = chrono::Utc::now().to_rfc3339();
                let message =
                    format!("Safety backup before hard reset to {short_hash} - {now}");
                match self.driver.commit(&message).await {
                    Ok(hash) => backup_hash = Some(hash),
                    Err(crate::error::CoreError::NothingToCommit) => {}
                    Err(other) => return Err(other),
                }
            } else {
                self.driver.reset_head(None).await?;
            }
        }

        let paths = self.driver.ls_tree(commit).await?;
        for path in &paths {
            self.driver.checkout(commit, path).await?;
        }

        self.driver.add(&["."]).await?;
        let message = format!("Restored all files to {human_target_date}");
        let restore_hash = match self.driver.commit(&message).await {
            Ok(hash) => Some(hash),
            Err(crate::error::CoreError::NothingToCommit) => None,
            Err(other) => return Err(other),
        };

        let reload = self.maybe_reload(&paths).await;
        emit(
            "INFO",
            format_args!("hard reset to {commit} complete (backup: {backup_hash:?})"),
        );

        Ok(HardResetOutcome {
            backup_hash,
            restore_hash,
            reload,
        })
    }

    async fn maybe_reload(&self, touched_paths: &[String]) -> ReloadOutcome {
        let mut outcome = ReloadOutcome::default();
        for path in touched_paths {
            if path == RELOAD_TRIGGERING_PATHS[0] {
                self.reload_hook.reload_automations().await;
                outcome.automations_reloaded = true;
            }
            if path == RELOAD_TRIGGERING_PATHS[1] {
                self.reload_hook.reload_scripts().await;
                outcome.scripts_reloaded = true;
            }
        }
        outcome
    }
}

#[derive(Debug, Clone)]
pub struct HardResetOutcome {
    pub backup_hash: Option<String>,
    pub restore_hash: Option<String>,
    pub reload: ReloadOutcome,
}

fn diff_paths_from_unified(diff_text: &str) -> Vec<crate::repo_driver::ChangedPath> {
    diff_text
        .lines()
        .filter_map(|line| line.strip_prefix("+++ b/"))
        .map(|path| crate::repo_driver::ChangedPath {
            path: path.to_string(),
            kind: ChangeKind::Modified,
        })
        .collect()
}
