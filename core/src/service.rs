//! Service facade (§6 "Operations the core exposes"): the seam a thin
//! HTTP layer (out of scope here) would bolt onto without touching core
//! logic. The CLI binary is the only caller inside this workspace.

use std::path::PathBuf;
use std::sync::Arc;

use crate::commit_engine;
use crate::error::CoreResult;
use crate::repo_driver::{Commit, LogFilter, RepoDriver, RepoStatus};
use crate::repo_manager::RepositoryManager;
use crate::restore::{HardResetOutcome, ReloadHook, ReloadOutcome, RestoreEngine};
use crate::retention::{RetentionEngine, RetentionPreview, RetentionReport};
use crate::scheduler::{MirrorPush, Scheduler};
use crate::settings::{Settings, SettingsStore};
use crate::watcher::{Watcher, WatcherHandle};

pub struct Service {
    pub root: PathBuf,
    pub driver: Arc<RepoDriver>,
    pub repo_manager: Arc<RepositoryManager>,
    pub settings: Arc<SettingsStore>,
    pub retention: Arc<RetentionEngine>,
    pub restore: Arc<RestoreEngine>,
    pub watcher: Arc<Watcher>,
    pub scheduler: Arc<Scheduler>,
}

impl Service {
    pub fn new(root: PathBuf, reload_hook: Arc<dyn ReloadHook>, mirror: Arc<dyn MirrorPush>) -> Self {
        let settings_path = crate::paths::settings_path(&root);
        let settings = Arc::new(SettingsStore::load(settings_path).expect("settings load"));
        let driver = Arc::new(RepoDriver::new(root.clone()));
        let repo_manager = Arc::new(RepositoryManager::new(
            root.clone(),
            driver.clone(),
            settings.clone(),
        ));
        let retention = Arc::new(RetentionEngine::new(driver.clone(), settings.clone()));
        let restore = Arc::new(RestoreEngine::new(driver.clone(), settings.clone(), reload_hook));
        let scheduler = Arc::new(Scheduler::new(settings.clone(), retention.clone(), mirror));
        let watcher = Arc::new(Watcher::new(
            root.clone(),
            driver.clone(),
            settings.clone(),
            scheduler.clone(),
        ));

        Self {
            root,
            driver,
            repo_manager,
            settings,
            retention,
            restore,
            watcher,
            scheduler,
        }
    }

    /// Runs the Repository Manager startup sequence (§4.C). Must
    /// complete before any other operation is valid.
    pub async fn start(&self) -> CoreResult<()> {
        self.repo_manager.startup().await
    }

    /// Spawns the watcher/debouncer and scheduler background tasks.
    /// Returns a handle whose drop cancels the watcher tasks.
    pub fn spawn_background(&self) -> (WatcherHandle, tokio::task::JoinHandle<()>) {
        let watcher_handle = self.watcher.clone().spawn();
        let scheduler_handle = self.scheduler.clone().spawn();
        (watcher_handle, scheduler_handle)
    }

    // ---- read operations ----

    pub async fn history(&self, max_count: Option<usize>) -> CoreResult<Vec<Commit>> {
        self.repo_manager.require_ready()?;
        self.driver
            .log(Some(LogFilter {
                path: None,
                max_count,
            }))
            .await
    }

    pub async fn history_for_path(&self, path: &str) -> CoreResult<Vec<Commit>> {
        self.repo_manager.require_ready()?;
        self.driver
            .log(Some(LogFilter {
                path: Some(path),
                max_count: None,
            }))
            .await
    }

    pub async fn content_at(&self, commit: &str, path: &str) -> CoreResult<Vec<u8>> {
        self.repo_manager.require_ready()?;
        self.driver.file_at_commit(commit, path).await
    }

    pub async fn changed_in_commit(&self, commit: &str) -> CoreResult<Vec<crate::repo_driver::ChangedPath>> {
        self.repo_manager.require_ready()?;
        self.driver.commit_details(commit).await
    }

    pub async fn diff_commit(&self, commit: &str) -> CoreResult<String> {
        self.repo_manager.require_ready()?;
        let parent = self
            .driver
            .first_parent(commit)
            .await?
            .unwrap_or_else(|| commit.to_string());
        self.driver.diff(&parent, commit, None).await
    }

    pub async fn diff_path_across(&self, path: &str, a: &str, b: &str) -> CoreResult<String> {
        self.repo_manager.require_ready()?;
        self.driver.diff(a, b, Some(&[path])).await
    }

    pub async fn status(&self) -> CoreResult<RepoStatus> {
        self.repo_manager.require_ready()?;
        self.driver.status().await
    }

    pub async fn repo_age(&self) -> CoreResult<Option<chrono::Duration>> {
        self.repo_manager.require_ready()?;
        let log = self.driver.log(None).await?;
        Ok(log
            .last()
            .map(|oldest| chrono::Utc::now() - oldest.committer_time))
    }

    pub fn settings_snapshot(&self) -> Settings {
        self.settings.snapshot()
    }

    pub fn update_settings<F>(&self, mutate: F) -> CoreResult<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        self.settings.update(mutate)
    }

    // ---- mutating operations ----

    pub async fn commit_all(&self) -> CoreResult<commit_engine::CommitOutcome> {
        self.repo_manager.require_ready()?;
        self.driver.reset_head(None).await?;
        self.driver.add(&["."]).await?;
        let outcome = commit_engine::run(&self.driver, &self.settings, None).await?;
        if outcome.committed {
            self.scheduler.after_commit().await;
        }
        Ok(outcome)
    }

    pub async fn restore_file(&self, commit: &str, path: &str) -> CoreResult<ReloadOutcome> {
        self.repo_manager.require_ready()?;
        self.restore.restore_file(commit, path).await
    }

    pub async fn restore_commit(
        &self,
        source: &str,
        target: &str,
    ) -> CoreResult<(Vec<String>, ReloadOutcome)> {
        self.repo_manager.require_ready()?;
        self.restore.restore_commit(source, target).await
    }

    pub async fn hard_reset(&self, commit: &str, create_backup: bool) -> CoreResult<HardResetOutcome> {
        self.repo_manager.require_ready()?;
        let commits = self.driver.log(Some(LogFilter { path: None, max_count: None })).await?;
        let target = commits
            .iter()
            .find(|c| c.hash == commit || c.short_hash == commit)
            .ok_or_else(|| crate::error::CoreError::AbsentAtCommit {
                commit: commit.to_string(),
                path: PathBuf::from("."),
            })?;
        let human_date = target.committer_time.format("%b %-d, %Y %-I:%M %p").to_string();
        self.restore
            .hard_reset(&target.hash, create_backup, &human_date, &target.short_hash)
            .await
    }

    pub async fn retention_preview(&self) -> CoreResult<RetentionPreview> {
        self.repo_manager.require_ready()?;
        self.retention.preview().await
    }

    pub async fn retention_run(&self) -> CoreResult<RetentionReport> {
        self.repo_manager.require_ready()?;
        self.retention.run().await
    }
}
