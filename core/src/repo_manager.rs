//! Repository Manager (§4.C): startup sequence, ignore-file reconciliation,
//! nested sub-repo hygiene, and the baseline commit on first run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreError, CoreResult};
use crate::identity::{COMMITTER_EMAIL, COMMITTER_NAME};
use crate::ignore_file;
use crate::repo_driver::RepoDriver;
use crate::settings::SettingsStore;

pub struct RepositoryManager {
    root: PathBuf,
    driver: Arc<RepoDriver>,
    settings: Arc<SettingsStore>,
    ready: AtomicBool,
}

impl RepositoryManager {
    pub fn new(root: PathBuf, driver: Arc<RepoDriver>, settings: Arc<SettingsStore>) -> Self {
        Self {
            root,
            driver,
            settings,
            ready: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn driver(&self) -> &Arc<RepoDriver> {
        &self.driver
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn require_ready(&self) -> CoreResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CoreError::NotInitialised)
        }
    }

    /// Idempotent startup sequence (§4.C steps 1-9).
    pub async fn startup(&self) -> CoreResult<()> {
        // 1. Resolve / create config root.
        std::fs::create_dir_all(&self.root)?;
        verify_writable(&self.root)?;

        // 2. Committer identity + trusted directory.
        self.driver.set_identity(COMMITTER_NAME, COMMITTER_EMAIL).await?;
        self.driver.add_safe_directory(&self.root).await?;

        // 3. Initialise if not already a repository.
        if !self.driver.is_repository().await {
            self.driver.init().await?;
        }

        // 4 + 5. Discover nested repos, reconcile ignore-file.
        let nested = ignore_file::discover_nested_repos(&self.root);
        let extensions = self.settings.snapshot().tracked_extensions;
        ignore_file::reconcile(&self.root, &extensions, &nested)?;

        // 6. Unstage nested repos if already indexed.
        unstage_nested_repos(&self.driver, &nested).await?;

        // 7. Stage everything, unstage nested repos again (resolved Open
        // Question, SPEC_FULL §C: every Add(".") immediately followed by
        // ResetHead on every known nested-repo path).
        self.driver.add(&["."]).await?;
        unstage_nested_repos(&self.driver, &nested).await?;

        // 8. Commit only if the index differs from HEAD.
        let status = self.driver.status().await?;
        if !status.clean {
            let message = crate::commit_engine::compose_message(
                &status
                    .files
                    .iter()
                    .map(|f| f.path.as_str())
                    .collect::<Vec<_>>(),
            );
            match self.driver.commit(&message).await {
                Ok(_) => {}
                Err(CoreError::NothingToCommit) => {}
                Err(other) => return Err(other),
            }
        }

        // 9. Ready.
        self.ready.store(true, Ordering::Release);
        Ok(())
    }
}

/// Unstages every known nested-repo path (cached only, §4.B/§4.C/§9).
/// Shared by startup and the Commit Engine's staging step so there is
/// exactly one code path (SPEC_FULL §C).
pub async fn unstage_nested_repos(driver: &RepoDriver, nested: &[PathBuf]) -> CoreResult<()> {
    for repo in nested {
        let rel = repo.to_string_lossy().replace('\\', "/");
        driver.rm_cached(&rel).await?;
    }
    Ok(())
}

fn verify_writable(root: &Path) -> CoreResult<()> {
    let probe = root.join(".confsnap-write-check");
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            Ok(())
        }
        Err(_) => Err(CoreError::WriteDenied(root.to_path_buf())),
    }
}
