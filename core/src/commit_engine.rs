//! Commit Engine (§4.E): executes one commit intent.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::ignore_file;
use crate::log::emit;
use crate::repo_driver::{IndexStatus, RepoDriver};
use crate::repo_manager::unstage_nested_repos;
use crate::settings::SettingsStore;
use crate::tracked_paths::is_tracked;

/// Commit message composition (§4.E step 6, §6 grammar, §3 invariant 1a/b).
pub fn compose_message(paths: &[&str]) -> String {
    match paths {
        [] => String::new(),
        [only] => only.to_string(),
        [a, b] => format!("{a}, {b}"),
        many => format!("{} files", many.len()),
    }
}

pub struct CommitOutcome {
    pub committed: bool,
    pub hash: Option<String>,
    pub paths: Vec<String>,
    pub message: String,
}

/// Runs one commit intent to completion (§4.E). `triggering_path` is
/// informational only — the engine always re-derives the staged set from
/// `Status()`, since other pending work may have landed in the index.
pub async fn run(
    driver: &Arc<RepoDriver>,
    settings: &Arc<SettingsStore>,
    _triggering_path: Option<&str>,
) -> CoreResult<CommitOutcome> {
    // 1. Query status.
    let status = driver.status().await?;

    // 2. Drop if clean.
    if status.clean {
        emit("DEBUG", format_args!("commit intent produced no changes; dropping"));
        return Ok(CommitOutcome {
            committed: false,
            hash: None,
            paths: Vec::new(),
            message: String::new(),
        });
    }

    // 1.5 (SPEC_FULL §C). Unstage any nested sub-repos that slipped back
    // into the index before we enumerate what's staged.
    let root = driver.root().to_path_buf();
    let nested = ignore_file::discover_nested_repos(&root);
    unstage_nested_repos(driver, &nested).await?;

    // 3. Enumerate staged paths (index-status not unmodified/untracked).
    let status = driver.status().await?;
    let staged: Vec<String> = status
        .files
        .iter()
        .filter(|f| !matches!(f.index_status, IndexStatus::Unmodified | IndexStatus::Untracked))
        .map(|f| f.path.clone())
        .collect();

    // 4. Re-apply tracked-file filter (defence in depth).
    let extensions = settings.snapshot().tracked_extensions;
    let filtered: Vec<String> = staged
        .into_iter()
        .filter(|p| is_tracked(p, &extensions))
        .collect();

    // 5. If empty, reset and drop.
    if filtered.is_empty() {
        driver.reset_head(None).await?;
        return Ok(CommitOutcome {
            committed: false,
            hash: None,
            paths: Vec::new(),
            message: String::new(),
        });
    }

    // Make sure only the filtered set is staged: unstage anything that
    // snuck in but failed the re-applied filter.
    let all_staged: Vec<String> = status
        .files
        .iter()
        .filter(|f| !matches!(f.index_status, IndexStatus::Unmodified | IndexStatus::Untracked))
        .map(|f| f.path.clone())
        .collect();
    for path in &all_staged {
        if !filtered.contains(path) {
            driver.reset_head(Some(path)).await?;
        }
    }

    // 6. Compose message.
    let refs: Vec<&str> = filtered.iter().map(|s| s.as_str()).collect();
    let message = compose_message(&refs);

    // 7. Commit.
    let hash = match driver.commit(&message).await {
        Ok(hash) => hash,
        Err(CoreError::NothingToCommit) => {
            return Ok(CommitOutcome {
                committed: false,
                hash: None,
                paths: Vec::new(),
                message: String::new(),
            });
        }
        Err(other) => return Err(other),
    };

    emit("INFO", format_args!("committed {hash} \"{message}\""));

    Ok(CommitOutcome {
        committed: true,
        hash: Some(hash),
        paths: filtered,
        message,
    })
}
