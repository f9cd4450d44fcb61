//! P8: a file inside any nested sub-repository is never tracked,
//! regardless of extension.

use std::sync::Arc;

use confsnap_core::service::Service;

use crate::fixtures::{NoopMirror, RecordingReloadHook, TestRepo};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[tokio::test]
async fn nested_repo_file_is_never_staged_even_with_tracked_extension() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.nested_repo_dir("addons/custom")?;
    repo.write("addons/custom/config.yaml", "x: 1")?;

    let outcome = repo.service.commit_all().await?;
    assert!(!outcome.committed, "the only changed path is inside a nested repo");

    let history = repo.service.history(None).await?;
    assert!(history.is_empty());
    Ok(())
}

#[tokio::test]
async fn nested_repo_changes_are_excluded_from_a_mixed_batch() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.nested_repo_dir("addons/custom")?;
    repo.write("addons/custom/config.yaml", "x: 1")?;
    repo.write("z.yaml", "tracked")?;

    let outcome = repo.service.commit_all().await?;
    assert!(outcome.committed);
    assert_eq!(outcome.paths, vec!["z.yaml".to_string()]);
    assert_eq!(outcome.message, "z.yaml");

    let head = repo.service.history(Some(1)).await?;
    let changed = repo.service.changed_in_commit(&head[0].hash).await?;
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].path, "z.yaml");
    Ok(())
}

/// When a nested repo already exists before the Repository Manager's
/// startup sequence runs, the ignore-file must deny it from the start
/// (§4.B, §4.C steps 4-5) and the first-run baseline commit must not
/// include it.
#[tokio::test]
async fn startup_excludes_pre_existing_nested_repo_from_the_baseline_commit() -> TestResult {
    let dir = tempfile::tempdir()?;
    let nested = dir.path().join("addons/custom");
    std::fs::create_dir_all(&nested)?;
    let init = std::process::Command::new("git").arg("-C").arg(&nested).args(["init"]).output()?;
    assert!(init.status.success());
    std::fs::write(nested.join("config.yaml"), "x: 1")?;
    std::fs::write(dir.path().join("z.yaml"), "tracked")?;

    let reload_hook = RecordingReloadHook::new();
    let service = Service::new(dir.path().to_path_buf(), reload_hook, Arc::new(NoopMirror));
    service.start().await?;

    let ignore_text = std::fs::read_to_string(dir.path().join(".gitignore"))?;
    assert!(ignore_text.contains("/addons/custom\n"));
    assert!(ignore_text.contains("/addons/custom/**\n"));

    let history = service.history(None).await?;
    assert_eq!(history.len(), 1, "one baseline commit for z.yaml and the ignore-file");

    let changed = service.changed_in_commit(&history[0].hash).await?;
    assert!(changed.iter().any(|c| c.path == "z.yaml"));
    assert!(!changed.iter().any(|c| c.path.starts_with("addons/")));
    Ok(())
}
