//! §8 scenarios 5-6 plus invariant P6 (restore idempotence).

use crate::fixtures::TestRepo;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// §8 scenario 5: hard reset with backup.
#[tokio::test]
async fn hard_reset_with_backup_creates_two_commits_and_matches_target_tree() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("a.yaml", "original")?;
    repo.service.commit_all().await?;
    let c_history = repo.service.history(Some(1)).await?;
    let target_commit = c_history[0].hash.clone();

    // Uncommitted change on top of C.
    repo.write("a.yaml", "dirty, uncommitted edit")?;

    let before = repo.service.history(None).await?;
    let outcome = repo.service.hard_reset(&target_commit, true).await?;

    assert!(outcome.backup_hash.is_some(), "dirty working tree should produce a safety backup");
    assert!(outcome.restore_hash.is_some());

    let after = repo.service.history(None).await?;
    assert_eq!(after.len(), before.len() + 2, "exactly two new commits: backup, then restore");

    let backup_commit = repo
        .service
        .history(None)
        .await?
        .into_iter()
        .find(|c| Some(&c.hash) == outcome.backup_hash.as_ref())
        .expect("backup commit present in history");
    assert!(backup_commit.subject.starts_with("Safety backup before hard reset to "));

    let restore_commit = repo
        .service
        .history(Some(1))
        .await?
        .remove(0);
    assert!(restore_commit.subject.starts_with("Restored all files to "));

    assert_eq!(repo.read("a.yaml")?, "original");
    Ok(())
}

/// §8 scenario 6: partial restore-commit.
#[tokio::test]
async fn restore_commit_reverts_only_the_paths_the_source_touched() -> TestResult {
    let repo = TestRepo::new().await?;

    repo.write("a.yaml", "a-base")?;
    repo.write("b.yaml", "b-base")?;
    repo.write("c.yaml", "c-base")?;
    repo.service.commit_all().await?;

    // C1 changes {a, b}.
    repo.write("a.yaml", "a-c1")?;
    repo.write("b.yaml", "b-c1")?;
    let c1 = repo.service.commit_all().await?;
    assert!(c1.committed);
    let c1_hash = c1.hash.unwrap();

    // C2 changes {b, c}; HEAD is now C2.
    repo.write("b.yaml", "b-c2")?;
    repo.write("c.yaml", "c-c2")?;
    let c2 = repo.service.commit_all().await?;
    assert!(c2.committed);

    let before = repo.service.history(None).await?;
    let (paths, _reload) = repo.service.restore_commit(&c1_hash, &c1_hash).await?;

    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["a.yaml".to_string(), "b.yaml".to_string()]);

    assert_eq!(repo.read("a.yaml")?, "a-c1");
    assert_eq!(repo.read("b.yaml")?, "b-c1");
    assert_eq!(repo.read("c.yaml")?, "c-c2", "c.yaml was not touched by C1, must stay as-is");

    let after = repo.service.history(None).await?;
    assert_eq!(after.len(), before.len(), "restore_commit only stages; the watcher commits it");

    // Simulate the watcher observing and capturing the staged restore.
    let committed = repo.service.commit_all().await?;
    assert!(committed.committed);
    assert_eq!(committed.message, "a.yaml, b.yaml");
    Ok(())
}

/// P6: restoring the same path to the same commit twice in a row
/// produces one commit, then a no-op.
#[tokio::test]
async fn restore_file_twice_is_idempotent() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("a.yaml", "v1")?;
    repo.service.commit_all().await?;
    repo.write("a.yaml", "v2")?;
    repo.service.commit_all().await?;

    let history = repo.service.history(None).await?;
    let v1_commit = history.last().unwrap().hash.clone();

    repo.service.restore_file(&v1_commit, "a.yaml").await?;
    let first_commit = repo.service.commit_all().await?;
    assert!(first_commit.committed);
    assert_eq!(repo.read("a.yaml")?, "v1");

    repo.service.restore_file(&v1_commit, "a.yaml").await?;
    let second_commit = repo.service.commit_all().await?;
    assert!(!second_commit.committed, "restoring to the already-current content is a no-op");

    Ok(())
}

/// Restoring a lovelace UI-state file invokes the platform reload hook;
/// restoring `.HA_VERSION` does not.
#[tokio::test]
async fn restore_file_triggers_reload_only_for_reload_triggering_paths() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write(".storage/lovelace", "{}")?;
    repo.write(".HA_VERSION", "2024.1.0")?;
    repo.service.commit_all().await?;

    repo.write(".storage/lovelace", "{\"changed\":true}")?;
    repo.service.commit_all().await?;

    let history = repo.service.history(None).await?;
    let earlier = history.last().unwrap().hash.clone();

    let outcome = repo.service.restore_file(&earlier, ".storage/lovelace").await?;
    assert!(outcome.automations_reloaded);
    assert_eq!(repo.reload_hook.automations_count(), 1);

    let outcome2 = repo.service.restore_file(&earlier, ".HA_VERSION").await?;
    assert!(!outcome2.automations_reloaded && !outcome2.scripts_reloaded);
    assert_eq!(repo.reload_hook.automations_count(), 1);
    Ok(())
}
