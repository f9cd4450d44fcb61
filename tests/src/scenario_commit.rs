//! §8 scenarios 1-3 plus invariants P1 (no empty commits) and P2 (message
//! shape), driven through [`Service::commit_all`] — the same Commit
//! Engine call path the watcher's debounce timers use once they fire.

use crate::fixtures::TestRepo;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[tokio::test]
async fn single_file_edit_produces_one_commit_with_path_message() -> TestResult {
    let repo = TestRepo::new().await?;

    repo.write("a.yaml", "x: 1")?;
    let initial = repo.service.commit_all().await?;
    assert!(initial.committed);
    let before = repo.commit_count().await?;

    repo.write("a.yaml", "x: 2")?;
    let outcome = repo.service.commit_all().await?;
    assert!(outcome.committed);
    assert_eq!(outcome.message, "a.yaml");

    let after = repo.commit_count().await?;
    assert_eq!(after, before + 1);

    let head = repo.service.history(Some(1)).await?;
    let content = repo.service.content_at(&head[0].hash, "a.yaml").await?;
    assert_eq!(String::from_utf8(content)?, "x: 2");
    Ok(())
}

#[tokio::test]
async fn coalesced_burst_settles_into_one_commit() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("b.yaml", "x: 1")?;
    repo.service.commit_all().await?;
    let before = repo.commit_count().await?;

    // Rapid rewrites within what would be a single debounce window: the
    // Commit Engine only ever sees the final settled state, so a single
    // commit_all pass after the burst must produce exactly one commit.
    repo.write("b.yaml", "x: 2")?;
    repo.write("b.yaml", "x: 3")?;
    repo.write("b.yaml", "x: 4")?;

    let outcome = repo.service.commit_all().await?;
    assert!(outcome.committed);
    assert_eq!(outcome.message, "b.yaml");

    let after = repo.commit_count().await?;
    assert_eq!(after, before + 1, "a coalesced burst must produce exactly one commit");

    let head = repo.service.history(Some(1)).await?;
    let content = repo.service.content_at(&head[0].hash, "b.yaml").await?;
    assert_eq!(String::from_utf8(content)?, "x: 4");
    Ok(())
}

#[tokio::test]
async fn multi_file_batch_is_reachable_from_head() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("a.yaml", "a1")?;
    repo.write("b.yaml", "b1")?;
    repo.write("c.yaml", "c1")?;
    repo.service.commit_all().await?;

    repo.write("a.yaml", "a2")?;
    repo.write("b.yaml", "b2")?;
    repo.write("c.yaml", "c2")?;

    let outcome = repo.service.commit_all().await?;
    assert!(outcome.committed);
    assert_eq!(outcome.message, "3 files");

    let head = repo.service.history(Some(1)).await?;
    for (path, expected) in [("a.yaml", "a2"), ("b.yaml", "b2"), ("c.yaml", "c2")] {
        let content = repo.service.content_at(&head[0].hash, path).await?;
        assert_eq!(String::from_utf8(content)?, expected);
    }
    Ok(())
}

/// P1: a no-op commit_all (clean working tree) leaves the branch tip
/// untouched and reports `committed: false`.
#[tokio::test]
async fn no_changes_produces_no_commit() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("a.yaml", "x: 1")?;
    repo.service.commit_all().await?;
    let before = repo.service.history(Some(1)).await?;

    let outcome = repo.service.commit_all().await?;
    assert!(!outcome.committed);
    assert!(outcome.hash.is_none());

    let after = repo.service.history(Some(1)).await?;
    assert_eq!(before[0].hash, after[0].hash, "branch tip must be unchanged");
    Ok(())
}

/// P2: the two-path and N-file message forms (§6 grammar).
#[tokio::test]
async fn message_grammar_covers_two_and_n_path_forms() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("a.yaml", "1")?;
    repo.write("b.yaml", "1")?;
    repo.service.commit_all().await?;

    repo.write("a.yaml", "2")?;
    repo.write("b.yaml", "2")?;
    let two_path = repo.service.commit_all().await?;
    assert_eq!(two_path.message, "a.yaml, b.yaml");

    repo.write("a.yaml", "3")?;
    repo.write("b.yaml", "3")?;
    repo.write("c.yaml", "1")?;
    repo.write("d.yaml", "1")?;
    let four_path = repo.service.commit_all().await?;
    assert_eq!(four_path.message, "4 files");
    Ok(())
}

/// Files outside the tracked extension set never reach a commit, even
/// when they sit alongside tracked files in the same working-tree change.
#[tokio::test]
async fn untracked_extensions_are_never_committed() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.write("a.yaml", "1")?;
    repo.service.commit_all().await?;

    repo.write("a.yaml", "2")?;
    repo.write("notes.md", "not tracked")?;
    let outcome = repo.service.commit_all().await?;
    assert!(outcome.committed);
    assert_eq!(outcome.paths, vec!["a.yaml".to_string()]);

    // notes.md matches the ignore-file's deny-all rule, so plain
    // `git status` (no `--ignored`) never surfaces it at all.
    let status = repo.service.status().await?;
    assert!(status.clean);
    assert!(repo.exists("notes.md"), "the file itself is left alone on disk");
    Ok(())
}
