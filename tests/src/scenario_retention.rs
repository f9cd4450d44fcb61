//! §8 scenario 4 (retention split) plus invariants P4 (contiguity) and
//! P5 (preservation of the latest state of every path).

use crate::fixtures::TestRepo;
use confsnap_core::settings::RetentionUnit;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const DAY: i64 = 86_400;

#[tokio::test]
async fn retention_collapses_aged_history_into_one_baseline() -> TestResult {
    let repo = TestRepo::new().await?;

    repo.commit_dated("a.yaml", "v-10d", 10 * DAY)?;
    let t_minus_8d_hash = repo.commit_dated("a.yaml", "v-8d", 8 * DAY)?;
    repo.commit_dated("a.yaml", "v-2d", 2 * DAY)?;
    repo.commit_dated("a.yaml", "v-1d", DAY)?;
    repo.commit_dated("a.yaml", "v-t", 5)?;

    repo.service.update_settings(|s| {
        s.retention_value = 3;
        s.retention_unit = RetentionUnit::Days;
    })?;

    let before_tip_bytes = repo.service.content_at("HEAD", "a.yaml").await?;
    assert_eq!(before_tip_bytes, b"v-t");

    let report = repo.service.retention_run().await?;
    assert_eq!(report.merged_count, 2, "T-10d and T-8d fall at/before the 3-day cutoff");
    assert_eq!(report.kept_count, 3, "T-2d, T-1d, T stay newer than the cutoff");
    let baseline_hash = report.baseline_hash.expect("baseline created when >=1 commit merges");

    // "total 4 commits" (§8 scenario 4): baseline + 3 rebased kept commits.
    let history = repo.service.history(None).await?;
    assert_eq!(history.len(), 4);

    // Baseline is oldest, rootless, message names the *oldest* merged
    // commit's timestamp, tree matches the *newest* merged commit (T-8d).
    let baseline = history.last().unwrap();
    assert_eq!(baseline.hash, baseline_hash);
    assert!(baseline.subject.starts_with("Merged history "));
    assert!(repo.service.driver.first_parent(&baseline.hash).await?.is_none());

    let baseline_tree_content = repo.service.content_at(&baseline.hash, "a.yaml").await?;
    let t_minus_8d_tree_content = repo.service.content_at(&t_minus_8d_hash, "a.yaml").await?;
    assert_eq!(baseline_tree_content, t_minus_8d_tree_content);
    assert_eq!(baseline_tree_content, b"v-8d");

    // P4: every commit above the baseline is strictly newer than cutoff,
    // and adjacent commits are in non-decreasing age order (contiguous).
    let cutoff = chrono::Utc::now() - chrono::Duration::days(3);
    for commit in &history[..history.len() - 1] {
        assert!(commit.committer_time > cutoff);
    }
    for window in history.windows(2) {
        assert!(window[0].committer_time >= window[1].committer_time);
    }

    // P5: the latest state of a.yaml is unchanged by retention.
    let after_tip_bytes = repo.service.content_at("HEAD", "a.yaml").await?;
    assert_eq!(after_tip_bytes, before_tip_bytes);
    assert_eq!(repo.read("a.yaml")?, "v-t");

    Ok(())
}

#[tokio::test]
async fn retention_within_window_is_a_no_op() -> TestResult {
    let repo = TestRepo::new().await?;
    repo.commit_dated("a.yaml", "v1", 60)?;
    repo.commit_dated("a.yaml", "v2", 5)?;

    repo.service.update_settings(|s| {
        s.retention_value = 3;
        s.retention_unit = RetentionUnit::Days;
    })?;

    let before = repo.service.history(None).await?;
    let report = repo.service.retention_run().await?;
    assert_eq!(report.merged_count, 0);
    assert!(report.baseline_hash.is_none());

    let after = repo.service.history(None).await?;
    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].hash, after[0].hash);
    Ok(())
}

#[tokio::test]
async fn concurrent_retention_calls_fail_with_cleanup_in_progress() -> TestResult {
    use confsnap_core::error::CoreError;

    let repo = TestRepo::new().await?;
    repo.commit_dated("a.yaml", "v1", 10 * DAY)?;
    repo.commit_dated("a.yaml", "v2", 5)?;
    repo.service.update_settings(|s| {
        s.retention_value = 3;
        s.retention_unit = RetentionUnit::Days;
    })?;

    let (first, second) = tokio::join!(
        repo.service.retention_run(),
        repo.service.retention_run(),
    );

    let results = [first, second];
    let failures = results.iter().filter(|r| matches!(r, Err(CoreError::CleanupInProgress))).count();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_eq!(failures, 1);
    Ok(())
}
