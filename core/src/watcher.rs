//! Watcher/Debouncer (§4.D): converts raw filesystem events into batched
//! commit intents. Producer-consumer channel design per SPEC_FULL §B /
//! Design Note 9: a scan task enqueues `(path, eventKind)`, a debouncer
//! task owns the per-path timer map, expiring timers push onto the commit
//! queue a single worker drains while holding the Repo Driver mutex.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::commit_engine;
use crate::ignore_file;
use crate::log::emit;
use crate::repo_driver::RepoDriver;
use crate::scheduler::Scheduler;
use crate::settings::SettingsStore;
use crate::tracked_paths::is_tracked;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const SETTLE_DURATION: Duration = Duration::from_secs(2);
const MAX_DEPTH: usize = 15;
const MAX_ROOT_SEGMENT_REPEATS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AddOrChange,
}

#[derive(Debug, Clone)]
struct RawEvent {
    rel_path: String,
    kind: EventKind,
}

/// A per-path pending work item (§3 I, §GLOSSARY "commit intent").
#[derive(Debug)]
struct CommitIntent {
    #[allow(dead_code)]
    earliest_event_at: Instant,
    deadline: Instant,
}

/// Handle used by callers (restore engine, CLI) to force an immediate
/// commit-all pass outside of the debounce loop.
#[derive(Clone)]
pub struct CommitTrigger {
    tx: mpsc::UnboundedSender<Option<String>>,
}

impl CommitTrigger {
    pub fn fire(&self, path: Option<String>) {
        let _ = self.tx.send(path);
    }
}

pub struct Watcher {
    root: PathBuf,
    driver: Arc<RepoDriver>,
    settings: Arc<SettingsStore>,
    scheduler: Arc<Scheduler>,
    commit_tx: mpsc::UnboundedSender<Option<String>>,
    commit_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Option<String>>>>,
}

impl Watcher {
    pub fn new(
        root: PathBuf,
        driver: Arc<RepoDriver>,
        settings: Arc<SettingsStore>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        Self {
            root,
            driver,
            settings,
            scheduler,
            commit_tx,
            commit_rx: tokio::sync::Mutex::new(Some(commit_rx)),
        }
    }

    pub fn trigger(&self) -> CommitTrigger {
        CommitTrigger {
            tx: self.commit_tx.clone(),
        }
    }

    /// Spawns the poll task, debounce task, and commit-consumer task.
    /// Returns a handle whose drop cancels all three (§4.D "when the
    /// process exits, pending timers are dropped; in-flight commits run
    /// to completion").
    pub fn spawn(self: Arc<Self>) -> WatcherHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let poll_handle = {
            let this = self.clone();
            tokio::spawn(async move { this.poll_loop(event_tx).await })
        };

        let debounce_handle = {
            let this = self.clone();
            tokio::spawn(async move { this.debounce_loop(event_rx).await })
        };

        let commit_rx = self
            .commit_rx
            .try_lock()
            .expect("commit_rx taken exactly once")
            .take()
            .expect("commit_rx present on first spawn");

        let consumer_handle = {
            let this = self.clone();
            tokio::spawn(async move { this.commit_consumer(commit_rx).await })
        };

        WatcherHandle {
            _poll: poll_handle,
            _debounce: debounce_handle,
            _consumer: consumer_handle,
        }
    }

    /// 2s-interval polling sweep (§4.D detail floor): tracks per-path
    /// mtimes and emits an event whenever one changes or a new tracked
    /// path appears, skipping nested-repo paths and anything outside P.
    async fn poll_loop(&self, event_tx: mpsc::UnboundedSender<RawEvent>) {
        let mut known_mtimes: HashMap<String, SystemTime> = HashMap::new();
        // Last mtime already emitted as a settled event for each path, so
        // a file that simply sits unchanged on disk doesn't generate a
        // fresh event on every ~2s sweep — only a genuine transition does
        // (§4.D "stable once 2s elapse since its last modification" means
        // settled *once*, not settled *repeatedly*).
        let mut emitted_mtimes: HashMap<String, SystemTime> = HashMap::new();

        loop {
            let extensions = self.settings.snapshot().tracked_extensions;
            let nested = ignore_file::discover_nested_repos(&self.root);

            for (rel_path, mtime) in scan_tracked_files(&self.root, &extensions, &nested) {
                // Record new/changed mtimes; a changed mtime resets the
                // settle clock for that path (§4.D "stable once 2s elapse
                // since its last modification").
                known_mtimes.insert(rel_path, mtime);
            }

            tokio::time::sleep(POLL_INTERVAL).await;

            // second pass: anything whose mtime is unchanged since the
            // last sweep and at least SETTLE_DURATION old is "settled".
            // Only emit it if this exact settled mtime hasn't already
            // been reported, so a stable file doesn't re-fire every sweep.
            let mut seen: HashSet<String> = HashSet::new();
            for (rel_path, mtime) in scan_tracked_files(&self.root, &extensions, &nested) {
                seen.insert(rel_path.clone());
                if should_emit_settled(
                    known_mtimes.get(&rel_path).copied(),
                    mtime,
                    emitted_mtimes.get(&rel_path).copied(),
                ) {
                    emitted_mtimes.insert(rel_path.clone(), mtime);
                    let _ = event_tx.send(RawEvent {
                        rel_path,
                        kind: EventKind::AddOrChange,
                    });
                }
            }

            // Drop bookkeeping for paths that vanished (deleted, or fell
            // out of the tracked set) so they can be re-emitted if they
            // reappear later.
            known_mtimes.retain(|path, _| seen.contains(path));
            emitted_mtimes.retain(|path, _| seen.contains(path));
        }
    }

    /// Owns the path->timer map; per-path debounce, not global (§4.D).
    async fn debounce_loop(&self, mut event_rx: mpsc::UnboundedReceiver<RawEvent>) {
        let mut intents: HashMap<String, CommitIntent> = HashMap::new();
        let mut sleep = Box::pin(tokio::time::sleep(Duration::from_secs(3600)));

        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.handle_raw_event(&mut intents, event);
                    if let Some(next) = next_deadline(&intents) {
                        sleep.as_mut().reset(next);
                    }
                }
                () = &mut sleep => {
                    let fired = drain_expired(&mut intents);
                    for path in fired {
                        self.commit_tx.send(Some(path)).ok();
                    }
                    if let Some(next) = next_deadline(&intents) {
                        sleep.as_mut().reset(next);
                    } else {
                        sleep.as_mut().reset(Instant::now() + Duration::from_secs(3600));
                    }
                }
            }
        }
    }

    fn handle_raw_event(&self, intents: &mut HashMap<String, CommitIntent>, event: RawEvent) {
        if !within_tracked_policy(&event.rel_path, &self.root, &self.settings) {
            return;
        }

        let debounce = self.settings.snapshot().debounce_duration();
        let now = Instant::now();
        let entry = intents
            .entry(event.rel_path)
            .or_insert_with(|| CommitIntent {
                earliest_event_at: now,
                deadline: now + debounce,
            });
        entry.deadline = now + debounce;
    }

    /// Single worker: acquires the driver mutex implicitly through each
    /// call, resets leftover staging, stages the path, delegates to the
    /// Commit Engine (§4.D "on timer fire").
    async fn commit_consumer(&self, mut commit_rx: mpsc::UnboundedReceiver<Option<String>>) {
        while let Some(path) = commit_rx.recv().await {
            if let Err(err) = self.commit_one(path.as_deref()).await {
                emit("WARN", format_args!("commit attempt failed: {err}"));
            }
        }
    }

    async fn commit_one(&self, path: Option<&str>) -> crate::error::CoreResult<commit_engine::CommitOutcome> {
        self.driver.reset_head(None).await?;
        if let Some(p) = path {
            self.driver.add(&[p]).await?;
        } else {
            self.driver.add(&["."]).await?;
        }
        let outcome = commit_engine::run(&self.driver, &self.settings, path).await?;
        if outcome.committed {
            self.scheduler.after_commit().await;
        }
        Ok(outcome)
    }
}

pub struct WatcherHandle {
    _poll: tokio::task::JoinHandle<()>,
    _debounce: tokio::task::JoinHandle<()>,
    _consumer: tokio::task::JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self._poll.abort();
        self._debounce.abort();
        self._consumer.abort();
    }
}

/// A settled-mtime event fires only on a transition: the path's mtime must
/// be unchanged since the prior sweep, at least `SETTLE_DURATION` old, and
/// not the same value already reported for that path.
fn should_emit_settled(
    previous_mtime: Option<SystemTime>,
    current_mtime: SystemTime,
    last_emitted_mtime: Option<SystemTime>,
) -> bool {
    if previous_mtime != Some(current_mtime) {
        return false;
    }
    let Ok(elapsed) = current_mtime.elapsed() else {
        return false;
    };
    if elapsed < SETTLE_DURATION {
        return false;
    }
    last_emitted_mtime != Some(current_mtime)
}

fn next_deadline(intents: &HashMap<String, CommitIntent>) -> Option<Instant> {
    intents.values().map(|i| i.deadline).min()
}

fn drain_expired(intents: &mut HashMap<String, CommitIntent>) -> Vec<String> {
    let now = Instant::now();
    let expired: Vec<String> = intents
        .iter()
        .filter(|(_, intent)| intent.deadline <= now)
        .map(|(path, _)| path.clone())
        .collect();
    for path in &expired {
        intents.remove(path);
    }
    expired
}

fn within_tracked_policy(rel_path: &str, root: &Path, settings: &SettingsStore) -> bool {
    let extensions = settings.snapshot().tracked_extensions;
    if !is_tracked(rel_path, &extensions) {
        return false;
    }
    let nested = ignore_file::discover_nested_repos(root);
    if path_under_nested(rel_path, &nested) {
        return false;
    }
    if exceeds_root_segment_repeats(rel_path, root) {
        return false;
    }
    true
}

fn path_under_nested(rel_path: &str, nested: &[PathBuf]) -> bool {
    let path = Path::new(rel_path);
    nested.iter().any(|n| path.starts_with(n))
}

/// Self-referential loop guard (§4.D): reject paths whose components
/// contain the root's own final segment more than thrice.
fn exceeds_root_segment_repeats(rel_path: &str, root: &Path) -> bool {
    let Some(root_segment) = root.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let repeats = Path::new(rel_path)
        .components()
        .filter(|c| c.as_os_str() == root_segment)
        .count();
    repeats > MAX_ROOT_SEGMENT_REPEATS
}

fn scan_tracked_files(
    root: &Path,
    extensions: &[String],
    nested: &[PathBuf],
) -> Vec<(String, SystemTime)> {
    let mut out = Vec::new();
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");

            if file_type.is_dir() {
                if rel_str == ".git" || path_under_nested(&rel_str, nested) {
                    continue;
                }
                stack.push((path, depth + 1));
                continue;
            }

            if !is_tracked(&rel_str, extensions) || path_under_nested(&rel_str, nested) {
                continue;
            }

            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    out.push((rel_str, modified));
                }
            }
        }
    }

    out
}
