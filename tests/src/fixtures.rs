#![allow(dead_code)]

//! Shared scaffolding for black-box scenario tests. Builds a real `git`
//! repository in a temp directory and drives it through a real [`Service`]
//! instance — the same code path production callers use — rather than
//! shelling out to a compiled CLI binary (see `DESIGN.md` for why).

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use confsnap_core::restore::ReloadHook;
use confsnap_core::scheduler::MirrorPush;
use confsnap_core::service::Service;
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Records reload-hook invocations instead of calling out to a real
/// platform (§6 "Platform reload hook" is an out-of-scope collaborator).
#[derive(Default)]
pub struct RecordingReloadHook {
    automations: Mutex<u32>,
    scripts: Mutex<u32>,
    restarts: Mutex<u32>,
}

impl RecordingReloadHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn automations_count(&self) -> u32 {
        *self.automations.lock().unwrap()
    }

    pub fn scripts_count(&self) -> u32 {
        *self.scripts.lock().unwrap()
    }

    pub fn restart_count(&self) -> u32 {
        *self.restarts.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ReloadHook for RecordingReloadHook {
    async fn reload_automations(&self) {
        *self.automations.lock().unwrap() += 1;
    }

    async fn reload_scripts(&self) {
        *self.scripts.lock().unwrap() += 1;
    }

    async fn request_restart(&self) {
        *self.restarts.lock().unwrap() += 1;
    }
}

/// Stands in for the out-of-scope remote-mirror collaborator (§1).
pub struct NoopMirror;

#[async_trait::async_trait]
impl MirrorPush for NoopMirror {
    async fn push(&self, _url: &str, _token: &str) -> Result<(), String> {
        Ok(())
    }
}

pub struct TestRepo {
    dir: TempDir,
    pub service: Service,
    pub reload_hook: Arc<RecordingReloadHook>,
}

impl TestRepo {
    /// Fresh config root with the Repository Manager startup sequence
    /// already run (§4.C steps 1-9).
    pub async fn new() -> TestResult<Self> {
        let dir = tempfile::tempdir()?;
        let reload_hook = RecordingReloadHook::new();
        let service = Service::new(dir.path().to_path_buf(), reload_hook.clone(), Arc::new(NoopMirror));
        service.start().await?;
        Ok(Self { dir, service, reload_hook })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) -> TestResult {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn read(&self, rel: &str) -> TestResult<String> {
        Ok(std::fs::read_to_string(self.root().join(rel))?)
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root().join(rel).exists()
    }

    pub async fn commit_count(&self) -> TestResult<usize> {
        Ok(self.service.history(None).await?.len())
    }

    pub fn raw_git(&self, args: &[&str]) -> TestResult<std::process::Output> {
        Ok(Command::new("git").arg("-C").arg(self.root()).args(args).output()?)
    }

    /// Fabricates a commit dated `seconds_ago`, bypassing the Commit
    /// Engine the way the teacher's own fixtures build state the product
    /// code itself wouldn't (here: history old enough to exercise
    /// retention, §8 scenario 4).
    pub fn commit_dated(&self, rel: &str, content: &str, seconds_ago: i64) -> TestResult<String> {
        self.write(rel, content)?;
        let date = (chrono::Utc::now() - chrono::Duration::seconds(seconds_ago)).to_rfc3339();

        let add = self.raw_git(&["add", rel])?;
        if !add.status.success() {
            return Err(format!("git add failed: {}", String::from_utf8_lossy(&add.stderr)).into());
        }

        let output = Command::new("git")
            .arg("-C")
            .arg(self.root())
            .args(["commit", "-m", rel])
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .output()?;
        if !output.status.success() {
            return Err(format!("git commit failed: {}", String::from_utf8_lossy(&output.stderr)).into());
        }

        let hash = self.raw_git(&["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&hash.stdout).trim().to_string())
    }

    pub fn nested_repo_dir(&self, rel: &str) -> TestResult<PathBuf> {
        let path = self.root().join(rel);
        std::fs::create_dir_all(&path)?;
        let output = Command::new("git").arg("-C").arg(&path).args(["init"]).output()?;
        if !output.status.success() {
            return Err(format!("nested git init failed: {}", String::from_utf8_lossy(&output.stderr)).into());
        }
        Ok(path)
    }
}
