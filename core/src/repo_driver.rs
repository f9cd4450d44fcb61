//! Typed façade over the backing `git` binary (§4.A).
//!
//! Every operation spawns `git` as a subprocess with an explicit argument
//! vector — never a shell string, matching how `codex.rs` drives its own
//! subprocess. A single [`tokio::sync::RwLock`] gives the "one writer, many
//! readers, a pending writer blocks new readers" discipline §5 asks for
//! directly from the primitive's own semantics.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const GC_TIMEOUT: Duration = Duration::from_secs(180);
const OUTPUT_LIMIT: usize = 64 * 1024 * 1024;

/// Inter-field / inter-record separators for `Log` parsing (SPEC_FULL §D):
/// ASCII unit/record separators, vanishingly unlikely in commit text.
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

#[derive(Debug, Clone)]
pub struct Commit {
    pub hash: String,
    pub short_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_time: DateTime<Utc>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Unmodified,
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    Untracked,
    Ignored,
    Other(char),
}

impl IndexStatus {
    fn from_char(c: char) -> Self {
        match c {
            ' ' => IndexStatus::Unmodified,
            'M' => IndexStatus::Modified,
            'A' => IndexStatus::Added,
            'D' => IndexStatus::Deleted,
            'R' => IndexStatus::Renamed,
            'C' => IndexStatus::Copied,
            '?' => IndexStatus::Untracked,
            '!' => IndexStatus::Ignored,
            other => IndexStatus::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: String,
    pub index_status: IndexStatus,
    pub work_status: IndexStatus,
}

#[derive(Debug, Clone)]
pub struct RepoStatus {
    pub clean: bool,
    pub files: Vec<StatusEntry>,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Other,
}

#[derive(Debug, Clone)]
pub struct ChangedPath {
    pub path: String,
    pub kind: ChangeKind,
}

pub struct LogFilter<'a> {
    pub path: Option<&'a str>,
    pub max_count: Option<usize>,
}

/// The single serialisation point for repository mutation (§4.A, §5).
pub struct RepoDriver {
    root: PathBuf,
    lock: RwLock<()>,
}

impl RepoDriver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            lock: RwLock::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(
        &self,
        op: &'static str,
        args: &[&OsStr],
        timeout: Duration,
    ) -> CoreResult<Vec<u8>> {
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|source| CoreError::Spawn { op, source })?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let read_stdout = async {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let n = stdout
                    .read(&mut chunk)
                    .await
                    .map_err(CoreError::Io)?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > OUTPUT_LIMIT {
                    return Err(CoreError::OutputOverflow {
                        op,
                        limit: OUTPUT_LIMIT,
                    });
                }
            }
            Ok(buf)
        };

        let read_stderr = async {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        };

        let result = tokio::time::timeout(timeout, async {
            let (stdout_res, stderr_buf) = tokio::join!(read_stdout, read_stderr);
            let status = child.wait().await.map_err(CoreError::Io)?;
            Ok::<_, CoreError>((stdout_res?, stderr_buf, status))
        })
        .await;

        let (stdout_buf, stderr_buf, status) = match result {
            Ok(inner) => inner?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(CoreError::TimeoutExceeded {
                    op,
                    seconds: timeout.as_secs(),
                });
            }
        };

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&stderr_buf).into_owned();
            if op == "commit" && stderr_text.contains("nothing to commit") {
                return Err(CoreError::NothingToCommit);
            }
            return Err(CoreError::Git {
                op,
                status: status.code(),
                stderr: stderr_text,
            });
        }

        Ok(stdout_buf)
    }

    fn args_os<'a>(args: &'a [&'a str]) -> Vec<&'a OsStr> {
        args.iter().map(|a| OsStr::new(*a)).collect()
    }

    // ---- read-only operations ----

    pub async fn log(&self, filter: Option<LogFilter<'_>>) -> CoreResult<Vec<Commit>> {
        let _guard = self.lock.read().await;
        let format = format!("%H{FIELD_SEP}%h{FIELD_SEP}%an{FIELD_SEP}%ae{FIELD_SEP}%ct{FIELD_SEP}%s{FIELD_SEP}%b{RECORD_SEP}");
        let mut args: Vec<String> = vec![
            "log".to_string(),
            format!("--pretty=format:{format}"),
            "-z".to_string(),
        ];
        if let Some(f) = &filter {
            if let Some(n) = f.max_count {
                args.push(format!("-n{n}"));
            }
        }
        if let Some(f) = &filter {
            if let Some(path) = f.path {
                args.push("--".to_string());
                args.push(path.to_string());
            }
        }
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let bytes = self
            .run("log", &Self::args_os(&arg_refs), DEFAULT_TIMEOUT)
            .await;
        let bytes = match bytes {
            Ok(b) => b,
            Err(CoreError::Git { status: Some(128), .. }) => return Ok(Vec::new()),
            Err(other) => return Err(other),
        };
        let text = String::from_utf8_lossy(&bytes);
        Ok(parse_log(&text))
    }

    pub async fn status(&self) -> CoreResult<RepoStatus> {
        let _guard = self.lock.read().await;
        let branch = self.current_branch_locked().await?;
        let bytes = self
            .run(
                "status",
                &Self::args_os(&["status", "--porcelain=v1", "-z"]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        let files = parse_status(&bytes);
        Ok(RepoStatus {
            clean: files.is_empty(),
            files,
            branch,
        })
    }

    async fn current_branch_locked(&self) -> CoreResult<String> {
        let bytes = self
            .run(
                "rev-parse",
                &Self::args_os(&["rev-parse", "--abbrev-ref", "HEAD"]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    pub async fn file_at_commit(&self, commit: &str, path: &str) -> CoreResult<Vec<u8>> {
        let _guard = self.lock.read().await;
        let spec = format!("{commit}:{path}");
        match self
            .run("show", &Self::args_os(&["show", &spec]), DEFAULT_TIMEOUT)
            .await
        {
            Ok(bytes) => Ok(bytes),
            Err(CoreError::Git { stderr, .. }) if stderr.contains("does not exist") => {
                Err(CoreError::AbsentAtCommit {
                    commit: commit.to_string(),
                    path: PathBuf::from(path),
                })
            }
            Err(other) => Err(other),
        }
    }

    pub async fn commit_details(&self, commit: &str) -> CoreResult<Vec<ChangedPath>> {
        let _guard = self.lock.read().await;
        let bytes = self
            .run(
                "diff-tree",
                &Self::args_os(&["diff-tree", "--no-commit-id", "--name-status", "-r", "-z", commit]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(parse_name_status(&bytes))
    }

    pub async fn diff(
        &self,
        range_a: &str,
        range_b: &str,
        paths: Option<&[&str]>,
    ) -> CoreResult<String> {
        let _guard = self.lock.read().await;
        let range = format!("{range_a}..{range_b}");
        let mut args: Vec<&str> = vec!["diff", &range];
        if let Some(p) = paths {
            args.push("--");
            args.extend(p.iter().copied());
        }
        let bytes = self.run("diff", &Self::args_os(&args), DEFAULT_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn ls_tree(&self, commit: &str) -> CoreResult<Vec<String>> {
        let _guard = self.lock.read().await;
        let bytes = self
            .run(
                "ls-tree",
                &Self::args_os(&["ls-tree", "-r", "--name-only", "-z", commit]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&bytes)
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect())
    }

    pub async fn hash_object(&self, path: &Path) -> CoreResult<String> {
        let _guard = self.lock.read().await;
        let path_str = path.to_string_lossy();
        let bytes = self
            .run(
                "hash-object",
                &Self::args_os(&["hash-object", &path_str]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    // ---- mutating operations ----

    pub async fn add(&self, paths: &[&str]) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        let targets: Vec<&str> = if paths.is_empty() { vec!["."] } else { paths.to_vec() };
        let mut args = vec!["add"];
        args.extend(targets);
        self.run("add", &Self::args_os(&args), DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    pub async fn commit(&self, message: &str) -> CoreResult<String> {
        let _guard = self.lock.write().await;
        self.run(
            "commit",
            &Self::args_os(&["commit", "-m", message]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        let hash = self
            .run(
                "rev-parse",
                &Self::args_os(&["rev-parse", "HEAD"]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&hash).trim().to_string())
    }

    pub async fn checkout(&self, commit: &str, path: &str) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run(
            "checkout",
            &Self::args_os(&["checkout", commit, "--", path]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn reset_head(&self, path: Option<&str>) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        let mut args = vec!["reset"];
        if let Some(p) = path {
            args.push("--");
            args.push(p);
        }
        self.run("reset", &Self::args_os(&args), DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    pub async fn rm_cached(&self, path: &str) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        match self
            .run(
                "rm",
                &Self::args_os(&["rm", "--cached", "-r", "--ignore-unmatch", path]),
                DEFAULT_TIMEOUT,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(CoreError::Git { status, .. }) if status == Some(128) => Ok(()),
            Err(other) => Err(other),
        }
    }

    pub async fn commit_tree(
        &self,
        tree_hash: &str,
        message: &str,
        author_date: DateTime<Utc>,
        committer_date: DateTime<Utc>,
        parents: &[&str],
    ) -> CoreResult<String> {
        let _guard = self.lock.write().await;
        let mut args: Vec<String> = vec!["commit-tree".to_string(), tree_hash.to_string()];
        for parent in parents {
            args.push("-p".to_string());
            args.push(parent.to_string());
        }
        args.push("-m".to_string());
        args.push(message.to_string());

        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.root)
            .args(&args)
            .env("GIT_AUTHOR_DATE", author_date.to_rfc3339())
            .env("GIT_COMMITTER_DATE", committer_date.to_rfc3339())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(DEFAULT_TIMEOUT, command.output())
            .await
            .map_err(|_| CoreError::TimeoutExceeded {
                op: "commit-tree",
                seconds: DEFAULT_TIMEOUT.as_secs(),
            })?
            .map_err(|source| CoreError::Spawn { op: "commit-tree", source })?;

        if !output.status.success() {
            return Err(CoreError::Git {
                op: "commit-tree",
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn rebase_onto(&self, new_base: &str, upstream: &str, branch: &str) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        let result = self
            .run(
                "rebase",
                &Self::args_os(&["rebase", "--onto", new_base, upstream, branch]),
                DEFAULT_TIMEOUT,
            )
            .await;

        if let Err(err) = result {
            let _ = self
                .run(
                    "rebase-abort",
                    &Self::args_os(&["rebase", "--abort"]),
                    DEFAULT_TIMEOUT,
                )
                .await;
            return Err(err);
        }

        Ok(())
    }

    pub async fn reset_hard(&self, commit: &str) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run(
            "reset-hard",
            &Self::args_os(&["reset", "--hard", commit]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn create_branch(&self, name: &str, at: &str) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run(
            "branch",
            &Self::args_os(&["branch", name, at]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn reflog_expire_now(&self) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run(
            "reflog-expire",
            &Self::args_os(&["reflog", "expire", "--expire=now", "--all"]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn gc(&self) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run(
            "gc",
            &Self::args_os(&["gc", "--prune=now"]),
            GC_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn tree_hash_of(&self, commit: &str) -> CoreResult<String> {
        let _guard = self.lock.read().await;
        let bytes = self
            .run(
                "rev-parse-tree",
                &Self::args_os(&["rev-parse", &format!("{commit}^{{tree}}")]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    pub async fn first_parent(&self, commit: &str) -> CoreResult<Option<String>> {
        let _guard = self.lock.read().await;
        match self
            .run(
                "rev-parse-parent",
                &Self::args_os(&["rev-parse", &format!("{commit}^")]),
                DEFAULT_TIMEOUT,
            )
            .await
        {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).trim().to_string())),
            Err(CoreError::Git { status: Some(128), .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    pub async fn rev_parse(&self, rev: &str) -> CoreResult<String> {
        let _guard = self.lock.read().await;
        let bytes = self
            .run("rev-parse", &Self::args_os(&["rev-parse", rev]), DEFAULT_TIMEOUT)
            .await?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    pub async fn init(&self) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run("init", &Self::args_os(&["init"]), DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    pub async fn is_repository(&self) -> bool {
        let _guard = self.lock.read().await;
        self.run(
            "rev-parse-git-dir",
            &Self::args_os(&["rev-parse", "--git-dir"]),
            DEFAULT_TIMEOUT,
        )
        .await
        .is_ok()
    }

    pub async fn set_identity(&self, name: &str, email: &str) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        self.run(
            "config-name",
            &Self::args_os(&["config", "user.name", name]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        self.run(
            "config-email",
            &Self::args_os(&["config", "user.email", email]),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn add_safe_directory(&self, path: &Path) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        let path_str = path.to_string_lossy().into_owned();
        let mut command = Command::new("git");
        command
            .args(["config", "--global", "--add", "safe.directory", &path_str])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = command
            .output()
            .await
            .map_err(|source| CoreError::Spawn { op: "safe-directory", source })?;
        if !output.status.success() {
            return Err(CoreError::Git {
                op: "safe-directory",
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    pub async fn push(&self, remote_url: &str, branch: &str, force: bool) -> CoreResult<()> {
        let _guard = self.lock.write().await;
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(remote_url);
        let refspec = format!("{branch}:{branch}");
        args.push(&refspec);
        self.run("push", &Self::args_os(&args), DEFAULT_TIMEOUT).await?;
        Ok(())
    }
}

fn parse_log(text: &str) -> Vec<Commit> {
    text.split(RECORD_SEP)
        .filter(|record| !record.trim_matches('\0').trim().is_empty())
        .filter_map(|record| {
            let record = record.trim_start_matches('\0');
            let mut fields = record.splitn(7, FIELD_SEP);
            let hash = fields.next()?.to_string();
            let short_hash = fields.next()?.to_string();
            let author_name = fields.next()?.to_string();
            let author_email = fields.next()?.to_string();
            let committer_epoch: i64 = fields.next()?.trim().parse().ok()?;
            let subject = fields.next()?.to_string();
            let body = fields.next().unwrap_or("").trim_end_matches('\n').to_string();
            let committer_time = Utc.timestamp_opt(committer_epoch, 0).single()?;
            Some(Commit {
                hash,
                short_hash,
                author_name,
                author_email,
                committer_time,
                subject,
                body,
            })
        })
        .collect()
}

fn parse_status(bytes: &[u8]) -> Vec<StatusEntry> {
    let text = String::from_utf8_lossy(bytes);
    text.split('\0')
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let mut chars = entry.chars();
            let index = chars.next()?;
            let work = chars.next()?;
            let path = entry.get(3..)?.to_string();
            Some(StatusEntry {
                path,
                index_status: IndexStatus::from_char(index),
                work_status: IndexStatus::from_char(work),
            })
        })
        .collect()
}

fn parse_name_status(bytes: &[u8]) -> Vec<ChangedPath> {
    let text = String::from_utf8_lossy(bytes);
    let tokens: Vec<&str> = text.split('\0').filter(|s| !s.is_empty()).collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let status = tokens[i];
        let kind = match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('M') => ChangeKind::Modified,
            Some('D') => ChangeKind::Deleted,
            _ => ChangeKind::Other,
        };
        if status.starts_with('R') || status.starts_with('C') {
            // rename/copy: old path, new path
            if i + 2 < tokens.len() {
                out.push(ChangedPath {
                    path: tokens[i + 2].to_string(),
                    kind: ChangeKind::Modified,
                });
            }
            i += 3;
        } else {
            if i + 1 < tokens.len() {
                out.push(ChangedPath {
                    path: tokens[i + 1].to_string(),
                    kind,
                });
            }
            i += 2;
        }
    }
    out
}
