use std::fmt;
use std::path::PathBuf;

/// One variant per error kind in the design's error table. Dispositions
/// (retryable, silent, fatal, 409-class, ...) live with the callers that
/// decide what to do with a given kind, not on the enum itself.
#[derive(Debug)]
pub enum CoreError {
    NotInitialised,
    NothingToCommit,
    OutputOverflow { op: &'static str, limit: usize },
    DirtyWorkingTree,
    CleanupInProgress,
    RebaseConflict { backup_branch: String },
    WriteDenied(PathBuf),
    RemoteUnauthorised(String),
    RemoteUnreachable(String),
    TimeoutExceeded { op: &'static str, seconds: u64 },
    Git { op: &'static str, status: Option<i32>, stderr: String },
    Spawn { op: &'static str, source: std::io::Error },
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidSettings(String),
    AbsentAtCommit { commit: String, path: PathBuf },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::NotInitialised => {
                write!(f, "repository is not initialised yet")
            }
            CoreError::NothingToCommit => write!(f, "nothing to commit"),
            CoreError::OutputOverflow { op, limit } => write!(
                f,
                "`{op}` produced more than {limit} bytes of output and was aborted"
            ),
            CoreError::DirtyWorkingTree => {
                write!(f, "working tree has untracked changes that could not be captured")
            }
            CoreError::CleanupInProgress => {
                write!(f, "a retention cleanup is already running")
            }
            CoreError::RebaseConflict { backup_branch } => write!(
                f,
                "retention rebase conflicted and was aborted; safety branch `{backup_branch}` was left in place"
            ),
            CoreError::WriteDenied(path) => {
                write!(f, "config root {} is not writable", path.display())
            }
            CoreError::RemoteUnauthorised(msg) => write!(f, "remote rejected credentials: {msg}"),
            CoreError::RemoteUnreachable(msg) => write!(f, "remote unreachable: {msg}"),
            CoreError::TimeoutExceeded { op, seconds } => {
                write!(f, "`{op}` did not complete within {seconds}s")
            }
            CoreError::Git { op, status, stderr } => write!(
                f,
                "git {op} failed (status {:?}): {}",
                status,
                stderr.trim()
            ),
            CoreError::Spawn { op, source } => write!(f, "failed to spawn git {op}: {source}"),
            CoreError::Io(err) => write!(f, "I/O error: {err}"),
            CoreError::Json(err) => write!(f, "malformed settings JSON: {err}"),
            CoreError::InvalidSettings(msg) => write!(f, "invalid settings: {msg}"),
            CoreError::AbsentAtCommit { commit, path } => {
                write!(f, "{} does not exist at {}", path.display(), commit)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        CoreError::Io(value)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        CoreError::Json(value)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
