use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::tracked_paths::DEFAULT_EXTENSIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorCadence {
    Manual,
    EveryCommit,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorLastPush {
    pub at: Option<chrono::DateTime<chrono::Utc>>,
    pub success: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSettings {
    pub url: Option<String>,
    pub token: Option<String>,
    pub cadence: MirrorCadence,
    pub include_secrets: bool,
    #[serde(default)]
    pub last_push: MirrorLastPush,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            cadence: MirrorCadence::Manual,
            include_secrets: false,
            last_push: MirrorLastPush::default(),
        }
    }
}

/// Runtime configuration (§3 Σ). Unknown JSON fields round-trip through
/// `extra` so a settings file written by a newer build is never
/// truncated by an older one (§4.I "unknown fields are preserved").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub debounce_seconds: u64,
    pub retention_enabled: bool,
    pub retention_value: u64,
    pub retention_unit: RetentionUnit,
    pub tracked_extensions: Vec<String>,
    pub mirror: MirrorSettings,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_seconds: 5,
            retention_enabled: false,
            retention_value: 3,
            retention_unit: RetentionUnit::Months,
            tracked_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            mirror: MirrorSettings::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// §4.I validation rules.
    pub fn validate(&self) -> CoreResult<()> {
        if self.retention_value < 1 {
            return Err(CoreError::InvalidSettings(
                "retention value must be >= 1".to_string(),
            ));
        }

        for ext in &self.tracked_extensions {
            if !crate::tracked_paths::is_known_extension(ext) {
                return Err(CoreError::InvalidSettings(format!(
                    "unknown tracked extension: {ext}"
                )));
            }
        }

        Ok(())
    }

    pub fn retention_duration(&self) -> chrono::Duration {
        let n = self.retention_value as i64;
        match self.retention_unit {
            RetentionUnit::Hours => chrono::Duration::hours(n),
            RetentionUnit::Days => chrono::Duration::days(n),
            RetentionUnit::Weeks => chrono::Duration::weeks(n),
            RetentionUnit::Months => chrono::Duration::days(n * 30),
        }
    }

    pub fn debounce_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.debounce_seconds)
    }
}

/// Process-wide guarded store backed by atomic temp-file-rename writes
/// (§3 "Updated atomically via temp-file-rename", SPEC_FULL §B).
pub struct SettingsStore {
    path: PathBuf,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Loads from `path` if present, otherwise starts from defaults
    /// without touching disk until the first explicit save.
    pub fn load(path: PathBuf) -> CoreResult<Self> {
        let settings = match std::fs::read(&path) {
            Ok(bytes) => {
                let settings: Settings = serde_json::from_slice(&bytes)?;
                settings.validate()?;
                settings
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(err) => return Err(CoreError::Io(err)),
        };

        Ok(Self {
            path,
            inner: Mutex::new(settings),
        })
    }

    /// Readers take a snapshot copy (§3 "readers take a snapshot copy").
    pub fn snapshot(&self) -> Settings {
        self.inner.lock().clone()
    }

    /// Applies `mutate` to the guarded settings, validates, persists via
    /// temp-file-rename, and only then commits the in-memory change.
    pub fn update<F>(&self, mutate: F) -> CoreResult<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.inner.lock();
        let mut candidate = guard.clone();
        mutate(&mut candidate);
        candidate.validate()?;
        persist(&self.path, &candidate)?;
        *guard = candidate.clone();
        Ok(candidate)
    }

    pub fn record_mirror_result(&self, success: bool, error: Option<String>) -> CoreResult<()> {
        self.update(|s| {
            s.mirror.last_push = MirrorLastPush {
                at: Some(chrono::Utc::now()),
                success: Some(success),
                error,
            };
        })?;
        Ok(())
    }
}

fn persist(path: &Path, settings: &Settings) -> CoreResult<()> {
    let parent = path.parent().ok_or_else(|| {
        CoreError::InvalidSettings(format!("settings path {} has no parent", path.display()))
    })?;
    std::fs::create_dir_all(parent)?;

    let body = serde_json::to_vec_pretty(settings)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(&body)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| CoreError::Io(err.error))?;
    Ok(())
}
