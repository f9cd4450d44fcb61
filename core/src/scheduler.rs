//! Scheduler (§4.H): a single periodic tick evaluates mirror cadence and
//! (optionally) drives retention runs.

use std::sync::Arc;

use crate::log::emit;
use crate::retention::RetentionEngine;
use crate::settings::{MirrorCadence, SettingsStore};

const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Mirror push is the external collaborator's job (§1 scope); the
/// scheduler only knows *when* to call it.
#[async_trait::async_trait]
pub trait MirrorPush: Send + Sync {
    async fn push(&self, url: &str, token: &str) -> Result<(), String>;
}

pub struct Scheduler {
    settings: Arc<SettingsStore>,
    retention: Arc<RetentionEngine>,
    mirror: Arc<dyn MirrorPush>,
}

impl Scheduler {
    pub fn new(
        settings: Arc<SettingsStore>,
        retention: Arc<RetentionEngine>,
        mirror: Arc<dyn MirrorPush>,
    ) -> Self {
        Self {
            settings,
            retention,
            mirror,
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    pub async fn tick(&self) {
        let settings = self.settings.snapshot();

        if settings.retention_enabled {
            match self.retention.run().await {
                Ok(report) if report.merged_count > 0 => {
                    emit(
                        "INFO",
                        format_args!("scheduled retention merged {} commits", report.merged_count),
                    );
                }
                Ok(_) => {}
                Err(err) => emit("WARN", format_args!("scheduled retention failed: {err}")),
            }
        }

        self.maybe_mirror(&settings).await;
    }

    async fn maybe_mirror(&self, settings: &crate::settings::Settings) {
        let due = match settings.mirror.cadence {
            MirrorCadence::Manual | MirrorCadence::EveryCommit => false,
            MirrorCadence::Hourly => is_due(settings, chrono::Duration::hours(1)),
            MirrorCadence::Daily => is_due(settings, chrono::Duration::days(1)),
        };

        if !due {
            return;
        }

        self.run_mirror_push().await;
    }

    /// Commit Engine post-commit hooks (§4.E step 8): run for every
    /// successful commit, whether it came from a debounced watcher event
    /// or a manual commit-all call. Failures are logged and non-fatal.
    pub async fn after_commit(&self) {
        let settings = self.settings.snapshot();
        if settings.retention_enabled {
            if let Err(err) = self.retention.run().await {
                emit("WARN", format_args!("post-commit retention failed: {err}"));
            }
        }
        if matches!(settings.mirror.cadence, MirrorCadence::EveryCommit) {
            self.run_mirror_push().await;
        }
    }

    pub async fn run_mirror_push(&self) {
        let settings = self.settings.snapshot();
        let (Some(url), Some(token)) = (settings.mirror.url.clone(), settings.mirror.token.clone())
        else {
            return;
        };

        match self.mirror.push(&url, &token).await {
            Ok(()) => {
                let _ = self.settings.record_mirror_result(true, None);
            }
            Err(err) => {
                emit("WARN", format_args!("mirror push failed: {err}"));
                let _ = self.settings.record_mirror_result(false, Some(err));
            }
        }
    }
}

fn is_due(settings: &crate::settings::Settings, cadence: chrono::Duration) -> bool {
    match settings.mirror.last_push.at {
        Some(last) => chrono::Utc::now() - last >= cadence,
        None => true,
    }
}
