use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use confsnap_core::restore::NoopReloadHook;
use confsnap_core::scheduler::MirrorPush;
use confsnap_core::service::Service;

/// Versioned history for a home-automation config tree.
#[derive(Parser, Debug)]
#[command(name = "confsnap", version, about, arg_required_else_help = true)]
struct Cli {
    /// Config root to operate on; defaults to CONFSNAP_CONFIG_ROOT or /config.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the watcher + scheduler loop in the foreground.
    Daemon,
    /// Print repository status.
    Status,
    /// Print commit history, optionally scoped to a path.
    Log {
        path: Option<String>,
        #[arg(long)]
        max_count: Option<usize>,
    },
    /// Print a file's content at a given commit.
    Show { commit: String, path: String },
    /// Print the files changed by a commit.
    Changed { commit: String },
    /// Print a unified diff for a commit (against its parent).
    Diff { commit: String },
    /// Restore one file from a commit.
    RestoreFile { commit: String, path: String },
    /// Restore the path set changed by `source`, taking content from `target`.
    RestoreCommit { source: String, target: String },
    /// Hard-reset the working tree to a commit, stacking new commits forward.
    Reset {
        commit: String,
        #[arg(long)]
        backup: bool,
    },
    /// Trigger an immediate commit-all pass.
    CommitAll,
    /// Retention subcommands.
    #[command(subcommand)]
    Retain(RetainCommand),
    /// Settings subcommands.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum RetainCommand {
    /// Preview what a retention run would do, without mutating anything.
    Preview,
    /// Run retention now.
    Run,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print current settings as JSON.
    Show,
    /// Set the debounce interval, in seconds.
    SetDebounce { seconds: u64 },
    /// Enable or disable retention.
    SetRetentionEnabled { enabled: bool },
}

struct NoopMirror;

#[async_trait::async_trait]
impl MirrorPush for NoopMirror {
    async fn push(&self, _url: &str, _token: &str) -> Result<(), String> {
        Err("mirror push is not wired up in this CLI build".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let root = cli
        .root
        .unwrap_or_else(confsnap_core::paths::resolve_config_root);

    let service = Service::new(root, Arc::new(NoopReloadHook), Arc::new(NoopMirror));
    service.start().await?;

    match cli.command {
        Commands::Daemon => run_daemon(&service).await?,
        Commands::Status => print_status(&service).await?,
        Commands::Log { path, max_count } => print_log(&service, path, max_count).await?,
        Commands::Show { commit, path } => print_show(&service, &commit, &path).await?,
        Commands::Changed { commit } => print_changed(&service, &commit).await?,
        Commands::Diff { commit } => print_diff(&service, &commit).await?,
        Commands::RestoreFile { commit, path } => {
            let outcome = service.restore_file(&commit, &path).await?;
            println!("restored {path} from {commit} ({outcome:?})");
        }
        Commands::RestoreCommit { source, target } => {
            let (paths, outcome) = service.restore_commit(&source, &target).await?;
            println!("restored {} paths ({outcome:?}): {paths:?}", paths.len());
        }
        Commands::Reset { commit, backup } => {
            let outcome = service.hard_reset(&commit, backup).await?;
            println!(
                "reset to {commit}: backup={:?} restore={:?}",
                outcome.backup_hash, outcome.restore_hash
            );
        }
        Commands::CommitAll => {
            let outcome = service.commit_all().await?;
            if outcome.committed {
                println!("committed {:?}: \"{}\"", outcome.hash, outcome.message);
            } else {
                println!("nothing to commit");
            }
        }
        Commands::Retain(RetainCommand::Preview) => {
            let preview = service.retention_preview().await?;
            println!(
                "cutoff={} split_size={} within_retention={}",
                preview.cutoff, preview.split_size, preview.within_retention
            );
            for commit in &preview.sample_merged {
                println!("  {} {}", commit.short_hash, commit.subject);
            }
        }
        Commands::Retain(RetainCommand::Run) => {
            let report = service.retention_run().await?;
            println!(
                "merged={} kept={} baseline={:?} backup_branch={:?}",
                report.merged_count, report.kept_count, report.baseline_hash, report.backup_branch
            );
        }
        Commands::Settings(SettingsCommand::Show) => {
            let settings = service.settings_snapshot();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Settings(SettingsCommand::SetDebounce { seconds }) => {
            service.update_settings(|s| s.debounce_seconds = seconds)?;
            println!("debounce set to {seconds}s");
        }
        Commands::Settings(SettingsCommand::SetRetentionEnabled { enabled }) => {
            service.update_settings(|s| s.retention_enabled = enabled)?;
            println!("retention_enabled set to {enabled}");
        }
    }

    Ok(())
}

async fn run_daemon(service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    let (_watcher_handle, _scheduler_handle) = service.spawn_background();
    println!("confsnap daemon watching {}", service.root.display());
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn print_status(service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    let status = service.status().await?;
    println!("branch: {}", status.branch);
    println!("clean: {}", status.clean);
    for file in &status.files {
        println!("  {:?}/{:?} {}", file.index_status, file.work_status, file.path);
    }
    Ok(())
}

async fn print_log(
    service: &Service,
    path: Option<String>,
    max_count: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let commits = match &path {
        Some(p) => service.history_for_path(p).await?,
        None => service.history(max_count).await?,
    };
    for commit in commits {
        println!(
            "{} {} {}",
            commit.short_hash,
            commit.committer_time.to_rfc3339(),
            commit.subject
        );
    }
    Ok(())
}

async fn print_show(service: &Service, commit: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = service.content_at(commit, path).await?;
    print!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

async fn print_changed(service: &Service, commit: &str) -> Result<(), Box<dyn std::error::Error>> {
    let changed = service.changed_in_commit(commit).await?;
    for entry in changed {
        println!("{:?} {}", entry.kind, entry.path);
    }
    Ok(())
}

async fn print_diff(service: &Service, commit: &str) -> Result<(), Box<dyn std::error::Error>> {
    let diff = service.diff_commit(commit).await?;
    print!("{diff}");
    Ok(())
}
