//! Ignore-File Manager (§4.B): generates and reconciles the tracked-file
//! policy document, and discovers nested sub-repositories below the root.

use std::path::{Path, PathBuf};

use crate::error::CoreResult;
use crate::paths::{IGNORE_FILENAME, ignore_file_path};
use crate::tracked_paths::UI_STATE_ALLOWLIST;

const HIDDEN_FILE_TRACKING: bool = false;

/// Renders the ignore-file body (§6 "Ignore-file format"): deny-all,
/// then an allowlist per enabled extension plus the fixed UI-state
/// allowlist, then re-denylisting for metadata leaves and discovered
/// nested repositories.
///
/// The ignore-file allow-lists itself right after the deny-all line:
/// nothing in §6's format block says so, but §3 invariant 1 requires the
/// ignore-file to be tracked, and its own name never matches any
/// extension pattern. Without this line a freshly generated `*` rule
/// would mark it ignored before it's ever staged.
pub fn render(enabled_extensions: &[String], nested_repos: &[PathBuf]) -> String {
    let mut out = String::new();
    out.push_str("*\n");
    out.push_str(&format!("!/{IGNORE_FILENAME}\n"));

    let mut exts: Vec<&String> = enabled_extensions.iter().collect();
    exts.sort();
    for ext in exts {
        out.push_str(&format!("!*.{ext}\n"));
        if HIDDEN_FILE_TRACKING {
            out.push_str(&format!("!**/.??*.{ext}\n"));
        }
    }

    for entry in UI_STATE_ALLOWLIST {
        out.push_str(&format!("!{entry}\n"));
    }

    out.push_str("!*/\n");
    out.push_str("._*\n");

    let mut repos: Vec<String> = nested_repos
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    repos.sort();
    for repo in repos {
        out.push_str(&format!("/{repo}\n"));
        out.push_str(&format!("/{repo}/**\n"));
    }

    out
}

/// Reconciles the on-disk ignore-file with the rendered content (§4.B
/// "read existing, compare trimmed, overwrite only if different" —
/// §3 P2 determinism).
pub fn reconcile(root: &Path, enabled_extensions: &[String], nested_repos: &[PathBuf]) -> CoreResult<bool> {
    let rendered = render(enabled_extensions, nested_repos);
    let path = ignore_file_path(root);

    let existing = std::fs::read_to_string(&path).ok();
    if existing.as_deref().map(str::trim) == Some(rendered.trim()) {
        return Ok(false);
    }

    std::fs::write(&path, rendered)?;
    Ok(true)
}

/// Recursively finds `.git` directories below `root`, excluding the
/// root's own metadata dir (§4.B, §GLOSSARY "nested sub-repository").
/// Depth is bounded and symlinks are not followed, matching the
/// watcher's own traversal discipline (§4.D detail floor).
pub fn discover_nested_repos(root: &Path) -> Vec<PathBuf> {
    const MAX_DEPTH: usize = 15;
    let mut found = Vec::new();
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            continue;
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            if !file_type.is_dir() {
                continue;
            }

            let name = entry.file_name();
            if name == ".git" {
                if dir != root {
                    if let Ok(rel) = dir.strip_prefix(root) {
                        found.push(rel.to_path_buf());
                    }
                }
                continue;
            }

            if name == "__pycache__" {
                continue;
            }

            stack.push((path, depth + 1));
        }
    }

    found
}
