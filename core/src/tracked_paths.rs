use std::path::Path;

/// Extensions the Ignore-File Manager can be configured to allow (§3 "a
/// subset is enabled"). The default extension set turned on by a fresh
/// [`Settings`](crate::settings::Settings) is `yaml`, `yml`, and `json`;
/// `py` and `txt` exist as selectable options but start disabled.
pub const ALL_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "py", "txt"];
pub const DEFAULT_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Fixed allowlist of nested-UI state files (§3 P, §6, SPEC_FULL §D).
pub const UI_STATE_ALLOWLIST: &[&str] = &[
    ".storage/lovelace",
    ".storage/lovelace_dashboards",
    ".storage/lovelace_resources",
    ".HA_VERSION",
];

/// Subset of [`UI_STATE_ALLOWLIST`] whose restoration should trigger the
/// platform reload hooks (§4.G, §6): the two lovelace-adjacent dashboard
/// files reload automations/scripts state, `.HA_VERSION` does not.
pub const RELOAD_TRIGGERING_PATHS: &[&str] =
    &[".storage/lovelace", ".storage/lovelace_dashboards"];

/// Always-ignored suffix/name patterns beyond metadata leaves and nested
/// repos (SPEC_FULL §D).
pub const ALWAYS_IGNORED_SUFFIXES: &[&str] = &[".db", ".db-journal", ".log", ".sqlite"];
pub const ALWAYS_IGNORED_DIR_NAMES: &[&str] = &["__pycache__"];
pub const METADATA_LEAF_PREFIX: &str = "._";

/// Returns whether `ext` (without the leading dot) is one of the
/// extensions this build of the system knows how to track at all.
pub fn is_known_extension(ext: &str) -> bool {
    ALL_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// The Tracked Path Set predicate (§3 P, §4.E step 4 "defence in depth"):
/// true if `rel_path` would be committed given `enabled_extensions`.
///
/// `rel_path` is relative to the config root and uses `/` separators.
pub fn is_tracked(rel_path: &str, enabled_extensions: &[String]) -> bool {
    if UI_STATE_ALLOWLIST.contains(&rel_path) {
        return true;
    }

    if is_always_ignored(rel_path) {
        return false;
    }

    match Path::new(rel_path).extension().and_then(|e| e.to_str()) {
        Some(ext) => enabled_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Whether `rel_path` falls under one of the always-ignored categories
/// regardless of extension: metadata leaf files, log/db/sqlite families,
/// `__pycache__` directories, or the repository's own metadata dir.
pub fn is_always_ignored(rel_path: &str) -> bool {
    let path = Path::new(rel_path);

    if path.components().any(|c| c.as_os_str() == ".git") {
        return true;
    }

    if path
        .components()
        .any(|c| ALWAYS_IGNORED_DIR_NAMES.contains(&c.as_os_str().to_string_lossy().as_ref()))
    {
        return true;
    }

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.starts_with(METADATA_LEAF_PREFIX) {
            return true;
        }

        if ALWAYS_IGNORED_SUFFIXES.iter().any(|suf| name.ends_with(suf)) {
            return true;
        }
    }

    false
}
