use std::path::PathBuf;

/// Env var naming the config root (§6 "Environment inputs").
pub const CONFIG_ROOT_ENV: &str = "CONFSNAP_CONFIG_ROOT";
const DEFAULT_CONFIG_ROOT: &str = "/config";

pub const IGNORE_FILENAME: &str = ".gitignore";
pub const SETTINGS_RELATIVE_PATH: &str = ".storage/confsnap.json";

pub fn resolve_config_root() -> PathBuf {
    std::env::var(CONFIG_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_ROOT))
}

pub fn settings_path(root: &std::path::Path) -> PathBuf {
    root.join(SETTINGS_RELATIVE_PATH)
}

pub fn ignore_file_path(root: &std::path::Path) -> PathBuf {
    root.join(IGNORE_FILENAME)
}
