use directories::ProjectDirs;
use std::path::PathBuf;

pub fn user_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("facegate")
        .join("facegate.toml")
}

/// Directory for the gallery embedding cache, if the platform has one.
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "facegate", "facegate").map(|dirs| dirs.cache_dir().to_path_buf())
}
