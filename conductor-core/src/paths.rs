// ABOUTME: XDG Base Directory paths for config, data, and logs.
// ABOUTME: Falls back to local directories when no home directory can be determined.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "conductor";
const APPLICATION: &str = "conductor";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Data directory (e.g., ~/.local/share/conductor/), else ./data
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Config directory (e.g., ~/.config/conductor/), else the current directory
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Expand a leading `~` to the home directory.
///
/// Logs a warning and returns the path unchanged if the home directory is unknown.
pub fn expand_tilde(path: &str) -> String {
    let rest = if path == "~" {
        ""
    } else if let Some(stripped) = path.strip_prefix("~/") {
        stripped
    } else {
        return path.to_string();
    };

    match directories::BaseDirs::new() {
        Some(base_dirs) if rest.is_empty() => base_dirs.home_dir().to_string_lossy().to_string(),
        Some(base_dirs) => base_dirs
            .home_dir()
            .join(rest)
            .to_string_lossy()
            .to_string(),
        None => {
            tracing::warn!(path = %path, "Failed to expand tilde: could not determine home directory");
            path.to_string()
        }
    }
}
