use std::env;
use std::path::PathBuf;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Configuration file location: `DESIGNER_CONFIG` wins, otherwise
/// `designer_config.json` under the project root.
pub fn config_path() -> PathBuf {
    match env::var_os("DESIGNER_CONFIG") {
        Some(val) => PathBuf::from(val),
        None => project_root().join("designer_config.json"),
    }
}
