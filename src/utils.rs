//! Per-user directories for stackwall's files
//!
//! Paths follow the XDG Base Directory layout via `directories`:
//!
//! - Data: `~/.local/share/stackwall/ruleset.json` - the saved ruleset that
//!   `show` and `check` fall back to (see [`crate::config::default_ruleset_path`])
//! - State: `~/.local/state/stackwall/audit.log` - the JSON-lines audit log
//!   written by [`crate::audit`]
//!
//! Platforms without a state directory (macOS, Windows) have no audit log path.
//!
//! # Example
//!
//! ```
//! use stackwall::utils::{audit_log_path, ensure_dirs};
//!
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(log) = audit_log_path() {
//!     println!("auditing to {}", log.display());
//! }
//! ```

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// File name of the audit log inside the state directory.
pub const AUDIT_LOG_FILE: &str = "audit.log";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "stackwall", "stackwall")
}

/// Directory holding `ruleset.json`.
pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Directory holding the audit log.
pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().and_then(|dirs| dirs.state_dir().map(Path::to_path_buf))
}

pub fn audit_log_path() -> Option<PathBuf> {
    get_state_dir().map(|dir| dir.join(AUDIT_LOG_FILE))
}

/// Creates the data and state directories, owner-only on unix.
pub fn ensure_dirs() -> std::io::Result<()> {
    for dir in [get_data_dir(), get_state_dir()].into_iter().flatten() {
        create_private_dir(&dir)?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .mode(0o700)
        .recursive(true)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
