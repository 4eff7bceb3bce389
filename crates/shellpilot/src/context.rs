//! Immutable per-invocation request context.
//!
//! The context is assembled once in `main` from CLI arguments, the
//! environment configuration and the path resolver, then passed by
//! reference into every component. No component mutates it or reads
//! ambient state behind its back.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

/// Environment binding for the workspace root, injected into scripts.
pub const ENV_HOME: &str = "PILOT_HOME";
/// Environment binding for the technical-artifacts directory.
pub const ENV_ARTIFACTS: &str = "PILOT_ARTIFACTS";
/// Environment binding for the user-data destination directory.
pub const ENV_DEST: &str = "PILOT_DEST";

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The natural-language instruction (or `shell:` passthrough).
    pub instruction: String,
    /// Persistent workspace root (marker-identified).
    pub workspace_root: PathBuf,
    /// Per-run directory for technical artifacts only.
    pub artifacts_dir: PathBuf,
    /// Destination directory for user-facing data.
    pub dest_dir: PathBuf,
    /// Completion model identifier.
    pub model: String,
    /// Sudo password for escalation, if configured.
    pub sudo_password: Option<String>,
    /// Whether the process already runs as root.
    pub is_privileged: bool,
}

impl RequestContext {
    /// Create both run directories. The artifacts directory is
    /// mandatory; the destination directory is best-effort because a
    /// hint may resolve onto a read-only mount.
    pub fn prepare_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.artifacts_dir).with_context(|| {
            format!(
                "Failed to create artifacts dir: {}",
                self.artifacts_dir.display()
            )
        })?;
        if let Err(e) = std::fs::create_dir_all(&self.dest_dir) {
            tracing::warn!(
                dest = %self.dest_dir.display(),
                "Could not create destination dir: {e}"
            );
        }
        Ok(())
    }

    pub fn has_sudo_password(&self) -> bool {
        self.sudo_password.is_some()
    }

    /// The three `(name, value)` bindings injected into every script.
    pub fn script_env(&self) -> [(&'static str, String); 3] {
        [
            (ENV_HOME, path_str(&self.workspace_root)),
            (ENV_ARTIFACTS, path_str(&self.artifacts_dir)),
            (ENV_DEST, path_str(&self.dest_dir)),
        ]
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
