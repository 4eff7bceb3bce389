//! Per-run persistence: the cumulative run log and the metadata
//! records written alongside each generated script.
//!
//! Every write here is best-effort by policy: a failed log or metadata
//! write produces a `warn!` and nothing else, because observability
//! must never block the primary task. Entries in `log.txt` are ordered
//! by append, which is their timestamp.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::context::RequestContext;
use crate::executor::ExecutionResult;

/// File names under the artifacts directory.
pub const LOG_FILE: &str = "log.txt";
pub const META_FILE: &str = "meta.json";
pub const INFO_FILE: &str = "info.json";
pub const GENERATED_SCRIPT_FILE: &str = "script.generated.sh";

/// Run journal rooted at the artifacts directory.
#[derive(Debug, Clone)]
pub struct Journal {
    artifacts_dir: PathBuf,
}

impl Journal {
    pub fn new(artifacts_dir: &Path) -> Self {
        Self {
            artifacts_dir: artifacts_dir.to_path_buf(),
        }
    }

    /// Append one line to the run log, mirroring it to tracing output.
    ///
    /// The log file is read in full, appended to and rewritten, which
    /// matches the append-order timestamping contract. Concurrent
    /// invocations against the same artifacts directory are
    /// unsupported.
    pub fn log(&self, msg: &str) {
        info!("{msg}");
        let path = self.artifacts_dir.join(LOG_FILE);
        let prev = std::fs::read_to_string(&path).unwrap_or_default();
        if let Err(e) = std::fs::write(&path, format!("{prev}{msg}\n")) {
            warn!(log = %path.display(), "Failed to append run log: {e}");
        }
    }

    /// Log an execution's captured output the way the run log expects
    /// it: stdout verbatim, stderr prefixed.
    pub fn log_output(&self, result: &ExecutionResult) {
        if !result.stdout.is_empty() {
            self.log(result.stdout.trim_end());
        }
        if !result.stderr.is_empty() {
            self.log(&format!("[stderr] {}", result.stderr.trim_end()));
        }
    }

    /// Persist the raw generated script and its metadata record.
    pub fn save_script(&self, ctx: &RequestContext, source: &str, attempt: u32) {
        self.write_best_effort(GENERATED_SCRIPT_FILE, source);

        let meta = serde_json::json!({
            "instruction": ctx.instruction,
            "workspace_root": ctx.workspace_root,
            "artifacts_dir": ctx.artifacts_dir,
            "dest_dir": ctx.dest_dir,
            "as_root": ctx.is_privileged,
            "attempt": attempt,
            "ts": chrono::Utc::now().to_rfc3339(),
            "model": ctx.model,
        });
        self.write_json(META_FILE, &meta);
    }

    /// Persist the run-info record written once at startup.
    pub fn save_run_info(&self, ctx: &RequestContext) {
        let info = serde_json::json!({
            "instruction": ctx.instruction,
            "created_at": chrono::Utc::now().to_rfc3339(),
            "env": {
                "as_root": ctx.is_privileged,
                "has_sudo_password": ctx.has_sudo_password(),
            },
        });
        self.write_json(INFO_FILE, &info);
    }

    fn write_json(&self, name: &str, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(body) => self.write_best_effort(name, &body),
            Err(e) => warn!(file = name, "Failed to serialize record: {e}"),
        }
    }

    fn write_best_effort(&self, name: &str, body: &str) {
        let path = self.artifacts_dir.join(name);
        if let Err(e) = std::fs::write(&path, body) {
            warn!(file = %path.display(), "Failed to persist record: {e}");
        }
    }
}
