//! Script persistence and execution.
//!
//! Scripts are written to disk with a strict-mode preamble before
//! anything runs, so a crashed run still leaves the exact script
//! behind for post-mortem inspection. Execution always happens through
//! an argument vector, never a shell-interpolated string, with the
//! three directory bindings injected on top of the inherited
//! environment and the artifacts directory as working directory.
//!
//! Elevated re-execution wraps the same script in `sudo -S`, writing
//! the password to sudo's stdin and forwarding the three bindings
//! explicitly through `env`, because sudo may drop the inherited
//! environment.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::context::{RequestContext, ENV_ARTIFACTS, ENV_DEST, ENV_HOME};
use crate::journal::Journal;

/// Interpreter preamble prepended to every persisted script.
pub const SCRIPT_PREAMBLE: &str = "#!/bin/bash\nset -euo pipefail\n";

/// On-disk name of the executable script.
pub const SCRIPT_FILE: &str = "exec.sh";

/// Outcome of one child-process execution. Never mutated after
/// creation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// 1 for the first generated script, 2 for the repaired one.
    pub attempt: u32,
    pub elevated: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Lowercased stdout+stderr, for signature scanning.
    pub fn combined_lower(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).to_lowercase()
    }
}

/// Writes and runs generated scripts for one request.
pub struct ScriptExecutionEngine<'a> {
    ctx: &'a RequestContext,
    journal: &'a Journal,
}

impl<'a> ScriptExecutionEngine<'a> {
    pub fn new(ctx: &'a RequestContext, journal: &'a Journal) -> Self {
        Self { ctx, journal }
    }

    /// Persist `source` as the executable script, preamble included,
    /// mode 0755. Always happens before execution.
    pub fn write_script(&self, source: &str) -> Result<PathBuf> {
        let path = self.ctx.artifacts_dir.join(SCRIPT_FILE);
        let body = format!("{SCRIPT_PREAMBLE}{}\n", source.trim_end());
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write script: {}", path.display()))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to chmod script: {}", path.display()))?;
        Ok(path)
    }

    /// Run the persisted script, elevated or not, and capture its
    /// output in full. There is deliberately no execution timeout: a
    /// hung script blocks the run, matching the pipeline's contract.
    pub async fn execute(
        &self,
        script: &Path,
        attempt: u32,
        elevate: bool,
    ) -> Result<ExecutionResult> {
        let elevated = elevate && self.ctx.sudo_password.is_some();
        let output = if elevated {
            self.run_elevated(script).await?
        } else {
            self.run_plain(script).await?
        };

        let result = ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            attempt,
            elevated,
        };
        debug!(
            attempt,
            elevated,
            exit_code = result.exit_code,
            "Script execution finished"
        );
        self.journal.log_output(&result);
        Ok(result)
    }

    async fn run_plain(&self, script: &Path) -> Result<std::process::Output> {
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg(script)
            .current_dir(&self.ctx.artifacts_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in self.ctx.script_env() {
            cmd.env(k, v);
        }
        cmd.output().await.context("Failed to spawn bash")
    }

    async fn run_elevated(&self, script: &Path) -> Result<std::process::Output> {
        let password = self
            .ctx
            .sudo_password
            .as_deref()
            .context("Elevation requested without a credential")?;

        let [(_, home), (_, artifacts), (_, dest)] = self.ctx.script_env();
        let mut cmd = tokio::process::Command::new("sudo");
        cmd.args(["-S", "-p", ""])
            .arg("env")
            .arg(format!("{ENV_HOME}={home}"))
            .arg(format!("{ENV_ARTIFACTS}={artifacts}"))
            .arg(format!("{ENV_DEST}={dest}"))
            .arg("bash")
            .arg(script)
            .current_dir(&self.ctx.artifacts_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in self.ctx.script_env() {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().context("Failed to spawn sudo")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(format!("{password}\n").as_bytes())
                .await
                .context("Failed to feed sudo password")?;
        }
        child
            .wait_with_output()
            .await
            .context("Failed to wait for elevated script")
    }

    /// Execute a raw `shell:` passthrough command in the artifacts
    /// directory, bypassing generation entirely.
    pub async fn shell_passthrough(&self, command: &str) -> Result<ExecutionResult> {
        self.journal.log(&format!("> shell passthrough: {command}"));
        let output = tokio::process::Command::new("bash")
            .args(["-lc", command])
            .current_dir(&self.ctx.artifacts_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to spawn passthrough shell")?;

        let result = ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            attempt: 1,
            elevated: false,
        };
        self.journal.log_output(&result);
        Ok(result)
    }
}
