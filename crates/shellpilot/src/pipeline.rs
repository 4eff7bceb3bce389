//! The generation–execution–repair controller.
//!
//! One run is a bounded loop: generate a script, execute it, classify
//! any failure, allow at most one elevated retry of the same script
//! and at most one content repair with a fresh script. Worst case is
//! two completion calls and four process executions. Attempts are
//! strictly sequential; the repair never starts before the first
//! attempt's result (escalation included) is resolved.
//!
//! After every execution, success or failure alike, the same two
//! idempotent housekeeping actions run: auxiliary script
//! artifacts are archived into the workspace and any shortcut manifest
//! is processed.

use std::path::Path;

use anyhow::Result;

use crate::completion::{self, CompletionBackend};
use crate::context::RequestContext;
use crate::escalate::{classify, decide, EscalationDecision};
use crate::executor::{ExecutionResult, ScriptExecutionEngine};
use crate::journal::Journal;
use crate::prompt;
use crate::shortcuts;
use crate::state_machine::{RunState, RunStateMachine};

/// Terminal summary of one run. The process exit code equals the last
/// execution's exit code.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// Number of generated scripts executed (1 or 2).
    pub attempts: u32,
    /// Whether a repair attempt happened.
    pub repaired: bool,
    /// Last permission-related decision, if any.
    pub escalation: Option<EscalationDecision>,
}

/// Drives one request end to end.
pub struct Pipeline<'a> {
    ctx: &'a RequestContext,
    backend: &'a dyn CompletionBackend,
    journal: &'a Journal,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ctx: &'a RequestContext,
        backend: &'a dyn CompletionBackend,
        journal: &'a Journal,
    ) -> Self {
        Self {
            ctx,
            backend,
            journal,
        }
    }

    /// Run the pipeline to a terminal outcome.
    pub async fn run(&self) -> Result<RunOutcome> {
        let engine = ScriptExecutionEngine::new(self.ctx, self.journal);

        if let Some(command) = passthrough_command(&self.ctx.instruction) {
            let _ = engine.shell_passthrough(&command).await?;
            self.housekeeping().await;
            // Passthrough reports success regardless of the command's
            // own exit code; the log carries the details.
            return Ok(RunOutcome {
                exit_code: 0,
                attempts: 1,
                repaired: false,
                escalation: None,
            });
        }

        let mut sm = RunStateMachine::new();

        // First attempt.
        let initial_prompt = prompt::build_initial(self.ctx);
        let source = completion::generate_script(self.backend, &initial_prompt).await;
        self.journal.save_script(self.ctx, &source, 1);
        let script = engine.write_script(&source)?;
        sm.advance(RunState::Executing, Some("first attempt"))?;

        let first = engine.execute(&script, 1, false).await?;
        let (first, decision) = self.handle_escalation(&engine, &mut sm, &script, first).await?;
        self.housekeeping().await;

        if first.success() {
            sm.advance(RunState::Succeeded, Some("exit 0"))?;
            return Ok(RunOutcome {
                exit_code: 0,
                attempts: 1,
                repaired: false,
                escalation: decision,
            });
        }

        // Permission failures that escalation cannot resolve are
        // terminal: regeneration will not conjure a credential.
        if matches!(
            decision,
            Some(EscalationDecision::Unavailable) | Some(EscalationDecision::AlreadyPrivileged)
        ) {
            sm.fail("escalation unavailable")?;
            return Ok(RunOutcome {
                exit_code: first.exit_code,
                attempts: 1,
                repaired: false,
                escalation: decision,
            });
        }

        // Repair attempt: one corrected script, then stop either way.
        sm.advance(RunState::Repairing, Some("generic failure"))?;
        sm.set_attempt(2);
        let repair_prompt = prompt::build_repair(self.ctx, &source, &first.stderr);
        let fixed = completion::generate_script(self.backend, &repair_prompt).await;
        self.journal.save_script(self.ctx, &fixed, 2);
        let script = engine.write_script(&fixed)?;
        self.journal.log("[INFO] Running repaired script...");
        sm.advance(RunState::Executing, Some("repair attempt"))?;

        let second = engine.execute(&script, 2, false).await?;
        let (second, decision2) = self
            .handle_escalation(&engine, &mut sm, &script, second)
            .await?;
        self.housekeeping().await;

        if second.success() {
            sm.advance(RunState::Succeeded, Some("repair exit 0"))?;
        } else {
            sm.fail("repair attempt exhausted")?;
        }

        Ok(RunOutcome {
            exit_code: second.exit_code,
            attempts: 2,
            repaired: true,
            escalation: decision2.or(decision),
        })
    }

    /// Apply the escalation decision to a finished execution. At most
    /// one elevated re-execution of the same script; the decision made
    /// here is final for this attempt.
    async fn handle_escalation(
        &self,
        engine: &ScriptExecutionEngine<'_>,
        sm: &mut RunStateMachine,
        script: &Path,
        result: ExecutionResult,
    ) -> Result<(ExecutionResult, Option<EscalationDecision>)> {
        if result.success() {
            return Ok((result, None));
        }
        let classification = classify(&result);
        let decision = decide(
            classification,
            self.ctx.is_privileged,
            self.ctx.has_sudo_password(),
        );
        match decision {
            EscalationDecision::NotApplicable => Ok((result, None)),
            EscalationDecision::Retry => {
                sm.advance(RunState::Escalating, Some("permission signature"))?;
                self.journal.log("[INFO] Retrying with elevation (sudo)...");
                let retried = engine.execute(script, result.attempt, true).await?;
                Ok((retried, Some(EscalationDecision::Retry)))
            }
            EscalationDecision::Unavailable => {
                self.journal
                    .log("[WARN] sudo required but no password configured");
                Ok((result, Some(decision)))
            }
            EscalationDecision::AlreadyPrivileged => {
                self.journal
                    .log("[WARN] permission failure while already privileged");
                Ok((result, Some(decision)))
            }
        }
    }

    /// Post-execution housekeeping: archive auxiliary script artifacts
    /// and process the shortcut manifest. Both idempotent, both
    /// best-effort.
    async fn housekeeping(&self) {
        self.archive_auxiliary_scripts();
        let _ = shortcuts::process_manifest(self.ctx, self.journal).await;
    }

    /// Move any `action.*` file the generated script left in the
    /// artifacts directory into the persistent workspace, so it
    /// survives artifacts-directory cleanup.
    fn archive_auxiliary_scripts(&self) {
        let Ok(entries) = std::fs::read_dir(&self.ctx.artifacts_dir) else {
            return;
        };
        let run_name = self
            .ctx
            .artifacts_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".into());

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.file_stem().and_then(|s| s.to_str()) != Some("action") {
                continue;
            }
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let dst_dir = self.ctx.workspace_root.join("_internal");
            let dst = dst_dir.join(format!("action_{run_name}{ext}"));
            let archived = std::fs::create_dir_all(&dst_dir)
                .and_then(|_| std::fs::rename(&path, &dst));
            match archived {
                Ok(()) => self
                    .journal
                    .log(&format!("[INFO] auxiliary script archived: {}", dst.display())),
                Err(e) => self
                    .journal
                    .log(&format!("[WARN] could not archive {}: {e}", path.display())),
            }
        }
    }
}

/// Extract the command from a `shell:` passthrough instruction.
pub fn passthrough_command(instruction: &str) -> Option<String> {
    let trimmed = instruction.trim();
    let prefix = trimmed.get(..6)?;
    if prefix.eq_ignore_ascii_case("shell:") {
        Some(trimmed[6..].trim().to_string())
    } else {
        None
    }
}
