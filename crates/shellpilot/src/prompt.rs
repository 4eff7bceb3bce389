//! Prompt rendering for script generation and repair.
//!
//! Every request embeds the three resolved directories as literal
//! values plus the fixed placement/safety rules, so the generated
//! script's I/O lands where the run expects it. Repair prompts carry
//! the failed script and its captured error output in full and demand
//! a complete replacement, never a diff.

use crate::context::{RequestContext, ENV_ARTIFACTS, ENV_DEST, ENV_HOME};

/// System preamble sent with every completion request.
pub const SYSTEM_PREAMBLE: &str = "You are a system automation assistant for an Ubuntu guest \
environment. Return ONLY bash code, with no explanations and no text outside the code.";

/// Name of the shortcut manifest a script may write into the
/// artifacts directory.
pub const SHORTCUT_MANIFEST: &str = "shortcuts.json";

/// The placement and safety rules, with the run's directories inlined.
fn placement_rules(ctx: &RequestContext) -> String {
    format!(
        r#"Environment variables available to the script:
- {ENV_HOME}="{home}"
- {ENV_ARTIFACTS}="{artifacts}"
- {ENV_DEST}="{dest}"

RULES:
1) User-facing data goes to "${ENV_DEST}" if set, otherwise to the root of "${ENV_HOME}".
2) Technical artifacts go to "${ENV_ARTIFACTS}" ONLY.
3) No host-level installation: use apt/pip inside the guest distro.
4) For Windows shortcuts, write "${ENV_ARTIFACTS}/{SHORTCUT_MANIFEST}" (a JSON list of
   objects {{ "name":"...", "target":"C:\\Path\\app.exe", "workdir":"...", "icon":"..." }})
   instead of creating shortcuts directly.
5) Start from `set -euo pipefail` semantics and use sudo only if indispensable."#,
        home = ctx.workspace_root.display(),
        artifacts = ctx.artifacts_dir.display(),
        dest = ctx.dest_dir.display(),
    )
}

/// Build the first-attempt prompt for an instruction.
pub fn build_initial(ctx: &RequestContext) -> String {
    format!(
        "User instruction:\n{instruction}\n\n\
         TASK:\n\
         - Write a BASH script that accomplishes the instruction while strictly \
         following the I/O rules below.\n\
         - Output ONLY bash (no commentary, no text outside the code).\n\n\
         {rules}\n",
        instruction = ctx.instruction,
        rules = placement_rules(ctx),
    )
}

/// Build the repair prompt from a failed script and its error output.
pub fn build_repair(ctx: &RequestContext, failed_script: &str, error_output: &str) -> String {
    format!(
        "BASH SCRIPT:\n{failed_script}\n\n\
         ERROR:\n{error_output}\n\n\
         Fix the script above and return the COMPLETE corrected script, not a diff. \
         Mandatory reminders:\n\
         - Technical artifacts ONLY in \"${ENV_ARTIFACTS}\".\n\
         - User data in \"${ENV_DEST}\" if set, otherwise at the root of \"${ENV_HOME}\".\n\
         - For Windows shortcuts, write the JSON manifest \
         \"${ENV_ARTIFACTS}/{SHORTCUT_MANIFEST}\" (a list of objects).\n\
         - Return ONLY bash.\n\n\
         {rules}\n",
        rules = placement_rules(ctx),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> RequestContext {
        RequestContext {
            instruction: "organize my photos".into(),
            workspace_root: PathBuf::from("/home/u/ShellPilot"),
            artifacts_dir: PathBuf::from("/home/u/ShellPilot/_internal/req_x"),
            dest_dir: PathBuf::from("/mnt/c/Users/u/Pictures"),
            model: "m".into(),
            sudo_password: None,
            is_privileged: false,
        }
    }

    #[test]
    fn initial_prompt_embeds_instruction_and_directories() {
        let p = build_initial(&ctx());
        assert!(p.contains("organize my photos"));
        assert!(p.contains("/home/u/ShellPilot/_internal/req_x"));
        assert!(p.contains("/mnt/c/Users/u/Pictures"));
        assert!(p.contains("set -euo pipefail"));
        assert!(p.contains(SHORTCUT_MANIFEST));
    }

    #[test]
    fn repair_prompt_carries_script_and_error() {
        let p = build_repair(&ctx(), "echo broken", "bash: nope: command not found");
        assert!(p.contains("echo broken"));
        assert!(p.contains("command not found"));
        assert!(p.contains("COMPLETE corrected script"));
        // Repair restates the placement rules too.
        assert!(p.contains("/home/u/ShellPilot/_internal/req_x"));
    }
}
