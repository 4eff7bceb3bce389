//! Shortcut manifest processing.
//!
//! Generated scripts request OS-level shortcuts by writing
//! `shortcuts.json` into the artifacts directory instead of creating
//! them directly. This module parses that manifest at the boundary
//! into validated entries and hands each one to the external
//! `create_shortcut.sh` collaborator. Malformed entries are skipped
//! individually with a warning; one bad entry never aborts the batch.
//!
//! Generators routinely under-escape Windows backslashes in the raw
//! file, so every backslash is doubled before parsing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::context::RequestContext;
use crate::journal::Journal;
use crate::prompt::SHORTCUT_MANIFEST;

/// One validated shortcut request. `workdir` and `icon` default to
/// empty strings when absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShortcutEntry {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub workdir: String,
    #[serde(default)]
    pub icon: String,
}

/// Parse the raw manifest text into valid entries.
///
/// A non-array document yields nothing; entries of the wrong type or
/// missing `name`/`target` are dropped with a warning.
pub fn parse_manifest(raw: &str) -> Vec<ShortcutEntry> {
    let normalized = raw.replace('\\', "\\\\");
    let values: Vec<serde_json::Value> = match serde_json::from_str(&normalized) {
        Ok(v) => v,
        Err(e) => {
            warn!("Shortcut manifest is not a JSON list of objects: {e}");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for value in values {
        match serde_json::from_value::<ShortcutEntry>(value) {
            Ok(entry) => {
                if entry.name.trim().is_empty() || entry.target.trim().is_empty() {
                    warn!("Shortcut entry skipped (name/target missing)");
                    continue;
                }
                entries.push(entry);
            }
            Err(e) => warn!("Shortcut entry skipped: {e}"),
        }
    }
    entries
}

/// Locate the external collaborator script: `<workspace>/bin` first,
/// then next to our own executable.
fn find_collaborator(workspace_root: &Path) -> Option<PathBuf> {
    let mut candidates = vec![workspace_root.join("bin").join("create_shortcut.sh")];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("create_shortcut.sh"));
        }
    }
    candidates.into_iter().find(|c| c.exists())
}

/// Invoke the collaborator for one entry. Argument vector, no shell
/// string assembly.
async fn create_shortcut(
    collaborator: &Path,
    entry: &ShortcutEntry,
    ctx: &RequestContext,
    journal: &Journal,
) -> bool {
    let output = tokio::process::Command::new("bash")
        .arg(collaborator)
        .args([&entry.name, &entry.target, &entry.workdir, &entry.icon])
        .current_dir(&ctx.artifacts_dir)
        .output()
        .await;

    match output {
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stdout.trim().is_empty() {
                journal.log(stdout.trim());
            }
            if !stderr.trim().is_empty() {
                journal.log(&format!("[stderr] {}", stderr.trim()));
            }
            out.status.success()
        }
        Err(e) => {
            journal.log(&format!("[WARN] create_shortcut failed to spawn: {e}"));
            false
        }
    }
}

/// Process the manifest, if the generated script wrote one. Returns
/// the number of shortcuts created. Idempotent when no manifest
/// exists; never fatal.
pub async fn process_manifest(ctx: &RequestContext, journal: &Journal) -> usize {
    let manifest = ctx.artifacts_dir.join(SHORTCUT_MANIFEST);
    let raw = match std::fs::read_to_string(&manifest) {
        Ok(raw) => raw,
        Err(_) => return 0,
    };

    let entries = parse_manifest(&raw);
    if entries.is_empty() {
        return 0;
    }

    let Some(collaborator) = find_collaborator(&ctx.workspace_root) else {
        journal.log("[WARN] create_shortcut.sh not found; shortcuts skipped");
        return 0;
    };

    let mut created = 0;
    for entry in &entries {
        if create_shortcut(&collaborator, entry, ctx, journal).await {
            created += 1;
        }
    }
    journal.log(&format!("[INFO] Post-install: {created} shortcut(s) created"));
    created
}
