use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use shellpilot::completion::OpenAiBackend;
use shellpilot::config::PilotConfig;
use shellpilot::context::RequestContext;
use shellpilot::journal::Journal;
use shellpilot::paths::{self, PathResolver};
use shellpilot::pipeline::Pipeline;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Natural-language instruction, or `shell: <cmd>` to run the
    /// remainder directly without generation
    instruction: String,

    /// Technical-artifacts directory (default: a timestamped directory
    /// under the workspace)
    artifacts_dir: Option<PathBuf>,

    /// Destination hint for user data: a keyword ("pictures",
    /// "bureau"), a Windows path (C:\...), or a native path
    dest_hint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    if args.instruction.trim().is_empty() {
        error!("Instruction must not be empty");
        std::process::exit(1);
    }

    // Configuration errors abort before any resolution work.
    let config = match PilotConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let resolver = PathResolver::detect();
    let workspace_root = resolver.find_workspace_root();
    let artifacts_dir = args.artifacts_dir.unwrap_or_else(|| {
        workspace_root.join("_internal").join(format!(
            "req_{}",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        ))
    });
    let dest_dir = resolver.resolve_hint(args.dest_hint.as_deref().unwrap_or(""));

    let ctx = RequestContext {
        instruction: args.instruction.trim().to_string(),
        workspace_root,
        artifacts_dir,
        dest_dir,
        model: config.model.clone(),
        sudo_password: config.sudo_password.clone(),
        is_privileged: config.is_privileged,
    };
    ctx.prepare_dirs()?;

    let journal = Journal::new(&ctx.artifacts_dir);
    journal.log("=== shellpilot run ===");
    journal.log(&format!(
        "Date: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    journal.log(&format!(
        "WSL: {} | EUID: {}",
        if paths::is_wsl() { "yes" } else { "no" },
        if ctx.is_privileged { "root" } else { "user" }
    ));
    journal.log(&format!("Workspace: {}", ctx.workspace_root.display()));
    journal.log(&format!("Artifacts: {}", ctx.artifacts_dir.display()));
    if ctx.dest_dir != ctx.workspace_root {
        journal.log(&format!("Destination: {}", ctx.dest_dir.display()));
    }
    journal.log(&format!("Model: {}", ctx.model));
    journal.save_run_info(&ctx);

    let backend = OpenAiBackend::new(&config)?;
    let pipeline = Pipeline::new(&ctx, &backend, &journal);
    let outcome = pipeline.run().await?;

    info!(
        exit_code = outcome.exit_code,
        attempts = outcome.attempts,
        repaired = outcome.repaired,
        "Run finished"
    );
    std::process::exit(outcome.exit_code);
}
