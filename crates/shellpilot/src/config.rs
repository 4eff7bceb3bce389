//! Environment configuration for a pilot run.
//!
//! All ambient environment reads happen here, once, at startup. Every
//! other module works from the resulting [`PilotConfig`] or from the
//! [`crate::context::RequestContext`] built from it.

use thiserror::Error;

/// Environment variable holding the completion-service credential.
pub const ENV_API_KEY: &str = "SHELLPILOT_API_KEY";
/// Environment variable selecting the completion model.
pub const ENV_MODEL: &str = "SHELLPILOT_MODEL";
/// Environment variable overriding the completion endpoint base URL.
pub const ENV_BASE_URL: &str = "SHELLPILOT_BASE_URL";
/// Environment variable holding the sudo password for escalation.
pub const ENV_SUDO_PASSWORD: &str = "SHELLPILOT_SUDO_PASSWORD";

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Fatal configuration errors. Anything else in the pipeline is
/// absorbed into the run's final exit code; these abort before any
/// resolution work happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{ENV_API_KEY} is not set (completion-service credential required)")]
    MissingApiKey,
}

/// Top-level configuration, read from the environment once.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    /// Completion-service API key (required).
    pub api_key: String,
    /// Completion model identifier.
    pub model: String,
    /// Completion endpoint base URL (OpenAI-compatible chat completions).
    pub base_url: String,
    /// Sudo password for privilege escalation, if configured.
    pub sudo_password: Option<String>,
    /// Whether the process is already running as root.
    pub is_privileged: bool,
}

impl PilotConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let model = std::env::var(ENV_MODEL)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        let base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .map(|v| v.trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());

        let sudo_password = std::env::var(ENV_SUDO_PASSWORD)
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_key,
            model,
            base_url,
            sudo_password,
            is_privileged: effective_uid_is_root(),
        })
    }
}

/// Whether the effective uid is root, read from `/proc/self/status`.
///
/// The `Uid:` line carries real, effective, saved and fs uids; the
/// second field is the effective one.
pub fn effective_uid_is_root() -> bool {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return false;
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            return rest.split_whitespace().nth(1) == Some("0");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_uid_probe_does_not_panic() {
        // Value depends on the test environment; only the probe itself
        // is under test.
        let _ = effective_uid_is_root();
    }

    #[test]
    fn config_error_names_the_variable() {
        let msg = ConfigError::MissingApiKey.to_string();
        assert!(msg.contains(ENV_API_KEY));
    }
}
