//! Run state machine — explicit states and legal transition guards
//! for the generation–execution–repair loop.
//!
//! The pipeline calls `advance()` to move between states. Each call
//! validates that the transition is legal and records it, so a run's
//! exact path (escalated? repaired?) can be reconstructed from the
//! transition log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of run states.
///
/// Every run starts at `Generating` and terminates at either
/// `Succeeded` or `Failed`. `Repairing` is reachable at most once; the
/// pipeline enforces the single-repair bound via the attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Building the prompt and obtaining a script from the
    /// completion service.
    Generating,
    /// Running the persisted script as a child process.
    Executing,
    /// Re-running the same script with elevation after a
    /// permission-denied classification.
    Escalating,
    /// Obtaining a corrected script from the failed one.
    Repairing,
    /// Script exited zero. Terminal.
    Succeeded,
    /// Attempts exhausted or escalation unavailable. Terminal.
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generating => write!(f, "Generating"),
            Self::Executing => write!(f, "Executing"),
            Self::Escalating => write!(f, "Escalating"),
            Self::Repairing => write!(f, "Repairing"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions:
/// ```text
/// Generating → Executing | Failed
/// Executing  → Succeeded | Escalating | Repairing | Failed
/// Escalating → Succeeded | Repairing | Failed
/// Repairing  → Executing | Failed
/// ```
fn is_legal_transition(from: RunState, to: RunState) -> bool {
    use RunState::*;

    // Any non-terminal state can fail.
    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Generating, Executing)
            | (Executing, Succeeded)
            | (Executing, Escalating)
            | (Executing, Repairing)
            | (Escalating, Succeeded)
            | (Escalating, Repairing)
            | (Repairing, Executing)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RunState,
    pub to: RunState,
    /// Attempt ordinal at the time of transition (1 or 2).
    pub attempt: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal run transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The run state machine.
pub struct RunStateMachine {
    current: RunState,
    attempt: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            current: RunState::Generating,
            attempt: 1,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    /// Attempt to advance to the next state.
    pub fn advance(&mut self, to: RunState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            attempt = self.attempt,
            "Run transition"
        );
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            attempt: self.attempt,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed`, legal from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(RunState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_generating() {
        let sm = RunStateMachine::new();
        assert_eq!(sm.current(), RunState::Generating);
        assert!(!sm.is_terminal());
        assert_eq!(sm.attempt(), 1);
    }

    #[test]
    fn happy_path() {
        let mut sm = RunStateMachine::new();
        sm.advance(RunState::Executing, None).unwrap();
        sm.advance(RunState::Succeeded, Some("exit 0")).unwrap();
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 2);
    }

    #[test]
    fn escalation_then_repair_then_success() {
        let mut sm = RunStateMachine::new();
        sm.advance(RunState::Executing, None).unwrap();
        sm.advance(RunState::Escalating, Some("permission denied"))
            .unwrap();
        sm.advance(RunState::Repairing, Some("elevated retry failed"))
            .unwrap();
        sm.set_attempt(2);
        sm.advance(RunState::Executing, None).unwrap();
        sm.advance(RunState::Succeeded, None).unwrap();
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions()[3].attempt, 2);
    }

    #[test]
    fn failure_is_legal_from_all_non_terminal_states() {
        for state in [
            RunState::Generating,
            RunState::Executing,
            RunState::Escalating,
            RunState::Repairing,
        ] {
            let mut sm = RunStateMachine {
                current: state,
                attempt: 1,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.fail("boom").is_ok());
            assert!(sm.is_terminal());
        }
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut sm = RunStateMachine::new();
        sm.advance(RunState::Executing, None).unwrap();
        sm.advance(RunState::Succeeded, None).unwrap();
        let err = sm.advance(RunState::Repairing, None).unwrap_err();
        assert_eq!(err.from, RunState::Succeeded);
        assert!(sm.fail("nope").is_err());
    }

    #[test]
    fn cannot_skip_generation() {
        let mut sm = RunStateMachine::new();
        assert!(sm.advance(RunState::Escalating, None).is_err());
        assert!(sm.advance(RunState::Repairing, None).is_err());
    }

    #[test]
    fn record_carries_reason() {
        let mut sm = RunStateMachine::new();
        sm.advance(RunState::Executing, Some("first attempt"))
            .unwrap();
        assert_eq!(
            sm.transitions()[0].reason.as_deref(),
            Some("first attempt")
        );
    }
}
