//! shellpilot — instruction-to-bash pipeline for WSL guests.
//!
//! Turns a natural-language instruction into a bash script via a
//! completion service, executes it inside the guest distro, and
//! recovers from two failure classes: permission failures get one
//! elevated retry of the same script, anything else gets one repaired
//! script. Every file a script touches is routed by the path resolver
//! into either the user-data destination or the per-run technical
//! artifacts directory.

pub mod completion;
pub mod config;
pub mod context;
pub mod escalate;
pub mod executor;
pub mod journal;
pub mod paths;
pub mod pipeline;
pub mod prompt;
pub mod shortcuts;
pub mod state_machine;
