//! # pilot-core
//!
//! Core types for the Pilot action-decision loop.
//!
//! Pilot drives a desktop or browser session one step at a time. Each step a
//! language model (the oracle) looks at the current screen and the history of
//! what has already been tried, and answers with exactly one structured action.
//!
//! ## Core Paradigm
//!
//! - An action is either valid-and-executable or rejected before execution
//! - History is append-only and scoped to one command
//! - Execution failures are data for the next prompt, never retried blindly
//! - Project context is read once and shared read-only

pub mod config;
mod error;
pub mod fail_open;
mod traits;
mod types;

pub use config::PilotConfig;
pub use error::{PilotError, Result};
pub use traits::{ActionPerformer, ScreenSource};
pub use types::*;
