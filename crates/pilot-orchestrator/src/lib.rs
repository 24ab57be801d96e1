//! # pilot-orchestrator
//!
//! The action-decision loop for Pilot.
//!
//! This crate provides:
//! - Project context discovery and prompt rendering
//! - A pure state machine for the decide/execute cycle
//! - `ActionDecisionLoop`, which asks the oracle for one action per step,
//!   validates it, executes it and folds the outcome back into history
//! - An activity log for auditing finished commands
//!
//! There is no separate verification call after an action. The next step's
//! screenshot shows the oracle what actually happened.

mod activity_logger;
mod cancel;
mod context;
mod loop_engine;
mod prompt;
mod state_machine;

pub use activity_logger::ActivityLogger;
pub use cancel::CancelFlag;
pub use context::{format_context_for_prompt, ProjectContext, ProjectContextLoader};
pub use loop_engine::{ActionDecisionLoop, LoopConfig, LoopReport};
pub use prompt::{build_step_prompt, render_history, StepPrompt};
pub use state_machine::{transition, Effect, Event, LoopState, StopReason};
