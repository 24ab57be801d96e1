//! # pilot-validation
//!
//! Turns free-text oracle output into something safe to execute.
//!
//! This crate provides:
//! - `ResponseValidator`: plausibility checks and a fixed JSON repair pipeline
//! - `ActionValidator`: the per-kind required-parameter table
//! - `RetryExecutor`: bounded re-asking with a caller-supplied fallback
//!
//! All three speak `ValidationResult`, so any validator can be plugged into
//! the retry executor.

mod action;
mod response;
mod retry;

pub use action::{required_parameters, ActionValidator, ParamSpec, ParamType};
pub use response::{repair_json, ResponseValidator, MIN_TEXT_LENGTH};
pub use retry::{Backoff, RetryExecutor};
