//! # pilot-agent
//!
//! The decision oracle seam and its Anthropic implementation.
//!
//! The oracle is deliberately dumb: `chat(prompt, json_mode) -> text`. It
//! retries transport problems (rate limits, 5xx) but knows nothing about
//! JSON repair or action shapes. Content-level validation and retry live in
//! `pilot-validation` and the decision loop.

mod auth;
mod circuit_breaker;
mod client;
mod oracle;
mod types;

pub use auth::get_auth_token;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::AnthropicOracle;
pub use oracle::{Oracle, Prompt};
pub use types::*;
