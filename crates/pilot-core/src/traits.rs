//! Seams to the external collaborators driven by the decision loop
//!
//! The loop never touches a mouse, keyboard or browser directly. It goes
//! through these traits so tests can substitute scripted fakes.

use async_trait::async_trait;

use crate::types::{Action, ActionKind, ScreenState};
use crate::Result;

/// Captures the current state of the screen the oracle is steering
#[async_trait]
pub trait ScreenSource: Send + Sync {
    /// Capture a snapshot plus a short textual description of the system state
    async fn capture(&self) -> Result<ScreenState>;
}

/// Performs validated actions against the real machine or session
///
/// Implementations only ever receive actions that passed validation. An `Err`
/// means the action was attempted and failed; the loop records it as a failed
/// outcome and lets the oracle react on the next step.
#[async_trait]
pub trait ActionPerformer: Send + Sync {
    async fn perform(&self, action: &Action) -> Result<()>;

    /// Kinds this performer can carry out; only these are offered to the oracle
    fn supported_kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL.to_vec()
    }
}
