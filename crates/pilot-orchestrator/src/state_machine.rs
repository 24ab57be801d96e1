//! Pure state machine for the decide/execute cycle
//!
//! This module has NO I/O. The loop engine feeds it events and performs the
//! effects it returns.
//!
//! - Pure function: transition(state, event) -> (state, effects)
//! - `Done` and `Aborted` are terminal
//! - Invalid transitions go to `Aborted` (never panic)

use pilot_core::ActionKind;
use serde::Serialize;
use std::fmt;

/// Decision loop state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    /// Waiting for the oracle to pick the next action
    AwaitingDecision,
    /// An action was decided and is being performed
    Executing { kind: ActionKind },
    /// The oracle signalled completion
    Done { summary: String },
    /// Stopped without completing
    Aborted { reason: StopReason, diagnostic: String },
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Done { .. } | LoopState::Aborted { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoopState::AwaitingDecision => "AWAITING_DECISION",
            LoopState::Executing { .. } => "EXECUTING",
            LoopState::Done { .. } => "DONE",
            LoopState::Aborted { .. } => "ABORTED",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a command stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Oracle returned `done`
    Completed,
    /// Step ceiling reached
    StepBudgetExhausted,
    /// No parseable JSON within the retry budget
    MalformedResponse,
    /// No well-formed action within the retry budget
    InvalidAction,
    /// Oracle transport, screen capture or other collaborator failure
    CollaboratorFailure,
    /// Cancel flag observed between steps
    Cancelled,
    /// Wall-clock ceiling reached
    TimedOut,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Completed => "completed",
            StopReason::StepBudgetExhausted => "step budget exhausted",
            StopReason::MalformedResponse => "malformed response",
            StopReason::InvalidAction => "invalid action",
            StopReason::CollaboratorFailure => "collaborator failure",
            StopReason::Cancelled => "cancelled",
            StopReason::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Events that drive transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A validated action came back from the oracle
    ActionDecided { kind: ActionKind, summary: String },
    /// The decided action was performed (or failed to perform)
    OutcomeRecorded { succeeded: bool },
    /// No usable decision could be obtained
    DecisionFailed {
        reason: StopReason,
        diagnostic: String,
    },
    /// Step ceiling reached before asking for another decision
    StepBudgetExhausted { max_steps: usize },
    /// Cancel flag observed
    Cancelled,
    /// Wall-clock ceiling reached
    DeadlineExceeded { limit_secs: u64 },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Perform the action that was just decided
    ExecuteAction,
    /// Log activity
    LogActivity { message: String },
}

fn log(message: String) -> Effect {
    Effect::LogActivity { message }
}

fn abort(reason: StopReason, diagnostic: String) -> (LoopState, Vec<Effect>) {
    let effects = vec![log(format!("Aborted ({}): {}", reason, diagnostic))];
    (LoopState::Aborted { reason, diagnostic }, effects)
}

/// Pure state transition function
///
/// Takes current state and event, returns new state and effects to perform.
/// Any invalid transition results in `Aborted` with a descriptive diagnostic.
pub fn transition(state: LoopState, event: Event) -> (LoopState, Vec<Effect>) {
    match (state, event) {
        (LoopState::AwaitingDecision, Event::ActionDecided { kind, summary }) => {
            if kind.is_terminal() {
                let effects = vec![log(format!("Oracle signalled completion: {}", summary))];
                (LoopState::Done { summary }, effects)
            } else {
                let effects = vec![
                    log(format!("Executing {}", summary)),
                    Effect::ExecuteAction,
                ];
                (LoopState::Executing { kind }, effects)
            }
        }

        (LoopState::Executing { kind }, Event::OutcomeRecorded { succeeded }) => {
            let message = if succeeded {
                format!("{} succeeded", kind)
            } else {
                format!("{} failed, asking for another decision", kind)
            };
            (LoopState::AwaitingDecision, vec![log(message)])
        }

        (LoopState::AwaitingDecision, Event::DecisionFailed { reason, diagnostic }) => {
            abort(reason, diagnostic)
        }

        (LoopState::AwaitingDecision, Event::StepBudgetExhausted { max_steps }) => abort(
            StopReason::StepBudgetExhausted,
            format!("step budget exhausted after {} steps", max_steps),
        ),

        (LoopState::AwaitingDecision, Event::Cancelled) => abort(
            StopReason::Cancelled,
            "command cancelled before the next decision".to_string(),
        ),

        (LoopState::AwaitingDecision, Event::DeadlineExceeded { limit_secs }) => abort(
            StopReason::TimedOut,
            format!("command exceeded its {}s wall-clock limit", limit_secs),
        ),

        // Terminal states accept nothing
        (state, event) => abort(
            StopReason::CollaboratorFailure,
            format!("invalid transition: {:?} received in {}", event, state),
        ),
    }
}
