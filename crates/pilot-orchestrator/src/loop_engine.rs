//! Loop Engine - one oracle decision per step until done or aborted
//!
//! Each step asks the oracle for a fresh decision with NO conversation
//! history. State comes from:
//! - A screenshot and description of the current screen
//! - The most recent action outcomes
//! - Project context, when a context file was found
//!
//! Every failure mode folds into the returned `LoopReport`; `run` never errors.

use crate::activity_logger::ActivityLogger;
use crate::cancel::CancelFlag;
use crate::context::{format_context_for_prompt, ProjectContext};
use crate::prompt::{build_step_prompt, StepPrompt};
use crate::state_machine::{transition, Effect, Event, LoopState, StopReason};
use pilot_agent::{Oracle, Prompt};
use pilot_core::config::LoopDefaults;
use pilot_core::{
    Action, ActionOutcome, ActionPerformer, DecisionHistory, PilotError, Result, ScreenSource,
    ValidationResult,
};
use pilot_validation::{ActionValidator, Backoff, ResponseValidator, RetryExecutor};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bounds for one command
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Decisions requested before the command is aborted
    pub max_steps: usize,
    /// Outcomes rendered into each prompt
    pub history_window: usize,
    /// Oracle attempts per decision to get parseable JSON
    pub json_retries: usize,
    /// Attempts per decision to get a well-formed action
    pub action_retries: usize,
    pub retry_backoff: Backoff,
    /// Upper bound on one oracle call; a timeout counts as an invalid reply
    pub oracle_timeout: Duration,
    /// Wall-clock ceiling checked before each step
    pub command_timeout: Option<Duration>,
}

impl From<&LoopDefaults> for LoopConfig {
    fn from(defaults: &LoopDefaults) -> Self {
        let retry_backoff = match defaults.retry_backoff_ms {
            0 => Backoff::None,
            ms => Backoff::Linear(Duration::from_millis(ms)),
        };
        Self {
            max_steps: defaults.max_steps,
            history_window: defaults.history_window,
            json_retries: defaults.json_retries,
            action_retries: defaults.action_retries,
            retry_backoff,
            oracle_timeout: Duration::from_secs(defaults.oracle_timeout_secs),
            command_timeout: defaults.command_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&LoopDefaults::default())
    }
}

/// Result of running one command
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub run_id: String,
    /// Command as given by the user
    pub command: String,
    /// Command after custom-command expansion
    pub goal: String,
    /// Terminal state (`Done` or `Aborted`)
    pub state: LoopState,
    pub stop_reason: StopReason,
    /// Every executed action and its outcome, in order
    pub history: DecisionHistory,
    /// Decisions requested from the oracle
    pub steps: usize,
    pub diagnostic: Option<String>,
    pub elapsed_ms: u64,
}

impl LoopReport {
    pub fn is_done(&self) -> bool {
        matches!(self.state, LoopState::Done { .. })
    }
}

/// A single oracle reply as seen by the JSON validator
enum OracleReply {
    Text(String),
    TimedOut,
}

/// Orchestrates decide/execute steps for a command
///
/// The loop holds no per-command state, so one instance can run several
/// commands (even concurrently) against the same collaborators.
pub struct ActionDecisionLoop {
    oracle: Arc<dyn Oracle>,
    screen: Arc<dyn ScreenSource>,
    performer: Arc<dyn ActionPerformer>,
    config: LoopConfig,
    context: Option<Arc<ProjectContext>>,
    context_block: String,
    response_validator: ResponseValidator,
    action_validator: ActionValidator,
    action_table: String,
    json_retry: RetryExecutor,
    action_retry: RetryExecutor,
    activity_logger: Option<ActivityLogger>,
}

impl ActionDecisionLoop {
    /// Create a new decision loop
    pub fn new(
        oracle: Arc<dyn Oracle>,
        screen: Arc<dyn ScreenSource>,
        performer: Arc<dyn ActionPerformer>,
        config: LoopConfig,
    ) -> Self {
        let action_validator = ActionValidator::with_kinds(performer.supported_kinds());
        let action_table = action_validator.describe_actions();
        Self {
            oracle,
            screen,
            performer,
            json_retry: RetryExecutor::new(config.retry_backoff).with_label("json"),
            action_retry: RetryExecutor::new(config.retry_backoff).with_label("action"),
            config,
            context: None,
            context_block: String::new(),
            response_validator: ResponseValidator::default(),
            action_validator,
            action_table,
            activity_logger: None,
        }
    }

    /// Inject project context into every prompt
    pub fn with_project_context(mut self, context: Option<Arc<ProjectContext>>) -> Self {
        self.context_block = format_context_for_prompt(context.as_deref());
        self.context = context;
        self
    }

    /// Enable activity logging to `<pilot_dir>/activity.md`
    pub fn with_activity_logging(mut self, pilot_dir: PathBuf) -> Self {
        self.activity_logger = Some(ActivityLogger::new(pilot_dir));
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Expand a custom command trigger, or return the command unchanged
    pub fn resolve_goal(&self, command: &str) -> String {
        self.context
            .as_deref()
            .and_then(|context| context.resolve_command(command))
            .unwrap_or(command)
            .trim()
            .to_string()
    }

    /// Run a command that cannot be cancelled
    pub async fn run(&self, command: &str) -> LoopReport {
        self.run_with_cancel(command, &CancelFlag::new()).await
    }

    /// Run a command until the oracle says done or the loop aborts
    ///
    /// Each step:
    /// 1. Checks the cancel flag, the wall-clock limit and the step ceiling
    /// 2. Captures the screen and renders the prompt
    /// 3. Asks the oracle for JSON, repairing and retrying within budget
    /// 4. Validates the action, retrying within budget
    /// 5. Stops on `done`, otherwise executes and records the outcome
    pub async fn run_with_cancel(&self, command: &str, cancel: &CancelFlag) -> LoopReport {
        let run_id = Uuid::new_v4().to_string()[..8].to_string();
        let goal = self.resolve_goal(command);
        let started = Instant::now();

        info!("[{}] Starting command: {}", run_id, command);
        if goal != command.trim() {
            info!("[{}] Custom command expands to: {}", run_id, goal);
        }

        if let Some(logger) = &self.activity_logger {
            logger
                .log_command_start(&run_id, command, &goal, self.config.max_steps)
                .await;
        }

        let mut history = DecisionHistory::new();
        let mut state = LoopState::AwaitingDecision;
        let mut pending: Option<Action> = None;
        let mut steps: usize = 0;

        while !state.is_terminal() {
            let mut event = match self.guard_event(steps, started, cancel) {
                Some(event) => event,
                None => {
                    steps += 1;
                    self.decision_event(&goal, &history, steps, &mut pending)
                        .await
                }
            };

            // Feed events until the machine stops asking for work
            loop {
                let (next, effects) = transition(state, event);
                state = next;

                let mut follow_up = None;
                for effect in effects {
                    match effect {
                        Effect::LogActivity { message } => info!("[{}] {}", run_id, message),
                        Effect::ExecuteAction => {
                            if let Some(action) = pending.take() {
                                let outcome = self.execute(action, steps).await;
                                if let Some(logger) = &self.activity_logger {
                                    logger.log_step(&outcome).await;
                                }
                                follow_up = Some(Event::OutcomeRecorded {
                                    succeeded: outcome.succeeded,
                                });
                                history.record(outcome);
                            }
                        }
                    }
                }

                match follow_up {
                    Some(next_event) => event = next_event,
                    None => break,
                }
            }
        }

        let (stop_reason, diagnostic) = match &state {
            LoopState::Done { .. } => (StopReason::Completed, None),
            LoopState::Aborted { reason, diagnostic } => (*reason, Some(diagnostic.clone())),
            other => (
                StopReason::CollaboratorFailure,
                Some(format!("loop stopped in non-terminal state {}", other)),
            ),
        };

        let report = LoopReport {
            run_id,
            command: command.to_string(),
            goal,
            state,
            stop_reason,
            history,
            steps,
            diagnostic,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        match &report.diagnostic {
            None => info!(
                "[{}] Command finished: {} after {} steps",
                report.run_id, report.state, report.steps
            ),
            Some(diagnostic) => warn!(
                "[{}] Command finished: {} after {} steps ({})",
                report.run_id, report.state, report.steps, diagnostic
            ),
        }

        if let Some(logger) = &self.activity_logger {
            logger.log_command_complete(&report).await;
        }

        report
    }

    /// Stop conditions checked at the top of every step
    fn guard_event(&self, steps: usize, started: Instant, cancel: &CancelFlag) -> Option<Event> {
        if cancel.is_cancelled() {
            return Some(Event::Cancelled);
        }

        if let Some(limit) = self.config.command_timeout {
            if started.elapsed() >= limit {
                return Some(Event::DeadlineExceeded {
                    limit_secs: limit.as_secs(),
                });
            }
        }

        if steps >= self.config.max_steps {
            return Some(Event::StepBudgetExhausted {
                max_steps: self.config.max_steps,
            });
        }

        None
    }

    async fn decision_event(
        &self,
        goal: &str,
        history: &DecisionHistory,
        step: usize,
        pending: &mut Option<Action>,
    ) -> Event {
        info!("=== Step {} of {} ===", step, self.config.max_steps);

        match self.decide(goal, history, step).await {
            Ok(action) => {
                let summary = if action.is_done() {
                    action.description().unwrap_or("task complete").to_string()
                } else {
                    action.summary()
                };
                let event = Event::ActionDecided {
                    kind: action.kind(),
                    summary,
                };
                *pending = Some(action);
                event
            }
            Err(e) => {
                error!("Step {}: no usable decision: {}", step, e);
                Event::DecisionFailed {
                    reason: stop_reason_for(&e),
                    diagnostic: e.to_string(),
                }
            }
        }
    }

    /// Capture the screen and obtain one validated action
    async fn decide(&self, goal: &str, history: &DecisionHistory, step: usize) -> Result<Action> {
        let screen = self.screen.capture().await?;

        let text = build_step_prompt(&StepPrompt {
            goal,
            step,
            max_steps: self.config.max_steps,
            context_block: &self.context_block,
            history,
            history_window: self.config.history_window,
            screen: &screen,
            action_table: &self.action_table,
        });
        let prompt = Prompt::text(text).with_screenshot(screen.image_png);

        let mut last_error: Option<String> = None;
        let action = self
            .action_retry
            .try_execute_with_retry(
                || self.request_json(&prompt),
                |value: Value| {
                    let verdict = self.action_validator.validate_action(&value);
                    if let Some(reason) = verdict.error_message() {
                        last_error = Some(reason.to_string());
                    }
                    verdict.map(Some)
                },
                self.config.action_retries,
                None,
            )
            .await?;

        action.ok_or_else(|| {
            PilotError::InvalidAction(format!(
                "no valid action after {} attempts (last error: {})",
                self.config.action_retries.max(1),
                last_error.unwrap_or_default()
            ))
        })
    }

    /// Ask the oracle until its reply parses as JSON
    async fn request_json(&self, prompt: &Prompt) -> Result<Value> {
        let mut last_error: Option<String> = None;
        let value = self
            .json_retry
            .try_execute_with_retry(
                || self.ask_oracle(prompt),
                |reply: OracleReply| {
                    let verdict = match reply {
                        OracleReply::Text(raw) => self.response_validator.validate_json(&raw),
                        OracleReply::TimedOut => ValidationResult::invalid(format!(
                            "oracle call timed out after {}s",
                            self.config.oracle_timeout.as_secs()
                        )),
                    };
                    if let Some(reason) = verdict.error_message() {
                        last_error = Some(reason.to_string());
                    }
                    verdict.map(Some)
                },
                self.config.json_retries,
                None,
            )
            .await?;

        value.ok_or_else(|| {
            PilotError::MalformedResponse(format!(
                "no parseable JSON after {} attempts (last error: {})",
                self.config.json_retries.max(1),
                last_error.unwrap_or_default()
            ))
        })
    }

    async fn ask_oracle(&self, prompt: &Prompt) -> Result<OracleReply> {
        match tokio::time::timeout(self.config.oracle_timeout, self.oracle.chat(prompt, true)).await
        {
            Ok(Ok(raw)) => {
                debug!("Oracle replied with {} chars", raw.len());
                Ok(OracleReply::Text(raw))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    "Oracle call exceeded {}s",
                    self.config.oracle_timeout.as_secs()
                );
                Ok(OracleReply::TimedOut)
            }
        }
    }

    /// Perform an action; failures become outcomes, never errors
    async fn execute(&self, action: Action, step: usize) -> ActionOutcome {
        match self.performer.perform(&action).await {
            Ok(()) => {
                debug!("Step {}: {} performed", step, action.kind());
                ActionOutcome::success(action, step)
            }
            Err(e) => {
                warn!("Step {}: {} failed: {}", step, action.kind(), e);
                ActionOutcome::failure(action, step, e.to_string())
            }
        }
    }
}

fn stop_reason_for(error: &PilotError) -> StopReason {
    match error {
        PilotError::MalformedResponse(_) => StopReason::MalformedResponse,
        PilotError::InvalidAction(_) => StopReason::InvalidAction,
        _ => StopReason::CollaboratorFailure,
    }
}
