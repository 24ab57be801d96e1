//! Core type definitions for the Pilot decision loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of action kinds understood by this version of Pilot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    OpenApp,
    Navigate,
    TypeText,
    PressKey,
    Hotkey,
    Click,
    Scroll,
    Wait,
    Done,
}

impl ActionKind {
    /// Every supported kind, in the order they are listed to the oracle
    pub const ALL: [ActionKind; 9] = [
        ActionKind::OpenApp,
        ActionKind::Navigate,
        ActionKind::TypeText,
        ActionKind::PressKey,
        ActionKind::Hotkey,
        ActionKind::Click,
        ActionKind::Scroll,
        ActionKind::Wait,
        ActionKind::Done,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::OpenApp => "open_app",
            ActionKind::Navigate => "navigate",
            ActionKind::TypeText => "type_text",
            ActionKind::PressKey => "press_key",
            ActionKind::Hotkey => "hotkey",
            ActionKind::Click => "click",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::Done => "done",
        }
    }

    /// Whether this kind ends the command instead of being executed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionKind::Done)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    /// Accepts the snake_case wire name or its kebab-case spelling.
    /// Anything else, including different casing, is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unsupported action kind: {:?}", s))
    }
}

/// Typed payload of a validated action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionCommand {
    OpenApp { app_name: String },
    Navigate { url: String },
    TypeText { text: String },
    PressKey { key: String },
    Hotkey { keys: Vec<String> },
    Click { x: f64, y: f64 },
    Scroll { amount: f64 },
    Wait { seconds: f64 },
    Done,
}

impl ActionCommand {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionCommand::OpenApp { .. } => ActionKind::OpenApp,
            ActionCommand::Navigate { .. } => ActionKind::Navigate,
            ActionCommand::TypeText { .. } => ActionKind::TypeText,
            ActionCommand::PressKey { .. } => ActionKind::PressKey,
            ActionCommand::Hotkey { .. } => ActionKind::Hotkey,
            ActionCommand::Click { .. } => ActionKind::Click,
            ActionCommand::Scroll { .. } => ActionKind::Scroll,
            ActionCommand::Wait { .. } => ActionKind::Wait,
            ActionCommand::Done => ActionKind::Done,
        }
    }
}

/// A single validated, executable step
///
/// Only the action validator builds these, so holding an `Action` means the
/// payload already matched the parameter table for its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    /// Original parameter bag, including keys no kind requires
    parameters: Map<String, Value>,
    #[serde(skip)]
    command: ActionCommand,
}

impl Action {
    pub fn new(
        command: ActionCommand,
        description: Option<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            kind: command.kind(),
            description,
            parameters,
            command,
        }
    }

    /// The terminal `done` action with no parameters
    pub fn done(description: impl Into<String>) -> Self {
        Self::new(ActionCommand::Done, Some(description.into()), Map::new())
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn command(&self) -> &ActionCommand {
        &self.command
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn is_done(&self) -> bool {
        self.kind.is_terminal()
    }

    /// One-line rendering for logs and prompts
    pub fn summary(&self) -> String {
        let params = Value::Object(self.parameters.clone());
        match &self.description {
            Some(desc) => format!("{} {} ({})", self.kind, params, desc),
            None => format!("{} {}", self.kind, params),
        }
    }
}

/// Recorded result of attempting one action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub action: Action,
    /// Logical step index, starting at 1
    pub attempted_at: usize,
    pub succeeded: bool,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn success(action: Action, attempted_at: usize) -> Self {
        Self {
            action,
            attempted_at,
            succeeded: true,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(action: Action, attempted_at: usize, error: impl Into<String>) -> Self {
        Self {
            action,
            attempted_at,
            succeeded: false,
            error: Some(error.into()),
            recorded_at: Utc::now(),
        }
    }
}

/// Ordered, append-only record of outcomes for one command
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionHistory {
    outcomes: Vec<ActionOutcome>,
}

impl DecisionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome. Recorded outcomes are never edited.
    pub fn record(&mut self, outcome: ActionOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    /// The most recent `n` outcomes, oldest first
    pub fn recent(&self, n: usize) -> &[ActionOutcome] {
        let start = self.outcomes.len().saturating_sub(n);
        &self.outcomes[start..]
    }

    pub fn last(&self) -> Option<&ActionOutcome> {
        self.outcomes.last()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }
}

/// Verdict shared by every validator so retry logic can treat them alike
///
/// `value` is present exactly when the result is valid, and `error_message`
/// exactly when it is not.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult<T> {
    is_valid: bool,
    value: Option<T>,
    error_message: Option<String>,
}

impl<T> ValidationResult<T> {
    pub fn valid(value: T) -> Self {
        Self {
            is_valid: true,
            value: Some(value),
            error_message: None,
        }
    }

    pub fn invalid(error_message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            value: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Transform the carried value, keeping an invalid verdict untouched
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValidationResult<U> {
        ValidationResult {
            is_valid: self.is_valid,
            value: self.value.map(f),
            error_message: self.error_message,
        }
    }

    pub fn into_result(self) -> std::result::Result<T, String> {
        match self.value {
            Some(value) if self.is_valid => Ok(value),
            _ => Err(self
                .error_message
                .unwrap_or_else(|| "invalid".to_string())),
        }
    }
}

/// Snapshot handed to the oracle each step
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    /// PNG bytes; empty when the source has no visual channel
    pub image_png: Vec<u8>,
    /// Textual description of the system state (window title, URL, ...)
    pub description: String,
}

impl ScreenState {
    pub fn new(image_png: Vec<u8>, description: impl Into<String>) -> Self {
        Self {
            image_png,
            description: description.into(),
        }
    }

    pub fn has_image(&self) -> bool {
        !self.image_png.is_empty()
    }
}
