//! Shape validation for parsed oracle actions
//!
//! The required-parameter table below must match what the performers in
//! `pilot-browser` (and any other `ActionPerformer`) accept. Borderline
//! payloads fail: nothing is coerced or guessed, since a wrong guess becomes a
//! real click or keystroke.

use pilot_core::{Action, ActionCommand, ActionKind, ValidationResult};
use serde_json::{Map, Value};

/// Primitive type a required parameter must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    /// Non-empty array of non-empty strings
    StringList,
}

impl ParamType {
    fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::StringList => "array of strings",
        }
    }
}

/// One required parameter of an action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
}

/// Parameters every action of `kind` must carry
pub fn required_parameters(kind: ActionKind) -> &'static [ParamSpec] {
    match kind {
        ActionKind::OpenApp => &[ParamSpec { name: "app_name", ty: ParamType::String }],
        ActionKind::Navigate => &[ParamSpec { name: "url", ty: ParamType::String }],
        ActionKind::TypeText => &[ParamSpec { name: "text", ty: ParamType::String }],
        ActionKind::PressKey => &[ParamSpec { name: "key", ty: ParamType::String }],
        ActionKind::Hotkey => &[ParamSpec { name: "keys", ty: ParamType::StringList }],
        ActionKind::Click => &[
            ParamSpec { name: "x", ty: ParamType::Number },
            ParamSpec { name: "y", ty: ParamType::Number },
        ],
        ActionKind::Scroll => &[ParamSpec { name: "amount", ty: ParamType::Number }],
        ActionKind::Wait => &[ParamSpec { name: "seconds", ty: ParamType::Number }],
        ActionKind::Done => &[],
    }
}

/// Validator for parsed action objects
///
/// Only the kinds the performer accepts are valid; everything else is
/// rejected so the oracle is re-asked instead of an action failing later.
#[derive(Debug, Clone)]
pub struct ActionValidator {
    kinds: Vec<ActionKind>,
}

impl Default for ActionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionValidator {
    /// Accept every known kind
    pub fn new() -> Self {
        Self::with_kinds(ActionKind::ALL.to_vec())
    }

    /// Accept only `kinds`; `done` is always accepted
    pub fn with_kinds(mut kinds: Vec<ActionKind>) -> Self {
        if !kinds.contains(&ActionKind::Done) {
            kinds.push(ActionKind::Done);
        }
        Self { kinds }
    }

    pub fn kinds(&self) -> &[ActionKind] {
        &self.kinds
    }

    /// Check `obj` against the action schema and build a typed [`Action`]
    ///
    /// Extra parameter keys are preserved on the action but not checked.
    pub fn validate_action(&self, obj: &Value) -> ValidationResult<Action> {
        match self.build(obj) {
            Ok(action) => ValidationResult::valid(action),
            Err(message) => ValidationResult::invalid(message),
        }
    }

    /// Render the supported kinds and their parameters for a prompt
    pub fn describe_actions(&self) -> String {
        let mut out = String::new();
        for &kind in &self.kinds {
            let params = required_parameters(kind);
            if params.is_empty() {
                out.push_str(&format!("- {}: no parameters\n", kind));
            } else {
                let rendered: Vec<String> = params
                    .iter()
                    .map(|p| format!("{} ({})", p.name, p.ty.name()))
                    .collect();
                out.push_str(&format!("- {}: {}\n", kind, rendered.join(", ")));
            }
        }
        out
    }

    fn build(&self, obj: &Value) -> Result<Action, String> {
        let map = obj
            .as_object()
            .ok_or_else(|| format!("action must be a JSON object, got {}", json_type(obj)))?;

        let kind = read_kind(map)?;
        if !self.kinds.contains(&kind) {
            return Err(format!("{} is not available in this session", kind));
        }

        let parameters = match map.get("parameters") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params.clone(),
            Some(other) => {
                return Err(format!(
                    "\"parameters\" must be an object, got {}",
                    json_type(other)
                ))
            }
        };

        let description = match map.get("description") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => {
                return Err(format!(
                    "\"description\" must be a string, got {}",
                    json_type(other)
                ))
            }
        };

        for spec in required_parameters(kind) {
            let value = parameters.get(spec.name).ok_or_else(|| {
                format!("{} requires parameter \"{}\" ({})", kind, spec.name, spec.ty.name())
            })?;
            check_type(kind, spec, value)?;
        }

        let command = build_command(kind, &parameters)?;
        Ok(Action::new(command, description, parameters))
    }
}

fn read_kind(map: &Map<String, Value>) -> Result<ActionKind, String> {
    let tag = match (map.get("kind"), map.get("action")) {
        (Some(kind), Some(action)) if kind != action => {
            return Err(format!(
                "conflicting discriminators: kind={} action={}",
                kind, action
            ))
        }
        (Some(tag), _) | (None, Some(tag)) => tag,
        (None, None) => return Err("missing discriminator field \"kind\"".to_string()),
    };

    let name = tag
        .as_str()
        .ok_or_else(|| format!("\"kind\" must be a string, got {}", json_type(tag)))?;
    if name.trim().is_empty() {
        return Err("\"kind\" is empty".to_string());
    }
    name.parse::<ActionKind>()
}

fn check_type(kind: ActionKind, spec: &ParamSpec, value: &Value) -> Result<(), String> {
    let ok = match spec.ty {
        ParamType::String => value.as_str().is_some_and(|s| !s.trim().is_empty()),
        ParamType::Number => value.is_number(),
        ParamType::StringList => value.as_array().is_some_and(|items| {
            !items.is_empty()
                && items
                    .iter()
                    .all(|item| item.as_str().is_some_and(|s| !s.trim().is_empty()))
        }),
    };

    if ok {
        Ok(())
    } else {
        Err(format!(
            "{} parameter \"{}\" must be a non-empty {}, got {}",
            kind,
            spec.name,
            spec.ty.name(),
            value
        ))
    }
}

fn build_command(kind: ActionKind, params: &Map<String, Value>) -> Result<ActionCommand, String> {
    // Types were checked against the table before this point
    let string = |name: &str| {
        params
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let number = |name: &str| params.get(name).and_then(Value::as_f64).unwrap_or_default();

    let command = match kind {
        ActionKind::OpenApp => ActionCommand::OpenApp {
            app_name: string("app_name"),
        },
        ActionKind::Navigate => ActionCommand::Navigate { url: string("url") },
        ActionKind::TypeText => ActionCommand::TypeText {
            text: string("text"),
        },
        ActionKind::PressKey => ActionCommand::PressKey { key: string("key") },
        ActionKind::Hotkey => ActionCommand::Hotkey {
            keys: params
                .get("keys")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        },
        ActionKind::Click => {
            let (x, y) = (number("x"), number("y"));
            if x < 0.0 || y < 0.0 {
                return Err(format!("click coordinates must be non-negative, got ({}, {})", x, y));
            }
            ActionCommand::Click { x, y }
        }
        ActionKind::Scroll => ActionCommand::Scroll {
            amount: number("amount"),
        },
        ActionKind::Wait => {
            let seconds = number("seconds");
            if seconds < 0.0 {
                return Err(format!("wait seconds must be non-negative, got {}", seconds));
            }
            ActionCommand::Wait { seconds }
        }
        ActionKind::Done => ActionCommand::Done,
    };
    Ok(command)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
