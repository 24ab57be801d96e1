//! Key-name normalization for CDP key events
//!
//! Oracles spell keys loosely ("enter", "ESC", "cmd"). CDP wants the DOM
//! `key` names ("Enter", "Escape", "Meta").

use headless_chrome::browser::tab::ModifierKey;
use pilot_core::{PilotError, Result};

/// Modifier held down during a hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Alt,
    Ctrl,
    Meta,
    Shift,
}

impl Modifier {
    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "alt" | "option" | "opt" => Some(Modifier::Alt),
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "meta" | "cmd" | "command" | "super" | "win" => Some(Modifier::Meta),
            "shift" => Some(Modifier::Shift),
            _ => None,
        }
    }

    pub fn to_cdp(self) -> ModifierKey {
        match self {
            Modifier::Alt => ModifierKey::Alt,
            Modifier::Ctrl => ModifierKey::Ctrl,
            Modifier::Meta => ModifierKey::Meta,
            Modifier::Shift => ModifierKey::Shift,
        }
    }
}

/// Map a loose key name to its DOM `key` value
pub fn normalize_key(name: &str) -> String {
    let trimmed = name.trim();
    let named = match trimmed.to_ascii_lowercase().as_str() {
        "enter" | "return" => "Enter",
        "tab" => "Tab",
        "esc" | "escape" => "Escape",
        "backspace" => "Backspace",
        "delete" | "del" => "Delete",
        "space" | "spacebar" => " ",
        "up" | "arrowup" => "ArrowUp",
        "down" | "arrowdown" => "ArrowDown",
        "left" | "arrowleft" => "ArrowLeft",
        "right" | "arrowright" => "ArrowRight",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" => "PageUp",
        "pagedown" | "page_down" => "PageDown",
        _ => return trimmed.to_string(),
    };
    named.to_string()
}

/// Split a hotkey into held modifiers and the key that is pressed
///
/// The last non-modifier entry is the pressed key; `["ctrl", "shift", "t"]`
/// becomes `([Ctrl, Shift], "t")`.
pub fn split_hotkey(keys: &[String]) -> Result<(Vec<Modifier>, String)> {
    let mut modifiers = Vec::new();
    let mut pressed = None;

    for key in keys {
        match Modifier::parse(key) {
            Some(modifier) if !modifiers.contains(&modifier) => modifiers.push(modifier),
            Some(_) => {}
            None => pressed = Some(normalize_key(key)),
        }
    }

    match pressed {
        Some(key) => Ok((modifiers, key)),
        None => Err(PilotError::Execution(format!(
            "hotkey {:?} has no key besides modifiers",
            keys
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_named_keys() {
        assert_eq!(normalize_key("enter"), "Enter");
        assert_eq!(normalize_key(" ESC "), "Escape");
        assert_eq!(normalize_key("pagedown"), "PageDown");
        assert_eq!(normalize_key("space"), " ");
        assert_eq!(normalize_key("a"), "a");
        assert_eq!(normalize_key("F5"), "F5");
    }

    #[test]
    fn test_split_hotkey() {
        let (modifiers, key) = split_hotkey(&keys(&["ctrl", "Shift", "t"])).unwrap();
        assert_eq!(modifiers, vec![Modifier::Ctrl, Modifier::Shift]);
        assert_eq!(key, "t");

        let (modifiers, key) = split_hotkey(&keys(&["cmd", "cmd", "enter"])).unwrap();
        assert_eq!(modifiers, vec![Modifier::Meta]);
        assert_eq!(key, "Enter");
    }

    #[test]
    fn test_single_key_hotkey() {
        let (modifiers, key) = split_hotkey(&keys(&["escape"])).unwrap();
        assert!(modifiers.is_empty());
        assert_eq!(key, "Escape");
    }

    #[test]
    fn test_modifiers_only_is_rejected() {
        let err = split_hotkey(&keys(&["ctrl", "alt"])).unwrap_err();
        assert!(matches!(err, PilotError::Execution(_)));
    }
}
