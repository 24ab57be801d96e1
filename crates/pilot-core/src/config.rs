//! Configuration management for Pilot
//!
//! Project-level settings live in `.pilot/config.toml`. Every key is optional;
//! anything missing falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// Directory holding Pilot's per-project files
pub const PILOT_DIR: &str = ".pilot";

/// Project-level Pilot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Decision loop bounds
    #[serde(default)]
    pub loop_defaults: LoopDefaults,

    /// Model selection
    #[serde(default)]
    pub models: ModelConfig,

    /// Browser collaborator settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Project context discovery
    #[serde(default)]
    pub context: ContextSettings,
}

/// Default bounds for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDefaults {
    /// Hard ceiling on decide/execute iterations
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// How many recent outcomes are rendered into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Total oracle attempts allowed to produce parseable JSON per decision
    #[serde(default = "default_json_retries")]
    pub json_retries: usize,

    /// Total attempts allowed to produce a well-formed action per decision
    #[serde(default = "default_action_retries")]
    pub action_retries: usize,

    /// Linear delay between content retries (attempt * this value)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on a single oracle call
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Wall-clock ceiling for the whole command
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: Option<u64>,
}

/// Model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model to use
    #[serde(default = "default_model")]
    pub default: String,

    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens per oracle response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Page to open before the first step
    #[serde(default)]
    pub start_url: Option<String>,
}

/// Where to look for the project context file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// File names checked in every directory while walking upward
    #[serde(default = "default_context_file_names")]
    pub file_names: Vec<String>,
}

// Default value providers
fn default_max_steps() -> usize {
    15
}

fn default_history_window() -> usize {
    10
}

fn default_json_retries() -> usize {
    3
}

fn default_action_retries() -> usize {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_oracle_timeout_secs() -> u64 {
    120
}

fn default_command_timeout_secs() -> Option<u64> {
    Some(600)
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    1024
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

fn default_context_file_names() -> Vec<String> {
    vec!["PILOT.md".to_string(), ".pilot/context.md".to_string()]
}

impl PilotConfig {
    /// Load configuration from `.pilot/config.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(PILOT_DIR).join("config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            crate::PilotError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Write default configuration to `.pilot/config.toml`
    pub fn write_default(project_root: &Path) -> Result<()> {
        let config_dir = project_root.join(PILOT_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            crate::PilotError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            loop_defaults: LoopDefaults::default(),
            models: ModelConfig::default(),
            browser: BrowserSettings::default(),
            context: ContextSettings::default(),
        }
    }
}

impl Default for LoopDefaults {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            history_window: default_history_window(),
            json_retries: default_json_retries(),
            action_retries: default_action_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            start_url: None,
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            file_names: default_context_file_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PilotConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, PilotConfig::default());
        assert_eq!(config.loop_defaults.max_steps, 15);
        assert_eq!(config.loop_defaults.json_retries, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = PilotConfig::from_toml(
            r#"
[loop_defaults]
max_steps = 4

[browser]
headless = false
start_url = "https://example.com"
"#,
        )
        .unwrap();

        assert_eq!(config.loop_defaults.max_steps, 4);
        assert_eq!(config.loop_defaults.history_window, 10);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.start_url.as_deref(), Some("https://example.com"));
        assert_eq!(config.models.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = PilotConfig::from_toml("loop_defaults = 3").unwrap_err();
        assert!(matches!(err, crate::PilotError::Config(_)));
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = TempDir::new().unwrap();
        PilotConfig::write_default(dir.path()).unwrap();
        assert!(dir.path().join(".pilot/config.toml").exists());

        let loaded = PilotConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, PilotConfig::default());
    }
}
