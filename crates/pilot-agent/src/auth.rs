//! Authentication for the Anthropic API
//!
//! Supports two authentication methods:
//! 1. OAuth token (CLAUDE_CODE_OAUTH_TOKEN) - subscription access
//! 2. API key from the configured environment variable (ANTHROPIC_API_KEY by default)

use pilot_core::{PilotError, Result};
use std::env;

/// Environment variable holding an OAuth token; always checked first
pub const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Get authentication token for the Anthropic API
///
/// Priority:
/// 1. `CLAUDE_CODE_OAUTH_TOKEN`
/// 2. the variable named by `api_key_env`
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Ok(oauth_token) = env::var(OAUTH_TOKEN_ENV) {
        if !oauth_token.trim().is_empty() {
            tracing::debug!("Using OAuth token from {}", OAUTH_TOKEN_ENV);
            return Ok(oauth_token);
        }
    }

    match env::var(api_key_env) {
        Ok(api_key) if !api_key.trim().is_empty() => {
            tracing::debug!("Using API key from {}", api_key_env);
            Ok(api_key)
        }
        _ => Err(PilotError::Auth(format!(
            "No authentication found. Set either {} or {}",
            OAUTH_TOKEN_ENV, api_key_env
        ))),
    }
}
