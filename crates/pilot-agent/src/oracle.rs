//! The decision oracle seam

use async_trait::async_trait;
use pilot_core::Result;

/// Everything the oracle sees for one decision
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    /// Rendered instructions, context, history and state description
    pub text: String,
    /// PNG screenshot of the current screen, if one was captured
    pub screenshot: Option<Vec<u8>>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            screenshot: None,
        }
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        if !png.is_empty() {
            self.screenshot = Some(png);
        }
        self
    }
}

/// Black-box decision maker consulted once per attempt
///
/// Implementations handle transport concerns only. They must not repair,
/// validate or retry on content; a reply that is garbage is still `Ok`.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn chat(&self, prompt: &Prompt, json_mode: bool) -> Result<String>;
}
