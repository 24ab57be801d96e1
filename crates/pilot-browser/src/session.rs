//! `ScreenSource` and `ActionPerformer` over a browser session

use crate::browser::{normalize_url, BrowserSession};
use crate::keys::{normalize_key, split_hotkey};
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use pilot_core::{
    Action, ActionCommand, ActionKind, ActionPerformer, PilotError, Result, ScreenSource,
    ScreenState,
};
use std::time::Duration;
use tracing::{debug, info};

/// Longest single `wait` honored
const MAX_WAIT_SECS: f64 = 60.0;

#[async_trait]
impl ScreenSource for BrowserSession {
    async fn capture(&self) -> Result<ScreenState> {
        let (png, url, title) = self
            .with_tab("capture", |tab| {
                let png = tab
                    .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                    .map_err(|e| PilotError::Capture(format!("CDP capture failed: {}", e)))?;
                let title = tab.get_title().unwrap_or_default();
                Ok((png, tab.get_url(), title))
            })
            .await?;

        debug!("Captured {} byte screenshot of {}", png.len(), url);

        let config = self.config();
        Ok(ScreenState::new(
            png,
            describe_page(&url, &title, config.window_width, config.window_height),
        ))
    }
}

#[async_trait]
impl ActionPerformer for BrowserSession {
    async fn perform(&self, action: &Action) -> Result<()> {
        info!("Performing {}", action.summary());

        match action.command().clone() {
            ActionCommand::OpenApp { app_name } => Err(PilotError::Execution(format!(
                "cannot open application '{}' from a browser session; use navigate instead",
                app_name
            ))),
            ActionCommand::Navigate { url } => self.navigate(&url).await,
            ActionCommand::TypeText { text } => {
                self.with_tab("type_text", move |tab| {
                    tab.type_str(&text)
                        .map_err(|e| PilotError::Execution(format!("Typing failed: {}", e)))?;
                    Ok(())
                })
                .await
            }
            ActionCommand::PressKey { key } => {
                let key = normalize_key(&key);
                self.with_tab("press_key", move |tab| {
                    tab.press_key(&key).map_err(|e| {
                        PilotError::Execution(format!("Key press '{}' failed: {}", key, e))
                    })?;
                    Ok(())
                })
                .await
            }
            ActionCommand::Hotkey { keys } => {
                let (modifiers, key) = split_hotkey(&keys)?;
                let modifiers: Vec<ModifierKey> =
                    modifiers.into_iter().map(|m| m.to_cdp()).collect();
                self.with_tab("hotkey", move |tab| {
                    tab.press_key_with_modifiers(&key, Some(modifiers.as_slice()))
                        .map_err(|e| {
                            PilotError::Execution(format!("Hotkey '{}' failed: {}", key, e))
                        })?;
                    Ok(())
                })
                .await
            }
            ActionCommand::Click { x, y } => {
                self.with_tab("click", move |tab| {
                    tab.click_point(Point { x, y }).map_err(|e| {
                        PilotError::Execution(format!("Click at ({}, {}) failed: {}", x, y, e))
                    })?;
                    Ok(())
                })
                .await
            }
            ActionCommand::Scroll { amount } => {
                self.evaluate_script(&scroll_script(amount)).await?;
                Ok(())
            }
            ActionCommand::Wait { seconds } => {
                tokio::time::sleep(wait_duration(seconds)).await;
                Ok(())
            }
            // Never executed by the loop
            ActionCommand::Done => Ok(()),
        }
    }

    fn supported_kinds(&self) -> Vec<ActionKind> {
        browser_kinds()
    }
}

/// Everything except launching native applications
fn browser_kinds() -> Vec<ActionKind> {
    ActionKind::ALL
        .into_iter()
        .filter(|kind| *kind != ActionKind::OpenApp)
        .collect()
}

/// Textual screen description handed to the oracle with the screenshot
pub fn describe_page(url: &str, title: &str, width: u32, height: u32) -> String {
    let url = if url.is_empty() { "about:blank" } else { url };
    let title = if title.trim().is_empty() {
        "(untitled)"
    } else {
        title.trim()
    };
    format!(
        "Browser page\nURL: {}\nTitle: {}\nViewport: {}x{} (click coordinates are CSS pixels from the top-left)",
        normalize_url(url),
        title,
        width,
        height
    )
}

/// Positive amounts scroll down, negative up (CSS pixels)
fn scroll_script(amount: f64) -> String {
    format!("window.scrollBy(0, {})", amount)
}

fn wait_duration(seconds: f64) -> Duration {
    if seconds.is_finite() {
        Duration::from_secs_f64(seconds.clamp(0.0, MAX_WAIT_SECS))
    } else {
        Duration::ZERO
    }
}
