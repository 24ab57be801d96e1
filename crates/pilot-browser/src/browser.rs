//! Browser lifecycle management using Chrome DevTools Protocol
//!
//! `headless_chrome` is a blocking client. Every CDP call runs on tokio's
//! blocking pool so the decision loop's timers keep running.

use headless_chrome::{Browser, LaunchOptions, Tab};
use pilot_core::config::BrowserSettings;
use pilot_core::{PilotError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for browser launch
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Page opened right after launch
    pub start_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self::from(&BrowserSettings::default())
    }
}

impl From<&BrowserSettings> for BrowserConfig {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            window_width: settings.window_width,
            window_height: settings.window_height,
            start_url: settings.start_url.clone(),
        }
    }
}

/// Active browser session with Chrome DevTools Protocol
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    /// Current active tab
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch a new browser instance with default settings
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(BrowserConfig::default()).await
    }

    /// Launch browser with custom configuration
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .build()
            .map_err(|e| PilotError::Browser(format!("Invalid launch options: {}", e)))?;

        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let browser = Browser::new(launch_options)
                .map_err(|e| PilotError::Browser(format!("Failed to launch browser: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| PilotError::Browser(format!("Failed to create tab: {}", e)))?;
            Ok::<_, PilotError>((browser, tab))
        })
        .await
        .map_err(|e| PilotError::Browser(format!("Browser launch task failed: {}", e)))??;

        info!("Browser launched successfully");

        let session = Self {
            browser,
            tab,
            config,
        };
        if let Some(url) = session.config.start_url.clone() {
            session.navigate(&url).await?;
        }
        Ok(session)
    }

    /// Connect to an existing browser instance
    ///
    /// # Arguments
    /// * `port` - Chrome DevTools Protocol port (typically 9222)
    pub async fn connect(port: u16, config: BrowserConfig) -> Result<Self> {
        info!("Connecting to existing browser on port {}", port);

        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let browser = Browser::connect(format!("http://127.0.0.1:{}", port)).map_err(|e| {
                PilotError::Browser(format!("Failed to connect to browser: {}", e))
            })?;
            let tab = browser
                .new_tab()
                .map_err(|e| PilotError::Browser(format!("Failed to create tab: {}", e)))?;
            Ok::<_, PilotError>((browser, tab))
        })
        .await
        .map_err(|e| PilotError::Browser(format!("Browser connect task failed: {}", e)))??;

        info!("Connected to browser successfully");

        Ok(Self {
            browser,
            tab,
            config,
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Get reference to the active tab
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Run a blocking CDP call against the active tab
    pub(crate) async fn with_tab<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| PilotError::Browser(format!("{} task failed: {}", operation, e)))?
    }

    /// Navigate to a URL and wait for the load to finish
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let url = normalize_url(url);
        debug!("Navigating to {}", url);

        self.with_tab("navigate", move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| PilotError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;
            tab.wait_until_navigated()
                .map_err(|e| PilotError::Browser(format!("Navigation timeout for {}: {}", url, e)))?;
            info!("Successfully navigated to {}", url);
            Ok(())
        })
        .await
    }

    /// Execute JavaScript in the page context
    pub async fn evaluate_script(&self, script: &str) -> Result<serde_json::Value> {
        debug!("Evaluating JavaScript: {}", script);
        let script = script.to_string();

        self.with_tab("evaluate", move |tab| {
            let result = tab
                .evaluate(&script, false)
                .map_err(|e| PilotError::Browser(format!("JavaScript evaluation failed: {}", e)))?;
            Ok(result.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }

    /// Get the current page title
    pub async fn get_title(&self) -> Result<String> {
        self.with_tab("get_title", |tab| {
            tab.get_title()
                .map_err(|e| PilotError::Browser(format!("Failed to read title: {}", e)))
        })
        .await
    }

    /// Get the current URL
    pub async fn get_url(&self) -> Result<String> {
        self.with_tab("get_url", |tab| Ok(tab.get_url())).await
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}

/// Add `https://` when the oracle gives a bare host
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("://") || trimmed.starts_with("about:") || trimmed.starts_with("data:") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}
