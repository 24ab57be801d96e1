//! Browser collaborator for the Pilot decision loop
//!
//! This crate drives Chrome/Chromium over the Chrome DevTools Protocol (CDP)
//! and plugs it into the loop as both collaborators:
//!
//! - **ScreenSource**: a PNG of the viewport plus URL, title and viewport size
//! - **ActionPerformer**: navigation, typing, key presses, hotkeys, clicks,
//!   scrolling and waits
//!
//! `open_app` has no browser equivalent and is reported as a failed action.
//!
//! # Example
//!
//! ```no_run
//! use pilot_browser::{BrowserConfig, BrowserSession};
//! use pilot_core::ScreenSource;
//!
//! #[tokio::main]
//! async fn main() -> pilot_core::Result<()> {
//!     let session = BrowserSession::launch_with_config(BrowserConfig::default()).await?;
//!     session.navigate("https://example.com").await?;
//!
//!     let screen = session.capture().await?;
//!     println!("{}", screen.description);
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium browser installed
//! - For connecting to existing browser: `chrome --remote-debugging-port=9222`

pub mod browser;
pub mod keys;
mod session;

// Re-export commonly used types
pub use browser::{normalize_url, BrowserConfig, BrowserSession};
pub use keys::{normalize_key, split_hotkey, Modifier};
pub use session::describe_page;
