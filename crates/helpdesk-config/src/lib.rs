//! Helpdesk configuration system.
//!
//! Settings are read from environment variables with sensible defaults,
//! so an empty environment (plus a `GEMINI_API_KEY`) works out of the box.
//! Numeric variables that fail to parse fall back to their defaults with
//! a warning rather than aborting startup.

pub mod schema;

pub use schema::{GeminiSettings, HistorySettings, McpSettings, ServerSettings, Settings};

use helpdesk_common::ConfigError;

/// Load settings from the process environment and validate them.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let settings = Settings::from_lookup(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}
