//! Settings schema for the helpdesk service.
//!
//! Each section has a `Default` matching the values the service shipped
//! with, so partial environments work correctly.

use std::str::FromStr;
use std::time::Duration;

use helpdesk_common::ConfigError;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a helpful customer support agent. Always be polite and concise.";

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Gemini model settings.
#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub default_system_instruction: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".into(),
            max_tokens: 4096,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            default_system_instruction: DEFAULT_SYSTEM_INSTRUCTION.into(),
        }
    }
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_k", &self.top_k)
            .field("top_p", &self.top_p)
            .finish()
    }
}

/// Tool provider (MCP server) settings.
#[derive(Debug, Clone)]
pub struct McpSettings {
    /// Command used to launch the provider subprocess.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Handshake and per-request timeout.
    pub timeout: Duration,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            command: "npx".into(),
            args: vec![
                "mcp-remote".into(),
                "https://poc-docs-mcp-server.daohoangson.workers.dev/sse".into(),
            ],
            timeout: Duration::from_millis(300_000),
        }
    }
}

/// Chat-history cache settings.
#[derive(Debug, Clone)]
pub struct HistorySettings {
    /// Time-to-live for cached chat sessions.
    pub ttl: Duration,
}

impl Default for HistorySettings {
    fn default() -> Self {
        // 7 days
        Self {
            ttl: Duration::from_secs(60 * 60 * 24 * 7),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub gemini: GeminiSettings,
    pub mcp: McpSettings,
    pub history: HistorySettings,
}

impl Settings {
    /// Build settings from a variable lookup function.
    ///
    /// Taking the lookup as a closure keeps tests independent of the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let mcp_args = match lookup("MCP_ARGS") {
            Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
            None => defaults.mcp.args,
        };

        Self {
            server: ServerSettings {
                port: parse_or("PORT", &lookup, defaults.server.port),
            },
            gemini: GeminiSettings {
                api_key: lookup("GEMINI_API_KEY").unwrap_or_default(),
                model: lookup("GEMINI_MODEL").unwrap_or(defaults.gemini.model),
                max_tokens: parse_or("GEMINI_MAX_TOKENS", &lookup, defaults.gemini.max_tokens),
                temperature: parse_or("GEMINI_TEMPERATURE", &lookup, defaults.gemini.temperature),
                top_k: parse_or("GEMINI_TOP_K", &lookup, defaults.gemini.top_k),
                top_p: parse_or("GEMINI_TOP_P", &lookup, defaults.gemini.top_p),
                default_system_instruction: lookup("GEMINI_DEFAULT_SYSTEM_INSTRUCTION")
                    .unwrap_or(defaults.gemini.default_system_instruction),
            },
            mcp: McpSettings {
                command: lookup("MCP_COMMAND").unwrap_or(defaults.mcp.command),
                args: mcp_args,
                timeout: Duration::from_millis(parse_or(
                    "MCP_TIMEOUT",
                    &lookup,
                    defaults.mcp.timeout.as_millis() as u64,
                )),
            },
            history: HistorySettings {
                ttl: Duration::from_secs(parse_or(
                    "HISTORY_TTL",
                    &lookup,
                    defaults.history.ttl.as_secs(),
                )),
            },
        }
    }

    /// Validate settings that the service cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "GEMINI_API_KEY is required".into(),
            ));
        }
        if self.mcp.command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "MCP_COMMAND must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr + Copy>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value for {key}: {raw:?}, using default");
                default
            }
        },
        None => default,
    }
}
