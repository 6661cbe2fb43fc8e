//! Tool provider client for the helpdesk service.
//!
//! Talks to an MCP server launched as a subprocess: JSON-RPC 2.0 over
//! newline-delimited stdio, an initialize handshake under a timeout,
//! tool catalog discovery, and tool invocation. One client serves
//! exactly one orchestrated request and is closed when that request
//! finishes, on every exit path.

pub mod client;
pub mod protocol;

use async_trait::async_trait;

use helpdesk_ai::ToolDescriptor;
use helpdesk_config::McpSettings;

pub use client::McpClient;

/// Returned when a tool call succeeds but carries no textual content.
pub const NO_TOOL_RESULT: &str = "No result returned from MCP tool.";

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("failed to launch tool provider: {0}")]
    Spawn(String),

    #[error("tool provider handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// An error object returned by the provider itself.
    #[error("{0}")]
    Provider(String),
}

/// A connected tool provider.
///
/// `close` consumes the provider, so a caller cannot release the same
/// connection twice.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError>;

    /// Invoke a named tool. Failures are absorbed into the returned text
    /// so the conversation can still produce an answer.
    async fn call_tool(&self, name: &str, args: &serde_json::Value) -> String;

    async fn close(self);
}

/// Creates one provider connection per orchestrated request.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    type Provider: ToolProvider + Send;

    async fn connect(&self) -> Result<Self::Provider, McpError>;
}

/// Factory spawning the configured MCP server command.
pub struct McpFactory {
    settings: McpSettings,
}

impl McpFactory {
    pub fn new(settings: McpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderFactory for McpFactory {
    type Provider = McpClient;

    async fn connect(&self) -> Result<McpClient, McpError> {
        McpClient::connect(
            &self.settings.command,
            &self.settings.args,
            self.settings.timeout,
        )
        .await
    }
}
