//! Model gateway for the helpdesk service.
//!
//! Provides the `AiClient` trait, the Gemini implementation, and the
//! translation from provider tool catalogs into the model's
//! function-calling format.

pub mod gemini;
pub mod tools;

use async_trait::async_trait;

pub use gemini::{GeminiClient, GeminiConfig};
pub use tools::to_model_tool;

#[async_trait]
pub trait AiClient: Send + Sync {
    /// One generation call over a conversation transcript.
    ///
    /// `tools` may be empty, in which case the request carries no tool
    /// configuration at all. `system_instruction` falls back to the
    /// client's configured default when `None`.
    async fn generate(
        &self,
        transcript: &[Turn],
        tools: &[AiTool],
        system_instruction: Option<&str>,
    ) -> Result<GenerationOutcome, AiError>;
}

/// One utterance in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A tool as published by the provider's catalog.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
}

/// A tool in the model's function-declaration format.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AiTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A model-proposed invocation of a named tool.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// What one generation call resolved to.
///
/// Function calls take precedence over text when the model returns both;
/// the rule is applied once, in `from_parts`, so callers match on the
/// variant instead of re-checking optional fields.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    FunctionCalls(Vec<FunctionCall>),
    Text(String),
    Empty,
}

impl GenerationOutcome {
    pub fn from_parts(text: String, function_calls: Vec<FunctionCall>) -> Self {
        if !function_calls.is_empty() {
            Self::FunctionCalls(function_calls)
        } else if !text.is_empty() {
            Self::Text(text)
        } else {
            Self::Empty
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}
