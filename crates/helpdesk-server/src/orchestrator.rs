//! Resolves one user turn into one answer.
//!
//! Two modes: a plain model call, and a tool-augmented call that spawns
//! a tool provider for the duration of the request, offers its catalog
//! to the model, and executes at most one proposed function call.

use std::sync::Arc;

use tracing::debug;

use helpdesk_ai::{to_model_tool, AiClient, AiError, GenerationOutcome, Turn};
use helpdesk_mcp::{McpError, ProviderFactory, ToolProvider};

use crate::session::SessionStore;

pub const NO_RESPONSE_FALLBACK: &str = "No response generated.";
pub const NO_FUNCTION_CALL_FALLBACK: &str = "No function call found in the response.";

#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("tool provider unavailable: {0}")]
    ProviderUnavailable(#[from] McpError),

    #[error(transparent)]
    Generation(#[from] AiError),
}

pub struct Orchestrator<F> {
    ai: Arc<dyn AiClient>,
    store: SessionStore,
    factory: F,
}

impl<F: ProviderFactory> Orchestrator<F> {
    pub fn new(ai: Arc<dyn AiClient>, store: SessionStore, factory: F) -> Self {
        Self { ai, store, factory }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Direct mode: answer from the model alone.
    pub async fn ask_model(
        &self,
        session_id: &str,
        message: &str,
        system_instruction: Option<&str>,
        history: Option<Vec<Turn>>,
    ) -> Result<String, AskError> {
        let (transcript, base_len) = self.seed_transcript(session_id, message, history).await;

        let outcome = match self.ai.generate(&transcript, &[], system_instruction).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.store.truncate(session_id, base_len).await;
                return Err(e.into());
            }
        };

        let answer = match outcome {
            GenerationOutcome::Text(text) => text,
            _ => NO_RESPONSE_FALLBACK.to_string(),
        };

        self.store
            .append(session_id, Turn::model(answer.clone()))
            .await;
        Ok(answer)
    }

    /// Tool-augmented mode: provider connection is scoped to this call
    /// and released on every exit path, including generation failure.
    pub async fn ask_mcp(
        &self,
        session_id: &str,
        message: &str,
        system_instruction: Option<&str>,
        history: Option<Vec<Turn>>,
    ) -> Result<String, AskError> {
        let provider = self.factory.connect().await?;
        let result = self
            .resolve_with_provider(&provider, session_id, message, system_instruction, history)
            .await;
        provider.close().await;
        result
    }

    async fn resolve_with_provider(
        &self,
        provider: &F::Provider,
        session_id: &str,
        message: &str,
        system_instruction: Option<&str>,
        history: Option<Vec<Turn>>,
    ) -> Result<String, AskError> {
        let catalog = provider.list_tools().await?;
        let tools: Vec<_> = catalog.iter().map(to_model_tool).collect();
        debug!(session_id, tools = tools.len(), "Resolving with tools");

        let (transcript, base_len) = self.seed_transcript(session_id, message, history).await;

        let outcome = match self
            .ai
            .generate(&transcript, &tools, system_instruction)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.store.truncate(session_id, base_len).await;
                return Err(e.into());
            }
        };

        let answer = match outcome {
            GenerationOutcome::FunctionCalls(calls) => match calls.first() {
                // One call per turn; any further proposals are dropped.
                Some(call) => provider.call_tool(&call.name, &call.args).await,
                None => NO_FUNCTION_CALL_FALLBACK.to_string(),
            },
            GenerationOutcome::Text(text) => text,
            GenerationOutcome::Empty => NO_FUNCTION_CALL_FALLBACK.to_string(),
        };

        self.store
            .append(session_id, Turn::model(answer.clone()))
            .await;
        Ok(answer)
    }

    /// Seed explicit history if supplied, append the user turn, and return
    /// the resulting transcript snapshot plus the length to roll back to
    /// should the request fail before an answer turn is appended.
    async fn seed_transcript(
        &self,
        session_id: &str,
        message: &str,
        history: Option<Vec<Turn>>,
    ) -> (Vec<Turn>, usize) {
        if let Some(history) = history {
            self.store.replace(session_id, history).await;
        }
        let base_len = self.store.len(session_id).await;
        self.store.append(session_id, Turn::user(message)).await;
        (self.store.get(session_id).await, base_len)
    }
}
