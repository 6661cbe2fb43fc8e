//! HTTP surface: ask endpoints, chat-history management, health.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use helpdesk_ai::{AiClient, GenerationOutcome, Role, Turn};
use helpdesk_common::SessionId;
use helpdesk_mcp::McpFactory;

use crate::history::{ChatConfig, ChatSessionRecord, HistoryError, HistoryService};
use crate::orchestrator::{AskError, Orchestrator};

const TITLE_SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant that creates concise, \
     descriptive chat titles. Focus on the main subject/question. Use clear, descriptive \
     language. Do not use quotes in your response.";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<McpFactory>>,
    pub history: HistoryService,
    pub ai: Arc<dyn AiClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp/ask/gemini", post(ask_gemini))
        .route("/mcp/ask/mcp", post(ask_mcp))
        .route(
            "/chat-history/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/chat-history/sessions/:session_id",
            get(get_session).delete(delete_session),
        )
        .route("/chat-history/sessions/:session_id/messages", post(add_message))
        .route("/chat-history/sessions/:session_id/title", put(update_title))
        .route("/chat-history/generate-title", post(generate_title))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), "{self}");
        }
        let body = serde_json::json!({
            "statusCode": status.as_u16(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<AskError> for ApiError {
    fn from(err: AskError) -> Self {
        match err {
            AskError::ProviderUnavailable(e) => ApiError::BadGateway(e.to_string()),
            AskError::Generation(e) => ApiError::BadGateway(e.to_string()),
        }
    }
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::SessionNotFound => ApiError::NotFound(err.to_string()),
            HistoryError::Storage(e) => ApiError::Internal(e),
        }
    }
}

fn require(value: &str, what: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{what} is required")));
    }
    Ok(())
}

// ============================================================================
// Ask endpoints
// ============================================================================

#[derive(Deserialize)]
pub struct ChatPart {
    pub text: String,
}

/// One history item in the wire format clients send: a role plus one or
/// more text parts, flattened into a single `Turn`.
#[derive(Deserialize)]
pub struct ChatHistoryItem {
    pub role: Role,
    pub parts: Vec<ChatPart>,
}

impl ChatHistoryItem {
    fn into_turn(self) -> Turn {
        let text = self
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .concat();
        Turn {
            role: self.role,
            text,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub session_id: String,
    pub message: String,
    pub system_instruction: Option<String>,
    pub history: Option<Vec<ChatHistoryItem>>,
}

impl AskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require(&self.session_id, "sessionId")?;
        require(&self.message, "message")
    }

    fn history_turns(history: Option<Vec<ChatHistoryItem>>) -> Option<Vec<Turn>> {
        history.map(|items| items.into_iter().map(ChatHistoryItem::into_turn).collect())
    }
}

#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
}

async fn ask_gemini(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    req.validate()?;
    let answer = state
        .orchestrator
        .ask_model(
            &req.session_id,
            &req.message,
            req.system_instruction.as_deref(),
            AskRequest::history_turns(req.history),
        )
        .await?;
    Ok(Json(AskResponse { answer }))
}

async fn ask_mcp(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    req.validate()?;
    let answer = state
        .orchestrator
        .ask_mcp(
            &req.session_id,
            &req.message,
            req.system_instruction.as_deref(),
            AskRequest::history_turns(req.history),
        )
        .await?;
    Ok(Json(AskResponse { answer }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ============================================================================
// Chat-history endpoints
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id: String,
    /// Generated when not supplied.
    pub session_id: Option<String>,
    pub title: String,
    pub config: ChatConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub content: String,
    pub is_user: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageRequest {
    pub user_id: String,
    pub message: IncomingMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTitleRequest {
    pub user_id: String,
    pub title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTitleRequest {
    pub user_id: String,
    pub session_id: String,
    pub first_message: String,
}

#[derive(Serialize)]
pub struct TitleResponse {
    pub title: String,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<ChatSessionRecord>>, ApiError> {
    require(&query.user_id, "User ID")?;
    Ok(Json(state.history.sessions_with_details(&query.user_id).await))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ChatSessionRecord>, ApiError> {
    require(&query.user_id, "User ID")?;
    state
        .history
        .get_session(&query.user_id, &session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Chat session not found".into()))
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ChatSessionRecord>), ApiError> {
    require(&req.user_id, "User ID")?;
    require(&req.title, "Title")?;
    let session_id = req
        .session_id
        .unwrap_or_else(|| SessionId::new().to_string());
    let record = state
        .history
        .create_session(&req.user_id, &session_id, &req.title, req.config)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn add_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<AddMessageRequest>,
) -> Result<Json<ChatSessionRecord>, ApiError> {
    require(&req.user_id, "User ID")?;
    let record = state
        .history
        .add_message(
            &req.user_id,
            &session_id,
            &req.message.content,
            req.message.is_user,
        )
        .await?;
    Ok(Json(record))
}

async fn update_title(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<UpdateTitleRequest>,
) -> Result<Json<ChatSessionRecord>, ApiError> {
    require(&req.user_id, "User ID")?;
    require(&req.title, "Title")?;
    let record = state
        .history
        .update_title(&req.user_id, &session_id, &req.title)
        .await?;
    Ok(Json(record))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, ApiError> {
    require(&query.user_id, "User ID")?;
    state
        .history
        .delete_session(&query.user_id, &session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask the model for a short session title; fall back to a truncation of
/// the first message whenever anything goes wrong.
async fn generate_title(
    State(state): State<AppState>,
    Json(req): Json<GenerateTitleRequest>,
) -> Result<Json<TitleResponse>, ApiError> {
    require(&req.user_id, "User ID")?;
    require(&req.session_id, "sessionId")?;
    let prompt = format!(
        "Create a brief, informative title that summarizes the main topic or question in the \
         following message. Keep it between 4-7 words. Respond ONLY with the title: \"{}\"",
        req.first_message
    );

    let title = match state
        .ai
        .generate(&[Turn::user(prompt)], &[], Some(TITLE_SYSTEM_INSTRUCTION))
        .await
    {
        Ok(GenerationOutcome::Text(text)) if !text.trim().is_empty() => {
            let title = normalize_title(&text);
            match state
                .history
                .update_title(&req.user_id, &req.session_id, &title)
                .await
            {
                Ok(_) => title,
                Err(e) => {
                    warn!("Failed to store generated title: {e}");
                    fallback_title(&req.first_message)
                }
            }
        }
        Ok(_) => {
            warn!("Model returned no usable title, using fallback");
            fallback_title(&req.first_message)
        }
        Err(e) => {
            error!("Title generation failed: {e}");
            fallback_title(&req.first_message)
        }
    };

    Ok(Json(TitleResponse { title }))
}

/// Clean up a model-generated title: trim, strip wrapping quotes,
/// capitalize.
fn normalize_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    let inner: String = if chars.len() > 2
        && matches!(chars[0], '"' | '\'')
        && matches!(chars[chars.len() - 1], '"' | '\'')
    {
        chars[1..chars.len() - 1].iter().collect()
    } else {
        trimmed.to_string()
    };
    capitalize(&inner)
}

/// Derive a title from the message itself: first 30 characters, cut at
/// sentence punctuation, with an ellipsis when shortened.
fn fallback_title(message: &str) -> String {
    let mut title: String = message.chars().take(30).collect();
    if let Some(idx) = title.find(['.', '!', '?']) {
        if idx > 0 {
            title.truncate(idx);
        }
    }
    let mut title = capitalize(&title);
    if title.chars().count() < message.chars().count() {
        title.push_str("...");
    }
    title
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
