//! HTTP route handlers for the chat API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::services::ServeDir;

use crate::chat::{ChatReply, ConversationDetail};
use crate::speech::SpeechError;
use crate::storage::{ConversationId, ConversationMeta};

use super::error::ApiError;
use super::extract::CurrentUser;
use super::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let audio = ServeDir::new(state.speech.audio_dir());
    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/chat", post(chat))
        .route("/speak", post(speak))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route("/conversations/{id}/select", post(select_conversation))
        .route("/conversations/{id}/speak", post(speak_last_reply))
        .nest_service("/audio", audio)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "charla",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Registration and login body.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(credentials) = payload?;
    let user = state
        .auth
        .register(&credentials.username, &credentials.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": user.id, "username": user.username })),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(credentials) = payload?;
    let token = state
        .auth
        .login(&credentials.username, &credentials.password)
        .await?;
    Ok(Json(json!({ "token": token })))
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Target conversation; the active one when absent.
    pub conversation_id: Option<String>,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let Json(request) = payload?;
    let reply = state
        .chat
        .send(owner, &request.message, request.conversation_id.as_deref())
        .await?;
    Ok(Json(reply))
}

/// Speech request.
#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    /// Text to read aloud.
    pub text: String,
}

/// Location of rendered audio.
#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    /// Absolute URL of the MP3 file.
    pub audio_url: String,
}

async fn speak(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SpeakRequest>, JsonRejection>,
) -> ApiResult<Json<SpeakResponse>> {
    let Json(request) = payload?;
    let file_name = state.speech.render(&request.text).await?;
    Ok(Json(SpeakResponse {
        audio_url: state.audio_url(&file_name),
    }))
}

async fn speak_last_reply(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SpeakResponse>> {
    let text = state
        .chat
        .last_reply(owner, &id)
        .await?
        .ok_or(SpeechError::EmptyText)?;
    let file_name = state.speech.render(&text).await?;
    Ok(Json(SpeakResponse {
        audio_url: state.audio_url(&file_name),
    }))
}

/// Conversation entry in listings.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    /// Display title.
    pub title: String,
}

/// Conversation identity returned by create, rename and select.
#[derive(Debug, Serialize)]
pub struct ConversationRef {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
}

impl From<ConversationMeta> for ConversationRef {
    fn from(meta: ConversationMeta) -> Self {
        Self {
            id: meta.id,
            title: meta.title,
        }
    }
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> ApiResult<Json<BTreeMap<String, ConversationSummary>>> {
    let conversations = state
        .chat
        .list(owner)
        .await?
        .into_iter()
        .map(|meta| (meta.id.to_string(), ConversationSummary { title: meta.title }))
        .collect();
    Ok(Json(conversations))
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> ApiResult<Json<ConversationRef>> {
    let meta = state.chat.create(owner).await?;
    Ok(Json(meta.into()))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationDetail>> {
    Ok(Json(state.chat.get(owner, &id).await?))
}

/// Rename body.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// New title.
    pub title: String,
}

async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<ConversationRef>> {
    let Json(request) = payload?;
    let meta = state.chat.rename(owner, &id, &request.title).await?;
    Ok(Json(meta.into()))
}

async fn select_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationRef>> {
    let meta = state.chat.select(owner, &id).await?;
    Ok(Json(meta.into()))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.chat.delete(owner, &id).await?;
    Ok(Json(json!({ "ok": true })))
}
