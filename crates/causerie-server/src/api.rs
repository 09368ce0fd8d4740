//! REST surface for the request/response operations.
//!
//! Thin glue: every handler extracts the acting user from the bearer
//! token, calls into the coordination core, and serializes the result.
//! Realtime push goes over the WebSocket gateway, not through here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use causerie_core::conversations::{ConversationService, ConversationView};
use causerie_core::identity::IdentityVerifier;
use causerie_core::messages::MessagePipeline;
use causerie_core::requests::ChatRequestService;
use causerie_core::signaling::{DeliveryOutcome, SignalingRelay};
use causerie_core::{ConnectionRegistry, CoreError};
use causerie_shared::{ConversationId, MessageId, RequestId, SignalKind, SignalPayload, UserId};
use causerie_store::{ChatRequest, Message, MessageKind, RecordStore, User};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::gateway;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub conversations: ConversationService,
    pub messages: MessagePipeline,
    pub requests: ChatRequestService,
    pub relay: SignalingRelay,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_handler))
        .route("/users/search", get(search_users))
        .route("/conversations", post(create_conversation).get(list_conversations))
        .route("/conversations/:id", get(get_conversation))
        .route("/messages", post(send_message))
        .route("/messages/:conversation_id", get(fetch_messages))
        .route("/messages/:id/read", post(mark_message_read))
        .route("/chat-requests", post(create_chat_request).get(list_chat_requests))
        .route("/chat-requests/:id/accept", post(accept_chat_request))
        .route("/chat-requests/:id/reject", post(reject_chat_request))
        .route("/signal", post(relay_signal))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the acting user from the `Authorization: Bearer <token>` header.
fn bearer_user(headers: &HeaderMap, verifier: &dyn IdentityVerifier) -> Result<UserId, ApiError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    verifier.verify(token).ok_or(ApiError(CoreError::Auth))
}

// ─── Health ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Users ───

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

async fn search_users(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    let hits = state
        .store
        .search_users(&params.query, user, params.limit.min(100))
        .map_err(CoreError::from)?;
    Ok(Json(hits))
}

// ─── Conversations ───

#[derive(Deserialize)]
struct ConversationCreate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_group: bool,
    participant_ids: Vec<UserId>,
}

async fn create_conversation(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(body): Json<ConversationCreate>,
) -> Result<Json<ConversationView>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    let conversation =
        state
            .conversations
            .create(user, &body.participant_ids, body.is_group, body.name)?;
    let view = state.conversations.view(conversation.id, user)?;
    Ok(Json(view))
}

async fn list_conversations(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationView>>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    Ok(Json(state.conversations.list_for(user)?))
}

async fn get_conversation(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<ConversationView>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    Ok(Json(state.conversations.view(id, user)?))
}

// ─── Messages ───

#[derive(Deserialize)]
struct MessageCreate {
    conversation_id: ConversationId,
    content: String,
    #[serde(default = "default_message_type")]
    message_type: String,
}

fn default_message_type() -> String {
    "text".to_string()
}

async fn send_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(body): Json<MessageCreate>,
) -> Result<Json<Message>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    let message = state
        .messages
        .send(
            body.conversation_id,
            user,
            body.content,
            MessageKind::from_tag(&body.message_type),
        )
        .await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "default_page_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_page_limit() -> usize {
    50
}

async fn fetch_messages(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    let messages = state
        .messages
        .fetch(conversation_id, user, page.limit.min(200), page.offset)?;
    Ok(Json(messages))
}

async fn mark_message_read(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    state.messages.mark_read(id, user).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// ─── Chat requests ───

#[derive(Deserialize)]
struct ChatRequestCreate {
    receiver_id: UserId,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    is_group_invite: bool,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
}

async fn create_chat_request(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(body): Json<ChatRequestCreate>,
) -> Result<Json<ChatRequest>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    let request = state
        .requests
        .create(
            user,
            body.receiver_id,
            body.message,
            body.is_group_invite,
            body.conversation_id,
        )
        .await?;
    Ok(Json(request))
}

async fn list_chat_requests(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatRequest>>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    Ok(Json(state.requests.pending_for(user)?))
}

async fn accept_chat_request(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<Json<ConversationView>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    let view = state.requests.accept(id, user).await?;
    Ok(Json(view))
}

async fn reject_chat_request(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;
    state.requests.reject(id, user).await?;
    Ok(Json(serde_json::json!({ "status": "rejected" })))
}

// ─── Signaling ───

#[derive(Deserialize)]
struct SignalRequest {
    kind: SignalKind,
    target_user_id: UserId,
    conversation_id: ConversationId,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Serialize)]
struct SignalResponse {
    status: &'static str,
}

async fn relay_signal(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(body): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, ApiError> {
    let user = bearer_user(&headers, state.verifier.as_ref())?;

    let outcome = state
        .relay
        .relay(SignalPayload {
            kind: body.kind,
            from_user_id: user,
            target_user_id: body.target_user_id,
            conversation_id: body.conversation_id,
            data: body.data,
        })
        .await;

    let status = match outcome {
        DeliveryOutcome::Delivered => "sent",
        DeliveryOutcome::TargetOffline => "user_offline",
    };
    Ok(Json(SignalResponse { status }))
}

// ─── Serve ───

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
