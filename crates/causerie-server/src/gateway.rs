//! WebSocket gateway: the realtime half of the server.
//!
//! Each socket must authenticate before anything else: the first client
//! frame has to be an `authenticate` command carrying a credential token,
//! otherwise the socket is closed. After the handshake the task pumps two
//! directions concurrently: client commands in, queued server events out.
//!
//! A `session_replaced` event on the outbound queue means a newer login
//! superseded this session; the gateway forwards it and closes the socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use causerie_core::AuthenticatedSession;
use causerie_shared::{ConversationId, ServerEvent, SignalKind, SignalPayload, UserId};

use crate::api::AppState;

/// Commands a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
enum ClientCommand {
    Authenticate {
        token: String,
    },
    JoinRoom {
        conversation_id: ConversationId,
    },
    LeaveRoom {
        conversation_id: ConversationId,
    },
    Typing {
        conversation_id: ConversationId,
    },
    StopTyping {
        conversation_id: ConversationId,
    },
    Signal {
        kind: SignalKind,
        target_user_id: UserId,
        conversation_id: ConversationId,
        #[serde(default)]
        data: serde_json::Value,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // Handshake: the first frame must authenticate.
    let session = match await_authentication(&mut socket, &state).await {
        Some(session) => session,
        None => {
            debug!("socket closed before authenticating");
            let _ = socket.close().await;
            return;
        }
    };

    let session_id = session.session_id;
    let user_id = session.user_id;
    info!(user = %user_id, session = %session_id, "gateway session open");

    let ack = serde_json::json!({
        "event": "authenticated",
        "data": { "user_id": user_id, "session_id": session_id },
    });
    if socket.send(Message::Text(ack.to_string())).await.is_err() {
        state.registry.disconnect(session_id).await;
        return;
    }

    run_session(socket, state.clone(), session).await;

    state.registry.disconnect(session_id).await;
    info!(user = %user_id, session = %session_id, "gateway session closed");
}

/// Read frames until a valid `authenticate` command arrives or the client
/// gives up. Non-authenticate commands before the handshake are rejected.
async fn await_authentication(
    socket: &mut WebSocket,
    state: &AppState,
) -> Option<AuthenticatedSession> {
    while let Some(Ok(message)) = socket.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ClientCommand>(&text) {
            Ok(ClientCommand::Authenticate { token }) => {
                match state.registry.authenticate(&token).await {
                    Ok(session) => return Some(session),
                    Err(e) => {
                        warn!(error = %e, "gateway authentication failed");
                        return None;
                    }
                }
            }
            Ok(_) => {
                warn!("command before authentication, closing socket");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "unparseable frame during handshake");
                return None;
            }
        }
    }
    None
}

async fn run_session(socket: WebSocket, state: AppState, mut session: AuthenticatedSession) {
    let (mut sink, mut stream) = socket.split();
    let session_id = session.session_id;
    let user_id = session.user_id;

    loop {
        tokio::select! {
            // Queued server events out to the client.
            event = session.events.recv() => {
                let Some(event) = event else { break };
                let superseded = matches!(event, ServerEvent::SessionReplaced);
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize event"),
                }
                if superseded {
                    let _ = sink.close().await;
                    break;
                }
            }

            // Client commands in.
            frame = stream.next() => {
                let Some(Ok(message)) = frame else { break };
                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => {
                                handle_command(&state, session_id, user_id, command).await;
                            }
                            Err(e) => {
                                debug!(user = %user_id, error = %e, "unparseable command");
                            }
                        }
                    }
                    Message::Close(_) => break,
                    // Pings are answered by axum automatically.
                    _ => {}
                }
            }
        }
    }
}

async fn handle_command(
    state: &AppState,
    session_id: causerie_shared::SessionId,
    user_id: UserId,
    command: ClientCommand,
) {
    match command {
        ClientCommand::Authenticate { .. } => {
            debug!(user = %user_id, "ignoring re-authentication on open session");
        }
        ClientCommand::JoinRoom { conversation_id } => {
            state.registry.join_room(session_id, conversation_id).await;
        }
        ClientCommand::LeaveRoom { conversation_id } => {
            state.registry.leave_room(session_id, conversation_id).await;
        }
        ClientCommand::Typing { conversation_id } => {
            state.relay.typing(conversation_id, user_id, session_id).await;
        }
        ClientCommand::StopTyping { conversation_id } => {
            state
                .relay
                .stop_typing(conversation_id, user_id, session_id)
                .await;
        }
        ClientCommand::Signal {
            kind,
            target_user_id,
            conversation_id,
            data,
        } => {
            let outcome = state
                .relay
                .relay(SignalPayload {
                    kind,
                    from_user_id: user_id,
                    target_user_id,
                    conversation_id,
                    data,
                })
                .await;
            debug!(user = %user_id, ?outcome, "signal relayed via gateway");
        }
    }
}
