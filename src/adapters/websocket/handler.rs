//! WebSocket upgrade handler and relay coordinator.
//!
//! Manages the connection lifecycle:
//! 1. Upgrade and register the session (duplicate ids are rejected)
//! 2. Send the connection acknowledgement on the immediate path
//! 3. Spawn the session's dispatcher
//! 4. Dispatch inbound messages (chat, ping, reset_session, get_status)
//! 5. On disconnect, tear down the registry entry and the engine session
//!
//! Chat turns run on their own task behind a per-session turn lock, so a
//! second `chat` queues behind the first while the read loop stays free
//! to answer `ping` immediately.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::adapters::engine::EngineSessionPool;
use crate::application::ChatTurnService;
use crate::config::RelayConfig;
use crate::domain::foundation::RelaySessionId;

use super::mailbox::{Dispatcher, Mailbox};
use super::messages::{ClientMessage, ServerMessage};
use super::registry::{Transport, TransportError, TransportRegistry};

/// Shared state for the relay endpoints.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<TransportRegistry>,
    pub engine_pool: Arc<EngineSessionPool>,
    pub chat: Arc<ChatTurnService>,
    pub config: RelayConfig,
}

impl RelayState {
    /// Creates the relay state.
    pub fn new(
        registry: Arc<TransportRegistry>,
        engine_pool: Arc<EngineSessionPool>,
        chat: Arc<ChatTurnService>,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            engine_pool,
            chat,
            config,
        }
    }
}

/// Transport over the write half of a WebSocket.
struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws/:session_id`
///
/// The session id is opaque and trusted; authentication belongs to the
/// boundary layer in front of this service.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<RelayState>,
) -> Response {
    let session_id = RelaySessionId::new(session_id);
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Runs for the lifetime of one connection.
async fn handle_socket(socket: WebSocket, session_id: RelaySessionId, state: RelayState) {
    let (sink, mut receiver) = socket.split();
    let transport = Arc::new(WsTransport { sink: Mutex::new(sink) });
    let mailbox = Arc::new(Mailbox::new(state.config.mailbox_capacity));

    if let Err(e) = state
        .registry
        .register(session_id.clone(), transport.clone(), mailbox.clone())
        .await
    {
        tracing::warn!(session_id = %session_id, "rejecting connection: {e}");
        let reply = ServerMessage::error("Session id is already connected");
        if let Ok(text) = serde_json::to_string(&reply) {
            let _ = transport.send(&text).await;
        }
        return;
    }

    // Connection acknowledgement takes the immediate path; a client that
    // is already gone is detected here and torn down before any tasks
    // spawn.
    if state
        .registry
        .send_now(&session_id, &ServerMessage::connection_success(&session_id))
        .await
        .is_err()
    {
        state.engine_pool.destroy(&session_id).await;
        return;
    }

    let dispatcher = Dispatcher::spawn(
        session_id.clone(),
        mailbox.clone(),
        state.registry.clone(),
        state.config.heartbeat(),
    );

    // Serializes chat turns for this session.
    let turn_lock = Arc::new(Mutex::new(()));

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_client_message(&text, &session_id, &state, &mailbox, &turn_lock);
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(session_id = %session_id, "client sent close frame");
                break;
            }
            Ok(_) => {
                // Binary and protocol ping/pong frames are ignored.
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, "receive error: {e}");
                break;
            }
        }
    }

    // Resource release is unconditional and idempotent: registry entry,
    // mailbox (which stops the dispatcher), and engine session.
    state.registry.teardown(&session_id).await;
    state.engine_pool.destroy(&session_id).await;
    dispatcher.abort();
    tracing::info!(session_id = %session_id, "connection closed");
}

/// Dispatches one inbound text frame.
///
/// Never blocks the read loop: chat turns are spawned behind the turn
/// lock, everything else is quick.
fn handle_client_message(
    text: &str,
    session_id: &RelaySessionId,
    state: &RelayState,
    mailbox: &Arc<Mailbox>,
    turn_lock: &Arc<Mutex<()>>,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Chat(request)) => {
            let chat = state.chat.clone();
            let session_id = session_id.clone();
            let mailbox = mailbox.clone();
            let turn_lock = turn_lock.clone();
            tokio::spawn(async move {
                let _turn = turn_lock.lock().await;
                chat.process(&session_id, request, &mailbox).await;
            });
        }
        Ok(ClientMessage::Ping { timestamp }) => {
            // Urgent path: answered immediately, bypassing the mailbox.
            let registry = state.registry.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let _ = registry
                    .send_now(&session_id, &ServerMessage::pong(timestamp))
                    .await;
            });
        }
        Ok(ClientMessage::ResetSession { .. }) => {
            let pool = state.engine_pool.clone();
            let session_id = session_id.clone();
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                match pool.reset(&session_id).await {
                    Ok(()) => {
                        mailbox.push(ServerMessage::session_reset_complete());
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, "session reset failed: {e}");
                        mailbox.push(ServerMessage::error(format!("Session reset failed: {e}")));
                    }
                }
            });
        }
        Ok(ClientMessage::GetStatus) => {
            let pool = state.engine_pool.clone();
            let session_id = session_id.clone();
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                let statistics = pool.statistics(&session_id).await;
                mailbox.push(ServerMessage::status_response(statistics));
            });
        }
        Err(_) => {
            // Distinguish an unknown declared type from unparseable
            // framing; both keep the connection open.
            let reply = if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                ServerMessage::error("Unknown or malformed message type")
            } else {
                ServerMessage::error("Invalid JSON payload")
            };
            mailbox.push(reply);
        }
    }
}

/// Create the axum router for the relay endpoint.
///
/// # Example
///
/// ```ignore
/// let app = websocket_router().with_state(relay_state);
/// ```
pub fn websocket_router() -> axum::Router<RelayState> {
    use axum::routing::get;

    axum::Router::new().route("/ws/:session_id", get(ws_handler))
}
