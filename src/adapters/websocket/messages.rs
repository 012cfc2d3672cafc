//! WebSocket message types for the session relay.
//!
//! Defines the protocol between server and connected clients:
//! - Client → Server: chat, ping, reset_session, get_status
//! - Server → Client: connection/turn lifecycle, engine events, status
//!   projections, heartbeats, and errors

use serde::{Deserialize, Serialize};

use crate::domain::events::{EventKind, SequencedEvent, SessionStatistics};
use crate::domain::foundation::{RelaySessionId, Timestamp};

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a conversational turn.
    Chat(ChatRequest),

    /// Heartbeat request; answered immediately, bypassing the mailbox.
    Ping {
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Clear the engine's conversational state for this session.
    ResetSession {
        #[serde(default)]
        agent_id: Option<String>,
    },

    /// Request the session's event statistics.
    GetStatus,
}

/// Payload of a `chat` message.
///
/// All fields are optional at the wire level; required-field validation is
/// a protocol concern handled by the turn service, not by serde, so a
/// missing field produces an `error` reply instead of a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
///
/// Every variant carries an RFC 3339 `timestamp`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established and registered.
    ConnectionSuccess {
        message: String,
        session_id: String,
        timestamp: String,
    },

    /// Heartbeat reply; echoes the client's own timestamp if it sent one.
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_timestamp: Option<String>,
        timestamp: String,
    },

    /// Synthesized by the dispatcher when the mailbox stays idle for a
    /// full heartbeat interval.
    Heartbeat { timestamp: String },

    /// A chat turn was accepted and is being processed.
    ChatStart { message: String, timestamp: String },

    /// The user's message was persisted.
    UserMessageSaved {
        message_id: String,
        conversation_id: String,
        timestamp: String,
    },

    /// One sequenced engine event.
    AgentEvent {
        event_type: EventKind,
        agent_name: String,
        data: serde_json::Value,
        sequence: u64,
        timestamp: String,
    },

    /// Human-readable status derived from an engine event.
    StatusUpdate {
        status: String,
        message: String,
        timestamp: String,
    },

    /// A chat turn finished successfully.
    ChatComplete {
        conversation_id: String,
        user_message_id: String,
        assistant_message_id: String,
        response: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model_used: Option<String>,
        tools_available: u32,
        events_count: usize,
        timestamp: String,
    },

    /// A chat turn failed; the session survives.
    ChatError { message: String, timestamp: String },

    /// Protocol or validation error; the connection stays open.
    Error { message: String, timestamp: String },

    /// The engine's conversational state was cleared.
    SessionResetComplete { message: String, timestamp: String },

    /// Reply to `get_status`.
    StatusResponse {
        data: SessionStatistics,
        timestamp: String,
    },
}

fn now() -> String {
    Timestamp::now().to_rfc3339()
}

impl ServerMessage {
    /// Connection acknowledgement for a freshly registered session.
    pub fn connection_success(session_id: &RelaySessionId) -> Self {
        ServerMessage::ConnectionSuccess {
            message: "Connected; ready to stream events".to_string(),
            session_id: session_id.to_string(),
            timestamp: now(),
        }
    }

    /// Pong echoing the client's timestamp.
    pub fn pong(client_timestamp: Option<String>) -> Self {
        ServerMessage::Pong {
            client_timestamp,
            timestamp: now(),
        }
    }

    /// Dispatcher-synthesized heartbeat.
    pub fn heartbeat() -> Self {
        ServerMessage::Heartbeat { timestamp: now() }
    }

    /// Turn-accepted acknowledgement.
    pub fn chat_start() -> Self {
        ServerMessage::ChatStart {
            message: "Processing your message...".to_string(),
            timestamp: now(),
        }
    }

    /// User-message persistence acknowledgement.
    pub fn user_message_saved(message_id: String, conversation_id: String) -> Self {
        ServerMessage::UserMessageSaved {
            message_id,
            conversation_id,
            timestamp: now(),
        }
    }

    /// Envelope for one sequenced engine event.
    pub fn agent_event(sequenced: &SequencedEvent) -> Self {
        ServerMessage::AgentEvent {
            event_type: sequenced.event.kind.clone(),
            agent_name: sequenced.event.agent_name.clone(),
            data: sequenced.event.data.clone(),
            sequence: sequenced.sequence,
            timestamp: sequenced.event.timestamp.to_rfc3339(),
        }
    }

    /// Status projection envelope.
    pub fn status_update(status: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::StatusUpdate {
            status: status.into(),
            message: message.into(),
            timestamp: now(),
        }
    }

    /// Turn failure envelope.
    pub fn chat_error(message: impl Into<String>) -> Self {
        ServerMessage::ChatError {
            message: message.into(),
            timestamp: now(),
        }
    }

    /// Protocol/validation error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: now(),
        }
    }

    /// Reset acknowledgement.
    pub fn session_reset_complete() -> Self {
        ServerMessage::SessionResetComplete {
            message: "Session state cleared".to_string(),
            timestamp: now(),
        }
    }

    /// Statistics reply.
    pub fn status_response(data: SessionStatistics) -> Self {
        ServerMessage::StatusResponse {
            data,
            timestamp: now(),
        }
    }

    /// The wire tag of this message, for tests and logging.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionSuccess { .. } => "connection_success",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Heartbeat { .. } => "heartbeat",
            ServerMessage::ChatStart { .. } => "chat_start",
            ServerMessage::UserMessageSaved { .. } => "user_message_saved",
            ServerMessage::AgentEvent { .. } => "agent_event",
            ServerMessage::StatusUpdate { .. } => "status_update",
            ServerMessage::ChatComplete { .. } => "chat_complete",
            ServerMessage::ChatError { .. } => "chat_error",
            ServerMessage::Error { .. } => "error",
            ServerMessage::SessionResetComplete { .. } => "session_reset_complete",
            ServerMessage::StatusResponse { .. } => "status_response",
        }
    }
}
