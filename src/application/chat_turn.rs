//! One chat turn, end to end.
//!
//! Drives the full lifecycle of a `chat` client message: field validation,
//! conversation resolution, message persistence, engine invocation, and
//! the outcome envelopes. All progress is reported through the session's
//! mailbox; only the relay coordinator decides when a turn may start (one
//! active turn per session).

use std::sync::Arc;

use serde_json::json;

use crate::adapters::engine::EngineSessionPool;
use crate::adapters::websocket::{ChatRequest, Mailbox, ServerMessage};
use crate::domain::chat::{AgentProfile, ChatMessage, ModelProfile, Role};
use crate::domain::events::{EngineEvent, EventKind};
use crate::domain::foundation::{AgentId, ConversationId, RelaySessionId, Timestamp, UserId};
use crate::ports::{ChatStore, ChatStoreError, EngineError};

/// Failures that abort a turn before (or while) touching the engine.
///
/// These all surface to the client as an `error` envelope; engine-phase
/// outcomes (`chat_complete`/`chat_error`) are handled inline and never
/// reach this type.
#[derive(Debug, thiserror::Error)]
enum TurnAbort {
    #[error("Invalid {field} identifier: {value}")]
    InvalidId { field: &'static str, value: String },

    #[error("Agent not found or not a system agent")]
    AgentUnavailable,

    #[error("Conversation not found or not owned by the requesting user")]
    ConversationAccess,

    #[error("Storage failure: {0}")]
    Store(#[from] ChatStoreError),
}

struct ValidatedChat {
    message: String,
    agent_id: String,
    conversation_id: Option<String>,
    model_id: Option<String>,
    user_id: String,
}

/// Processes chat turns against the store and the engine pool.
pub struct ChatTurnService {
    store: Arc<dyn ChatStore>,
    pool: Arc<EngineSessionPool>,
}

impl ChatTurnService {
    /// Creates the service.
    pub fn new(store: Arc<dyn ChatStore>, pool: Arc<EngineSessionPool>) -> Self {
        Self { store, pool }
    }

    /// Handles one `chat` message, reporting every outcome through the
    /// mailbox. Never returns an error: a dead session just stops
    /// receiving envelopes.
    pub async fn process(
        &self,
        session_id: &RelaySessionId,
        request: ChatRequest,
        mailbox: &Arc<Mailbox>,
    ) {
        let Some(valid) = Self::validate(request) else {
            mailbox.push(ServerMessage::error(
                "Missing required fields: message, agent_id, user_id",
            ));
            return;
        };

        mailbox.push(ServerMessage::chat_start());

        if let Err(abort) = self.run_turn(session_id, valid, mailbox).await {
            tracing::warn!(session_id = %session_id, "chat turn aborted: {abort}");
            mailbox.push(ServerMessage::error(abort.to_string()));
        }
    }

    fn validate(request: ChatRequest) -> Option<ValidatedChat> {
        let message = request.message.filter(|m| !m.trim().is_empty())?;
        let agent_id = request.agent_id.filter(|a| !a.is_empty())?;
        let user_id = request.user_id.filter(|u| !u.is_empty())?;
        Some(ValidatedChat {
            message,
            agent_id,
            conversation_id: request.conversation_id,
            model_id: request.model_id,
            user_id,
        })
    }

    async fn run_turn(
        &self,
        session_id: &RelaySessionId,
        valid: ValidatedChat,
        mailbox: &Arc<Mailbox>,
    ) -> Result<(), TurnAbort> {
        let agent_id: AgentId = valid.agent_id.parse().map_err(|_| TurnAbort::InvalidId {
            field: "agent",
            value: valid.agent_id.clone(),
        })?;
        let user_id: UserId = valid.user_id.parse().map_err(|_| TurnAbort::InvalidId {
            field: "user",
            value: valid.user_id.clone(),
        })?;

        let agent = self
            .store
            .find_agent(&agent_id)
            .await?
            .filter(|a| a.is_system_agent)
            .ok_or(TurnAbort::AgentUnavailable)?;

        let conversation = match &valid.conversation_id {
            Some(raw) => {
                let conversation_id: ConversationId =
                    raw.parse().map_err(|_| TurnAbort::InvalidId {
                        field: "conversation",
                        value: raw.clone(),
                    })?;
                self.store
                    .find_conversation(&conversation_id)
                    .await?
                    .filter(|c| c.is_owned_by(&user_id))
                    .ok_or(TurnAbort::ConversationAccess)?
            }
            None => {
                self.store
                    .create_conversation(&user_id, "New conversation")
                    .await?
            }
        };

        let user_message =
            ChatMessage::new(conversation.id, Role::User, valid.message.as_str(), None);
        self.store.append_message(&user_message).await?;
        mailbox.push(ServerMessage::user_message_saved(
            user_message.id.to_string(),
            conversation.id.to_string(),
        ));

        let model = self.resolve_model(&valid).await?;

        let history = self.store.list_messages(&conversation.id).await?;
        // The just-persisted user message is already the query; the
        // engine gets it separately from the history.
        let prior = match history.last() {
            Some(last) if last.id == user_message.id => &history[..history.len() - 1],
            _ => &history[..],
        };
        let query = build_engine_query(&agent, prior, &valid.message);

        let engine = self.pool.get_or_create(session_id, Arc::clone(mailbox)).await;
        self.pool.begin_turn(session_id).await;

        match engine.process_turn(&query).await {
            Ok(result) if result.success => {
                let model_used = result
                    .model_used
                    .clone()
                    .or_else(|| model.as_ref().map(|m| m.name.clone()));
                self.complete_turn(
                    session_id,
                    mailbox,
                    &conversation.id,
                    &user_message,
                    &valid,
                    result.response,
                    model_used,
                    result.tools_available,
                    false,
                )
                .await?;
            }
            Ok(result) => {
                let reason = result
                    .error
                    .unwrap_or_else(|| "engine reported an unspecified failure".to_string());
                self.pool
                    .record_event(
                        session_id,
                        EngineEvent::new(
                            EventKind::QueryError,
                            agent.name.clone(),
                            json!({ "error": reason }),
                        ),
                    )
                    .await;
                mailbox.push(ServerMessage::chat_error(format!(
                    "Turn processing failed: {reason}"
                )));
            }
            Err(engine_error) => {
                self.fallback_turn(
                    session_id,
                    mailbox,
                    &conversation.id,
                    &user_message,
                    &valid,
                    &agent,
                    engine_error,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn resolve_model(&self, valid: &ValidatedChat) -> Result<Option<ModelProfile>, TurnAbort> {
        let Some(raw) = &valid.model_id else {
            return Ok(None);
        };
        let Ok(model_id) = raw.parse() else {
            tracing::debug!("ignoring unparseable model id: {raw}");
            return Ok(None);
        };
        Ok(self.store.find_model(&model_id).await?)
    }

    /// Persists the assistant reply and emits `chat_complete`.
    #[allow(clippy::too_many_arguments)]
    async fn complete_turn(
        &self,
        session_id: &RelaySessionId,
        mailbox: &Arc<Mailbox>,
        conversation_id: &ConversationId,
        user_message: &ChatMessage,
        valid: &ValidatedChat,
        response: String,
        model_used: Option<String>,
        tools_available: u32,
        fallback_used: bool,
    ) -> Result<(), TurnAbort> {
        let events_count = self.pool.current_turn_len(session_id).await;
        let metadata = json!({
            "model_id": valid.model_id,
            "model_name": model_used,
            "tools_available": tools_available,
            "events_count": events_count,
            "session_id": session_id.as_str(),
            "fallback_used": fallback_used,
        });
        let assistant =
            ChatMessage::new(*conversation_id, Role::Assistant, response.as_str(), Some(metadata));
        self.store.append_message(&assistant).await?;

        mailbox.push(ServerMessage::ChatComplete {
            conversation_id: conversation_id.to_string(),
            user_message_id: user_message.id.to_string(),
            assistant_message_id: assistant.id.to_string(),
            response,
            model_used,
            tools_available,
            events_count,
            timestamp: Timestamp::now().to_rfc3339(),
        });
        Ok(())
    }

    /// Engine transport failure: record the error event, answer with the
    /// agent's static fallback, and complete the turn. The session and
    /// its engine state survive.
    async fn fallback_turn(
        &self,
        session_id: &RelaySessionId,
        mailbox: &Arc<Mailbox>,
        conversation_id: &ConversationId,
        user_message: &ChatMessage,
        valid: &ValidatedChat,
        agent: &AgentProfile,
        engine_error: EngineError,
    ) -> Result<(), TurnAbort> {
        tracing::warn!(
            session_id = %session_id,
            "engine failed, using fallback reply: {engine_error}"
        );
        self.pool
            .record_event(
                session_id,
                EngineEvent::new(
                    EventKind::EngineError,
                    agent.name.clone(),
                    json!({
                        "error": engine_error.to_string(),
                        "fallback_used": true,
                        "agent_name": agent.name,
                    }),
                ),
            )
            .await;

        let fallback = agent.fallback_reply(&valid.message);
        self.complete_turn(
            session_id,
            mailbox,
            conversation_id,
            user_message,
            valid,
            fallback,
            None,
            0,
            true,
        )
        .await
    }
}

/// Builds the engine query from the agent's persona, the recent history,
/// and the current message.
fn build_engine_query(agent: &AgentProfile, history: &[ChatMessage], user_message: &str) -> String {
    let mut parts = Vec::new();
    parts.push(format!("You are {}.", agent.name));
    parts.push(format!("Your instructions: {}", agent.instruction));
    if !agent.team.is_empty() {
        parts.push(format!("Your team: {}", agent.team.join(", ")));
    }

    let recent = if history.len() > 5 {
        &history[history.len() - 5..]
    } else {
        history
    };
    if !recent.is_empty() {
        parts.push("\nConversation history:".to_string());
        for message in recent {
            match message.role {
                Role::User => parts.push(format!("User: {}", message.content)),
                Role::Assistant => parts.push(format!("Assistant: {}", message.content)),
            }
        }
    }

    parts.push(format!("\nCurrent user message: {user_message}"));
    parts.push("\nRespond according to your role and instructions.".to_string());
    parts.join("\n")
}
