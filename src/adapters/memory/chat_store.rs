//! In-memory chat store implementation for testing.
//!
//! Deterministic, lock-based store with builder-style seeding and a few
//! inspection helpers for assertions. Not intended for production use;
//! the Postgres adapter is the real implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::chat::{AgentProfile, ChatMessage, ConversationRecord, ModelProfile};
use crate::domain::foundation::{AgentId, ConversationId, ModelId, UserId};
use crate::ports::{ChatStore, ChatStoreError};

/// In-memory chat store.
///
/// # Panics
///
/// Methods may panic if internal locks are poisoned. Acceptable for test
/// code; do not use this adapter in production.
pub struct InMemoryChatStore {
    agents: RwLock<HashMap<AgentId, AgentProfile>>,
    models: RwLock<HashMap<ModelId, ModelProfile>>,
    conversations: RwLock<HashMap<ConversationId, ConversationRecord>>,
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryChatStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            models: RwLock::new(HashMap::new()),
            conversations: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
        }
    }

    /// Seeds an agent.
    pub fn with_agent(self, agent: AgentProfile) -> Self {
        self.agents
            .write()
            .expect("in-memory store lock poisoned")
            .insert(agent.id, agent);
        self
    }

    /// Seeds a model.
    pub fn with_model(self, model: ModelProfile) -> Self {
        self.models
            .write()
            .expect("in-memory store lock poisoned")
            .insert(model.id, model);
        self
    }

    // === Test Helpers ===

    /// All conversations, in no particular order.
    pub fn conversations(&self) -> Vec<ConversationRecord> {
        self.conversations
            .read()
            .expect("in-memory store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Messages of one conversation, in append order.
    pub fn messages_in(&self, conversation_id: &ConversationId) -> Vec<ChatMessage> {
        self.messages
            .read()
            .expect("in-memory store lock poisoned")
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Total message count across all conversations.
    pub fn message_count(&self) -> usize {
        self.messages.read().expect("in-memory store lock poisoned").len()
    }
}

impl Default for InMemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find_agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, ChatStoreError> {
        Ok(self
            .agents
            .read()
            .expect("in-memory store lock poisoned")
            .get(id)
            .cloned())
    }

    async fn find_model(&self, id: &ModelId) -> Result<Option<ModelProfile>, ChatStoreError> {
        Ok(self
            .models
            .read()
            .expect("in-memory store lock poisoned")
            .get(id)
            .cloned())
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, ChatStoreError> {
        Ok(self
            .conversations
            .read()
            .expect("in-memory store lock poisoned")
            .get(id)
            .cloned())
    }

    async fn create_conversation(
        &self,
        user_id: &UserId,
        title: &str,
    ) -> Result<ConversationRecord, ChatStoreError> {
        let conversation = ConversationRecord::new(*user_id, title);
        self.conversations
            .write()
            .expect("in-memory store lock poisoned")
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), ChatStoreError> {
        if !self
            .conversations
            .read()
            .expect("in-memory store lock poisoned")
            .contains_key(&message.conversation_id)
        {
            return Err(ChatStoreError::ConversationNotFound(message.conversation_id));
        }
        self.messages
            .write()
            .expect("in-memory store lock poisoned")
            .push(message.clone());
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChatMessage>, ChatStoreError> {
        Ok(self.messages_in(conversation_id))
    }
}
