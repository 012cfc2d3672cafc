//! Chat store port - the seam to the excluded CRUD/persistence layer.
//!
//! The relay only needs a narrow slice of the persistence surface: look up
//! agents and models, resolve or create conversations, and append/list
//! messages. Uniqueness, foreign keys, and soft-delete semantics stay on
//! the other side of this trait.

use async_trait::async_trait;

use crate::domain::chat::{AgentProfile, ChatMessage, ConversationRecord, ModelProfile};
use crate::domain::foundation::{AgentId, ConversationId, ModelId, UserId};

/// Errors surfaced by chat store implementations.
#[derive(Debug, thiserror::Error)]
pub enum ChatStoreError {
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Port over the persistence collaborator.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Looks up an agent by id. `None` if absent.
    async fn find_agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, ChatStoreError>;

    /// Looks up a model configuration by id. `None` if absent.
    async fn find_model(&self, id: &ModelId) -> Result<Option<ModelProfile>, ChatStoreError>;

    /// Looks up a conversation by id. `None` if absent.
    async fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, ChatStoreError>;

    /// Creates a conversation owned by the given user.
    async fn create_conversation(
        &self,
        user_id: &UserId,
        title: &str,
    ) -> Result<ConversationRecord, ChatStoreError>;

    /// Appends a message to its conversation.
    ///
    /// # Errors
    ///
    /// - `ConversationNotFound` if the conversation does not exist
    /// - `Storage` on persistence failure
    async fn append_message(&self, message: &ChatMessage) -> Result<(), ChatStoreError>;

    /// Lists a conversation's messages in creation order.
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChatMessage>, ChatStoreError>;
}
