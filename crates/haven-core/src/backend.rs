use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::ClientError;
use crate::ids::ConversationId;
use crate::message::{ConversationSummary, Message};
use crate::reply::ReplyEvent;

/// A pinned, boxed stream of reply-assembly events.
pub type ReplyEventStream = Pin<Box<dyn Stream<Item = ReplyEvent> + Send>>;

/// What the backend returns when a session is started.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SessionStart {
    #[serde(rename = "session_id")]
    pub conversation_id: ConversationId,
    pub category: String,
}

/// The HTTP collaborator: conversation CRUD and the streamed-reply channel.
///
/// Implemented by the real API client and by scripted test doubles; the
/// engine only ever sees this trait.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// All conversations for the authenticated participant.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError>;

    /// Create a new conversation under the given category.
    async fn start_session(&self, category: &str) -> Result<SessionStart, ClientError>;

    /// Persisted history for a conversation, in insertion order.
    async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ClientError>;

    /// Update a conversation's free-text notes.
    async fn set_notes(
        &self,
        conversation_id: &ConversationId,
        notes: &str,
    ) -> Result<(), ClientError>;

    /// Post a message and return the chunked reply stream.
    async fn stream_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> Result<ReplyEventStream, ClientError>;
}
