use std::sync::Arc;

use tracing::debug;

use haven_core::backend::ChatBackend;
use haven_core::errors::ClientError;
use haven_core::ids::ConversationId;
use haven_core::message::Message;

use crate::router::ConversationRouter;
use crate::welcome::WelcomeCatalog;

/// Default page size, matching the listener client.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Reconciles persisted history with the live log.
///
/// A watermark (the local log length) is stamped when the fetch starts; on
/// resolve the log head is replaced with the persisted view (system entries
/// excluded) and any local message that arrived at or after the watermark is
/// re-appended. A failed fetch is an error to the caller, never mistaken
/// for a legitimately empty conversation.
pub struct HistoryLoader {
    backend: Arc<dyn ChatBackend>,
    router: Arc<ConversationRouter>,
    welcome: WelcomeCatalog,
    limit: u32,
}

impl HistoryLoader {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        router: Arc<ConversationRouter>,
        welcome: WelcomeCatalog,
    ) -> Self {
        Self {
            backend,
            router,
            welcome,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Load `conversation`'s history and merge it into the log. Seeds one
    /// welcome line for `category` if the merged log ends up empty.
    pub async fn load(
        &self,
        conversation: &ConversationId,
        category: &str,
    ) -> Result<(), ClientError> {
        let watermark = self.router.log_len(conversation);
        let persisted = self
            .backend
            .fetch_history(conversation, Some(self.limit))
            .await?;

        let persisted: Vec<Message> = persisted.into_iter().filter(|m| !m.is_system()).collect();
        debug!(
            conversation = %conversation,
            persisted = persisted.len(),
            watermark,
            "merging history"
        );
        self.router.merge_history(conversation, persisted, watermark);

        if self.router.log_len(conversation) == 0 {
            self.router.append(
                conversation,
                Message::system(conversation.clone(), self.welcome.text(category)),
            );
        }
        Ok(())
    }
}
