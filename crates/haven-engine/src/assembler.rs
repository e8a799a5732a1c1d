use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use haven_core::backend::{ChatBackend, ReplyEventStream};
use haven_core::errors::ClientError;
use haven_core::ids::ConversationId;
use haven_core::message::{DeliveryStatus, Message};
use haven_core::reply::ReplyEvent;

use crate::router::ConversationRouter;

struct InFlight {
    id: u64,
    cancel: CancellationToken,
    // None while the dispatch that reserved this slot is still awaiting the
    // backend; filled once the assembly task is spawned.
    task: Option<JoinHandle<()>>,
}

impl InFlight {
    fn is_active(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished(),
            None => true,
        }
    }
}

/// Drives streamed replies into conversation logs.
///
/// One assembly may be in flight per conversation; a second dispatch for the
/// same conversation is rejected with `ReplyInFlight` while assemblies for
/// other conversations proceed independently. Each dispatch inserts a
/// `pending` placeholder at a captured index, applies deltas there in
/// arrival order, and finalizes the entry exactly once: `delivered` on clean
/// stream end, `failed` on stream error or cancellation, with any partial
/// content preserved.
pub struct ReplyAssembler {
    backend: Arc<dyn ChatBackend>,
    router: Arc<ConversationRouter>,
    in_flight: DashMap<ConversationId, InFlight>,
    next_id: AtomicU64,
}

impl ReplyAssembler {
    pub fn new(backend: Arc<dyn ChatBackend>, router: Arc<ConversationRouter>) -> Self {
        Self {
            backend,
            router,
            in_flight: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Post `content` and assemble the streamed reply into the log. Returns
    /// the placeholder's index.
    pub async fn dispatch(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<usize, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        // Reserve the slot before the first await, so a concurrent dispatch
        // for the same conversation cannot also pass the check while this
        // one is suspended on the backend call.
        let reservation = InFlight {
            id,
            cancel: cancel.clone(),
            task: None,
        };
        match self.in_flight.entry(conversation.clone()) {
            Entry::Occupied(entry) if entry.get().is_active() => {
                return Err(ClientError::ReplyInFlight);
            }
            Entry::Occupied(mut entry) => {
                entry.insert(reservation);
            }
            Entry::Vacant(entry) => {
                entry.insert(reservation);
            }
        }

        let mut placeholder = Message::peer(conversation.clone(), "");
        placeholder.status = DeliveryStatus::Pending;
        let index = self.router.append(conversation, placeholder);

        let stream = match self.backend.stream_message(conversation, content).await {
            Ok(stream) => stream,
            Err(e) => {
                self.router.mark_failed(conversation, index);
                self.release(conversation, id);
                return Err(e);
            }
        };

        // cancel_all may have removed the reservation during the call.
        if cancel.is_cancelled() {
            self.router.mark_failed(conversation, index);
            self.release(conversation, id);
            return Err(ClientError::Cancelled);
        }

        let task = tokio::spawn(assemble(
            stream,
            Arc::clone(&self.router),
            conversation.clone(),
            index,
            cancel,
        ));
        if let Some(mut entry) = self.in_flight.get_mut(conversation) {
            if entry.id == id {
                entry.task = Some(task);
            }
        }
        Ok(index)
    }

    fn release(&self, conversation: &ConversationId, id: u64) {
        self.in_flight
            .remove_if(conversation, |_, entry| entry.id == id);
    }

    pub fn is_in_flight(&self, conversation: &ConversationId) -> bool {
        self.in_flight
            .get(conversation)
            .map(|entry| entry.is_active())
            .unwrap_or(false)
    }

    /// Cancel every outstanding assembly and wait for their placeholders to
    /// be finalized `failed`. Nothing is ever left forever-pending.
    pub async fn cancel_all(&self) {
        let conversations: Vec<ConversationId> = self
            .in_flight
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for conversation in conversations {
            if let Some((_, in_flight)) = self.in_flight.remove(&conversation) {
                in_flight.cancel.cancel();
                if let Some(task) = in_flight.task {
                    if let Err(e) = task.await {
                        if !e.is_cancelled() {
                            warn!(conversation = %conversation, error = %e, "assembly task panicked");
                        }
                    }
                }
            }
        }
    }
}

async fn assemble(
    mut stream: ReplyEventStream,
    router: Arc<ConversationRouter>,
    conversation: ConversationId,
    index: usize,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(conversation = %conversation, "assembly cancelled");
                router.mark_failed(&conversation, index);
                break;
            }
            event = stream.next() => match event {
                Some(ReplyEvent::Delta { content }) => {
                    router.append_delta(&conversation, index, &content);
                }
                Some(ReplyEvent::Error { error }) => {
                    warn!(conversation = %conversation, error = %error, "reply stream failed");
                    router.mark_failed(&conversation, index);
                    break;
                }
                None => {
                    router.mark_delivered(&conversation, index);
                    break;
                }
            }
        }
    }
}
