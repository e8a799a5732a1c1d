use std::sync::{Arc, Weak};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use haven_core::errors::ClientError;
use haven_core::frames::{InboundMessage, OutboundFrame};
use haven_core::ids::{ConversationId, ParticipantId};
use haven_core::message::{DeliveryStatus, Message, Metadata, Role};
use haven_socket::ConnectionManager;

use crate::timer::{SessionTimer, TimerState};

const EVENT_FANOUT: usize = 256;

/// Demultiplexes traffic across conversations.
///
/// Each conversation owns a strictly append-only log; arrival order is log
/// order, with local sends appended synchronously before their network
/// round-trip. Status reconciliation mutates entries in place and never
/// reorders. Messages for conversations nobody joined still get a log
/// (get-or-create), and the set of known conversations never shrinks.
pub struct ConversationRouter {
    connection: Arc<ConnectionManager>,
    timer: Arc<SessionTimer>,
    participant: ParticipantId,
    logs: DashMap<ConversationId, Vec<Message>>,
    joined: DashSet<ConversationId>,
    events: broadcast::Sender<(ConversationId, Message)>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationRouter {
    pub fn new(
        connection: Arc<ConnectionManager>,
        timer: Arc<SessionTimer>,
        participant: ParticipantId,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_FANOUT);
        let router = Arc::new(Self {
            connection: Arc::clone(&connection),
            timer,
            participant,
            logs: DashMap::new(),
            joined: DashSet::new(),
            events,
            pump: Mutex::new(None),
        });

        let pump = tokio::spawn(pump_inbound(
            connection.subscribe_messages(),
            Arc::downgrade(&router),
        ));
        *router.pump.lock() = Some(pump);
        router
    }

    /// Subscribe to this conversation. Idempotent: the join frame is emitted
    /// exactly once per joined conversation.
    pub async fn join(&self, conversation: &ConversationId) -> Result<(), ClientError> {
        self.logs.entry(conversation.clone()).or_default();
        if self.joined.contains(conversation) {
            return Ok(());
        }
        self.connection
            .send_frame(OutboundFrame::JoinConversation {
                conversation_id: conversation.clone(),
            })
            .await?;
        self.joined.insert(conversation.clone());
        debug!(conversation = %conversation, "joined conversation");
        Ok(())
    }

    pub async fn leave(&self, conversation: &ConversationId) -> Result<(), ClientError> {
        if self.joined.remove(conversation).is_none() {
            return Ok(());
        }
        self.connection
            .send_frame(OutboundFrame::LeaveConversation {
                conversation_id: conversation.clone(),
            })
            .await
    }

    /// Send a message on the persistent channel.
    ///
    /// Gate-checked against the session timer before anything else: a closed
    /// gate means no append and no frame. Otherwise the message is appended
    /// optimistically as `pending` and reconciled to `delivered` on enqueue
    /// or `failed` on transport rejection; a failed send stays in the log.
    pub async fn send(
        &self,
        conversation: &ConversationId,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<usize, ClientError> {
        self.check_gate()?;

        let content = content.into();
        let message = Message::user(
            conversation.clone(),
            self.participant.clone(),
            content.clone(),
            metadata.clone(),
        );
        let index = self.append(conversation, message);

        let result = self
            .connection
            .send_frame(OutboundFrame::SendMessage {
                conversation_id: conversation.clone(),
                sender_id: self.participant.clone(),
                content,
                metadata,
            })
            .await;

        match result {
            Ok(()) => {
                self.mark_delivered(conversation, index);
                Ok(index)
            }
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "send failed, message marked failed");
                self.mark_failed(conversation, index);
                Err(e)
            }
        }
    }

    fn check_gate(&self) -> Result<(), ClientError> {
        match self.timer.state() {
            TimerState::Running { remaining, .. } if remaining > 0 => Ok(()),
            TimerState::Expired => Err(ClientError::SessionInactive("session expired".into())),
            _ => Err(ClientError::SessionInactive("no running session".into())),
        }
    }

    /// Append a message, creating the conversation's log if needed. Returns
    /// the appended index.
    pub fn append(&self, conversation: &ConversationId, message: Message) -> usize {
        let mut log = self.logs.entry(conversation.clone()).or_default();
        log.push(message.clone());
        let index = log.len() - 1;
        drop(log);
        let _ = self.events.send((conversation.clone(), message));
        index
    }

    pub fn mark_delivered(&self, conversation: &ConversationId, index: usize) {
        self.set_status(conversation, index, DeliveryStatus::Delivered);
    }

    pub fn mark_failed(&self, conversation: &ConversationId, index: usize) {
        self.set_status(conversation, index, DeliveryStatus::Failed);
    }

    fn set_status(&self, conversation: &ConversationId, index: usize, status: DeliveryStatus) {
        if let Some(mut log) = self.logs.get_mut(conversation) {
            if let Some(message) = log.get_mut(index) {
                message.status = status;
            }
        }
    }

    /// Append streamed content onto the message at `index`.
    pub fn append_delta(&self, conversation: &ConversationId, index: usize, delta: &str) {
        if let Some(mut log) = self.logs.get_mut(conversation) {
            if let Some(message) = log.get_mut(index) {
                message.content.push_str(delta);
            }
        }
    }

    pub fn messages_for(&self, conversation: &ConversationId) -> Vec<Message> {
        self.logs
            .get(conversation)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn log_len(&self, conversation: &ConversationId) -> usize {
        self.logs.get(conversation).map(|log| log.len()).unwrap_or(0)
    }

    /// Replace the head of the log with persisted history while keeping every
    /// local message appended at or after `watermark`. Closes the race where
    /// live traffic lands while a history fetch is in flight.
    pub fn merge_history(
        &self,
        conversation: &ConversationId,
        persisted: Vec<Message>,
        watermark: usize,
    ) {
        let mut log = self.logs.entry(conversation.clone()).or_default();
        let tail: Vec<Message> = log.iter().skip(watermark).cloned().collect();
        *log = persisted;
        log.extend(tail);
    }

    /// Every conversation seen so far: explicitly joined or message-bearing.
    pub fn known_conversations(&self) -> Vec<ConversationId> {
        self.logs.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Append notifications, across all conversations.
    pub fn subscribe(&self) -> broadcast::Receiver<(ConversationId, Message)> {
        self.events.subscribe()
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    fn ingest(&self, inbound: InboundMessage) {
        let conversation = inbound.conversation_id.clone();
        let message = Message {
            conversation_id: inbound.conversation_id,
            role: Role::Peer,
            sender_id: inbound.sender_id,
            content: inbound.content,
            metadata: inbound.metadata,
            status: DeliveryStatus::Delivered,
            sent_at: chrono::Utc::now(),
        };
        self.append(&conversation, message);
    }
}

impl Drop for ConversationRouter {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

async fn pump_inbound(
    mut inbound: broadcast::Receiver<InboundMessage>,
    router: Weak<ConversationRouter>,
) {
    loop {
        match inbound.recv().await {
            Ok(message) => {
                let Some(router) = router.upgrade() else {
                    return;
                };
                router.ingest(message);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "inbound pump lagged, messages dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
