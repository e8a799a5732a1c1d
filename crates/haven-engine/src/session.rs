use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use haven_core::backend::ChatBackend;
use haven_core::errors::ClientError;
use haven_core::ids::{ConversationId, ParticipantId};
use haven_core::message::{ConversationSummary, Message, Metadata};
use haven_socket::ConnectionManager;

use crate::assembler::ReplyAssembler;
use crate::history::HistoryLoader;
use crate::router::ConversationRouter;
use crate::timer::{SessionTimer, TimerEvent, TimerState, DEFAULT_SESSION_BUDGET_SECS};
use crate::welcome::WelcomeCatalog;

/// System notice appended to the active log when the budget runs out.
pub const EXPIRY_NOTICE: &str = "Time's up — session ended.";

const SIGNAL_FANOUT: usize = 16;

/// Out-of-band events the caller reacts to.
#[derive(Clone, Debug)]
pub enum SessionSignal {
    /// The session budget expired. The caller decides the renewal outcome:
    /// `renew` the same conversation or `start` a new one.
    Expired { conversation: ConversationId },
}

/// Facade over the connection, router, assembler, timer and history loader.
///
/// One active conversation at a time; switching away leaves the previous
/// log (and any assembly still streaming into it) intact in the background.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    connection: Arc<ConnectionManager>,
    router: Arc<ConversationRouter>,
    assembler: ReplyAssembler,
    loader: HistoryLoader,
    timer: Arc<SessionTimer>,
    budget_secs: u64,
    active: Arc<Mutex<Option<ConversationId>>>,
    signals: broadcast::Sender<SessionSignal>,
    expiry_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        connection: Arc<ConnectionManager>,
        participant: ParticipantId,
    ) -> Self {
        Self::with_options(
            backend,
            connection,
            participant,
            WelcomeCatalog::default(),
            DEFAULT_SESSION_BUDGET_SECS,
        )
    }

    pub fn with_options(
        backend: Arc<dyn ChatBackend>,
        connection: Arc<ConnectionManager>,
        participant: ParticipantId,
        welcome: WelcomeCatalog,
        budget_secs: u64,
    ) -> Self {
        let timer = Arc::new(SessionTimer::new());
        let router =
            ConversationRouter::new(Arc::clone(&connection), Arc::clone(&timer), participant);
        let assembler = ReplyAssembler::new(Arc::clone(&backend), Arc::clone(&router));
        let loader = HistoryLoader::new(Arc::clone(&backend), Arc::clone(&router), welcome);
        let (signals, _) = broadcast::channel(SIGNAL_FANOUT);
        let active = Arc::new(Mutex::new(None));

        let expiry_task = tokio::spawn(watch_expiry(
            timer.subscribe(),
            Arc::clone(&router),
            Arc::clone(&active),
            signals.clone(),
        ));

        Self {
            backend,
            connection,
            router,
            assembler,
            loader,
            timer,
            budget_secs,
            active,
            signals,
            expiry_task: Mutex::new(Some(expiry_task)),
        }
    }

    /// Dial the persistent channel as this session's participant.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.connection
            .open(self.router.participant().clone())
            .await
    }

    /// Create a new conversation under `category` and make it active.
    #[instrument(skip(self))]
    pub async fn start(&self, category: &str) -> Result<ConversationId, ClientError> {
        let started = self.backend.start_session(category).await?;
        let conversation = started.conversation_id;
        self.router.join(&conversation).await?;
        self.loader.load(&conversation, &started.category).await?;
        self.timer.arm(self.budget_secs);
        *self.active.lock() = Some(conversation.clone());
        info!(conversation = %conversation, category = %started.category, "session started");
        Ok(conversation)
    }

    /// Switch to an existing conversation: fresh history, fresh budget. An
    /// assembly still in flight for the previous conversation keeps
    /// streaming into its now-background log.
    #[instrument(skip(self), fields(conversation = %conversation))]
    pub async fn select(&self, conversation: ConversationId) -> Result<(), ClientError> {
        self.timer.cancel();
        self.router.join(&conversation).await?;
        let category = self
            .backend
            .list_conversations()
            .await
            .ok()
            .and_then(|list| {
                list.into_iter()
                    .find(|summary| summary.conversation_id == conversation)
                    .map(|summary| summary.category)
            })
            .unwrap_or_default();
        self.loader.load(&conversation, &category).await?;
        self.timer.arm(self.budget_secs);
        *self.active.lock() = Some(conversation);
        Ok(())
    }

    /// Send on the active conversation and stream the reply into its log.
    pub async fn send(&self, text: &str) -> Result<usize, ClientError> {
        let conversation = self.require_active()?;
        self.check_gate()?;
        if self.assembler.is_in_flight(&conversation) {
            return Err(ClientError::ReplyInFlight);
        }

        let message = Message::user(
            conversation.clone(),
            self.router.participant().clone(),
            text,
            None,
        );
        let index = self.router.append(&conversation, message);

        match self.assembler.dispatch(&conversation, text).await {
            Ok(_) => {
                // The POST carried the user message to the server.
                self.router.mark_delivered(&conversation, index);
                Ok(index)
            }
            Err(e) => {
                self.router.mark_failed(&conversation, index);
                Err(e)
            }
        }
    }

    /// Send a peer-to-peer message on the persistent channel instead of the
    /// streamed-reply path.
    pub async fn send_direct(
        &self,
        text: &str,
        metadata: Option<Metadata>,
    ) -> Result<usize, ClientError> {
        let conversation = self.require_active()?;
        self.router.send(&conversation, text, metadata).await
    }

    /// Re-arm the budget after expiry (or mid-session).
    pub fn renew(&self, budget_secs: u64) {
        self.timer.continue_with(budget_secs);
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        self.backend.list_conversations().await
    }

    pub async fn set_notes(&self, notes: &str) -> Result<(), ClientError> {
        let conversation = self.require_active()?;
        self.backend.set_notes(&conversation, notes).await
    }

    /// The active conversation's log, in arrival order.
    pub fn messages(&self) -> Vec<Message> {
        match self.active.lock().clone() {
            Some(conversation) => self.router.messages_for(&conversation),
            None => Vec::new(),
        }
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.active.lock().clone()
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer.state()
    }

    pub fn remaining_secs(&self) -> u64 {
        self.timer.remaining()
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    pub fn router(&self) -> &Arc<ConversationRouter> {
        &self.router
    }

    /// Shut the session down: every in-flight assembly is cancelled and its
    /// placeholder finalized `failed`, the timer stops, the channel closes.
    pub async fn close(&self) {
        self.assembler.cancel_all().await;
        self.timer.cancel();
        self.connection.close().await;
        if let Some(task) = self.expiry_task.lock().take() {
            task.abort();
        }
    }

    fn require_active(&self) -> Result<ConversationId, ClientError> {
        self.active
            .lock()
            .clone()
            .ok_or_else(|| ClientError::SessionInactive("no active conversation".into()))
    }

    fn check_gate(&self) -> Result<(), ClientError> {
        match self.timer.state() {
            TimerState::Running { remaining, .. } if remaining > 0 => Ok(()),
            TimerState::Expired => Err(ClientError::SessionInactive("session expired".into())),
            _ => Err(ClientError::SessionInactive("no running session".into())),
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.expiry_task.lock().take() {
            task.abort();
        }
    }
}

async fn watch_expiry(
    mut events: broadcast::Receiver<TimerEvent>,
    router: Arc<ConversationRouter>,
    active: Arc<Mutex<Option<ConversationId>>>,
    signals: broadcast::Sender<SessionSignal>,
) {
    loop {
        match events.recv().await {
            Ok(TimerEvent::Expired) => {
                let conversation = active.lock().clone();
                if let Some(conversation) = conversation {
                    router.append(
                        &conversation,
                        Message::system(conversation.clone(), EXPIRY_NOTICE),
                    );
                    let _ = signals.send(SessionSignal::Expired { conversation });
                }
            }
            Ok(TimerEvent::Tick { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
