use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use haven_core::errors::ClientError;
use haven_core::frames::{parse_inbound, ConnectionState, InboundMessage, OutboundFrame, ParsedFrame};
use haven_core::ids::ParticipantId;

use crate::transport::Transport;

const INBOUND_FANOUT: usize = 256;

struct ActiveChannel {
    participant: ParticipantId,
    outbound: tokio::sync::mpsc::Sender<OutboundFrame>,
    reader: JoinHandle<()>,
}

/// Owns the single persistent channel to the server.
///
/// `open` is idempotent per identity: reopening as the same participant
/// while connected is a no-op, while a different identity tears the old
/// channel down first. A remote disconnect surfaces as a `disconnected`
/// state transition; reconnection is always an explicit `open`, never a
/// silent retry.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: broadcast::Sender<InboundMessage>,
    active: Mutex<Option<ActiveChannel>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (inbound_tx, _) = broadcast::channel(INBOUND_FANOUT);
        Self {
            transport,
            state_tx,
            inbound_tx,
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Receive every well-formed inbound message, across all conversations.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound_tx.subscribe()
    }

    /// Establish the channel as `participant`.
    pub async fn open(&self, participant: ParticipantId) -> Result<(), ClientError> {
        let mut active = self.active.lock().await;

        if let Some(channel) = active.as_ref() {
            if channel.participant == participant && self.state() == ConnectionState::Connected {
                debug!(participant = %participant, "already connected as this identity");
                return Ok(());
            }
        }
        // Stale channel or identity switch: tear down before redialing.
        if let Some(old) = active.take() {
            old.reader.abort();
            drop(old.outbound);
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }

        self.state_tx.send_replace(ConnectionState::Connecting);

        let link = match self.transport.connect(&participant).await {
            Ok(link) => link,
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let reader = tokio::spawn(read_loop(
            link.inbound,
            self.inbound_tx.clone(),
            self.state_tx.clone(),
        ));

        *active = Some(ActiveChannel {
            participant: participant.clone(),
            outbound: link.outbound,
            reader,
        });
        self.state_tx.send_replace(ConnectionState::Connected);
        info!(participant = %participant, "channel connected");
        Ok(())
    }

    /// Enqueue a frame on the active channel.
    ///
    /// The sender is cloned out of the guard first: a send stalled on queue
    /// backpressure must not hold the lock `open`/`close` need.
    pub async fn send_frame(&self, frame: OutboundFrame) -> Result<(), ClientError> {
        let outbound = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(channel) if self.state() == ConnectionState::Connected => {
                    channel.outbound.clone()
                }
                _ => return Err(ClientError::NotConnected),
            }
        };
        outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Tear down the channel and notify subscribers.
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if let Some(channel) = active.take() {
            channel.reader.abort();
            drop(channel.outbound);
            info!(participant = %channel.participant, "channel closed");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

/// Parse inbound raw frames at the boundary and fan out the good ones.
///
/// Malformed frames and frames without a usable conversation id are dropped
/// with a log line; unknown frame types are ignored. The loop ending means
/// the transport closed, which is published as a disconnect.
async fn read_loop(
    mut inbound: tokio::sync::mpsc::Receiver<String>,
    inbound_tx: broadcast::Sender<InboundMessage>,
    state_tx: watch::Sender<ConnectionState>,
) {
    while let Some(text) = inbound.recv().await {
        match parse_inbound(&text) {
            Ok(ParsedFrame::Message(msg)) => {
                if msg.conversation_id.is_empty() {
                    warn!("dropping inbound message without conversation id");
                    continue;
                }
                let _ = inbound_tx.send(msg);
            }
            Ok(ParsedFrame::Unknown(frame_type)) => {
                trace!(frame_type = %frame_type, "ignoring unknown frame type");
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed inbound frame");
            }
        }
    }
    state_tx.send_replace(ConnectionState::Disconnected);
}
