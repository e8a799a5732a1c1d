use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use haven_core::errors::ClientError;
use haven_core::frames::OutboundFrame;
use haven_core::ids::ParticipantId;

use crate::transport::{Transport, TransportLink};

/// Test-side handles for one scripted connection: inject inbound raw frames,
/// observe outbound frames.
pub struct ScriptedLink {
    pub inbound: mpsc::Sender<String>,
    pub outbound: mpsc::Receiver<OutboundFrame>,
}

enum ConnectOutcome {
    Link(TransportLink),
    Fail(ClientError),
}

/// Transport double that hands out pre-built channel pairs in sequence.
#[derive(Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<ConnectOutcome>>,
    connected: Mutex<Vec<ParticipantId>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection; returns the test-side handles.
    pub fn push_link(&self) -> ScriptedLink {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        self.outcomes
            .lock()
            .push_back(ConnectOutcome::Link(TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            }));
        ScriptedLink {
            inbound: in_tx,
            outbound: out_rx,
        }
    }

    /// Queue a connection failure.
    pub fn push_failure(&self, error: ClientError) {
        self.outcomes.lock().push_back(ConnectOutcome::Fail(error));
    }

    /// Identities passed to connect, in call order.
    pub fn connected_participants(&self) -> Vec<ParticipantId> {
        self.connected.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connected.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, participant: &ParticipantId) -> Result<TransportLink, ClientError> {
        self.connected.lock().push(participant.clone());
        match self.outcomes.lock().pop_front() {
            Some(ConnectOutcome::Link(link)) => Ok(link),
            Some(ConnectOutcome::Fail(error)) => Err(error),
            None => Err(ClientError::ConnectionFailed(
                "ScriptedTransport: no connection scripted for this call".into(),
            )),
        }
    }
}
