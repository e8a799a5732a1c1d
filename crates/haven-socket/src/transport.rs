use async_trait::async_trait;
use tokio::sync::mpsc;

use haven_core::errors::ClientError;
use haven_core::frames::OutboundFrame;
use haven_core::ids::ParticipantId;

/// A live duplex channel: frames out, raw text frames in.
///
/// Dropping the outbound sender closes the channel from our side; the
/// inbound receiver yielding `None` means the remote side (or the
/// transport's reader task) closed it.
pub struct TransportLink {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<String>,
}

/// Dials the persistent channel for one participant identity.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, participant: &ParticipantId) -> Result<TransportLink, ClientError>;
}
