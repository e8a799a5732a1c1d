use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use haven_core::config::ClientConfig;
use haven_core::errors::ClientError;
use haven_core::ids::ParticipantId;

use crate::transport::{Transport, TransportLink};

const SEND_QUEUE: usize = 64;

/// Production transport over `tokio-tungstenite`.
///
/// The participant id and bearer token ride in the handshake query string;
/// after the upgrade the socket is split into a writer task (serializing
/// outbound frames) and a reader task (forwarding raw text frames).
pub struct WsTransport {
    config: ClientConfig,
}

impl WsTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    fn handshake_url(&self, participant: &ParticipantId) -> String {
        format!(
            "{}?participant_id={}&token={}",
            self.config.socket_url,
            participant,
            self.config.token.expose_secret(),
        )
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, participant: &ParticipantId) -> Result<TransportLink, ClientError> {
        let url = self.handshake_url(participant);
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<haven_core::frames::OutboundFrame>(SEND_QUEUE);
        let (in_tx, in_rx) = mpsc::channel::<String>(SEND_QUEUE);

        // Writer task: serialize and send outbound frames. Ends when the
        // manager drops its sender or the socket rejects a write.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, frame = frame.frame_type(), "failed to serialize outbound frame");
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader task: forward raw text frames. Dropping `in_tx` on exit is
        // how a remote disconnect reaches the manager.
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                match msg {
                    WsMessage::Text(text) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    // tungstenite answers pings itself
                    _ => {}
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_url_carries_identity_and_token() {
        let config = ClientConfig::new(
            "http://localhost:8000",
            "ws://localhost:8000/ws",
            "tok-123",
            ParticipantId::from_raw("user-7"),
        );
        let transport = WsTransport::new(config);
        let url = transport.handshake_url(&ParticipantId::from_raw("user-7"));
        assert_eq!(
            url,
            "ws://localhost:8000/ws?participant_id=user-7&token=tok-123"
        );
    }
}
