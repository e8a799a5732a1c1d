use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use haven_core::backend::{ChatBackend, ReplyEventStream, SessionStart};
use haven_core::config::ClientConfig;
use haven_core::errors::ClientError;
use haven_core::ids::ConversationId;
use haven_core::message::{ConversationSummary, DeliveryStatus, Message, Metadata, Role};

use crate::reply_stream::ReplyStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the conversation API. One instance per client; the
/// underlying connection pool is shared across all calls.
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.config.api_endpoint(path))
            .bearer_auth(self.config.token.expose_secret())
            .header("accept", "application/json")
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::from_status(status, body))
    }
}

/// One persisted message as the history endpoint returns it. The wire
/// records carry no conversation id; the caller fills it in.
#[derive(Debug, Deserialize)]
struct HistoryRecord {
    role: Role,
    content: String,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    fn into_message(self, conversation_id: &ConversationId) -> Message {
        Message {
            conversation_id: conversation_id.clone(),
            role: self.role,
            sender_id: None,
            content: self.content,
            metadata: self.metadata,
            status: DeliveryStatus::Delivered,
            sent_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    messages: Vec<HistoryRecord>,
}

#[derive(Debug, Serialize)]
struct StartSessionBody<'a> {
    category: &'a str,
}

#[derive(Debug, Serialize)]
struct NotesBody<'a> {
    notes: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    content: &'a str,
}

#[async_trait]
impl ChatBackend for ApiClient {
    #[instrument(skip(self))]
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let resp = self
            .request(reqwest::Method::GET, "api/chats")
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn start_session(&self, category: &str) -> Result<SessionStart, ClientError> {
        let resp = self
            .request(reqwest::Method::POST, "api/sessions")
            .json(&StartSessionBody { category })
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))
    }

    #[instrument(skip(self), fields(conversation = %conversation_id))]
    async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ClientError> {
        let mut req = self.request(
            reqwest::Method::GET,
            &format!("api/sessions/{conversation_id}"),
        );
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        let history: HistoryResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Ok(history
            .messages
            .into_iter()
            .map(|r| r.into_message(conversation_id))
            .collect())
    }

    #[instrument(skip(self, notes), fields(conversation = %conversation_id))]
    async fn set_notes(
        &self,
        conversation_id: &ConversationId,
        notes: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("api/sessions/{conversation_id}/notes"),
            )
            .json(&NotesBody { notes })
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, content), fields(conversation = %conversation_id))]
    async fn stream_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> Result<ReplyEventStream, ClientError> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("api/sessions/{conversation_id}/messages"),
            )
            .json(&SendMessageBody { content })
            .send()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        let resp = Self::check(resp).await?;

        let byte_stream = resp.bytes_stream();
        Ok(Box::pin(ReplyStream::new(byte_stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::ids::ParticipantId;

    fn config() -> ClientConfig {
        ClientConfig::new(
            "http://localhost:8000",
            "ws://localhost:8000/ws",
            "test-token",
            ParticipantId::from_raw("u1"),
        )
    }

    #[test]
    fn client_builds() {
        assert!(ApiClient::new(config()).is_ok());
    }

    #[test]
    fn history_record_fills_conversation_id() {
        let record: HistoryRecord = serde_json::from_str(
            r#"{"role":"assistant","content":"hi","created_at":"2026-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        let conv = ConversationId::from_raw("sess-9");
        let msg = record.into_message(&conv);
        assert_eq!(msg.conversation_id.as_str(), "sess-9");
        assert_eq!(msg.role, Role::Peer);
        assert_eq!(msg.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn history_record_without_timestamp_defaults_to_now() {
        let record: HistoryRecord =
            serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        let before = Utc::now();
        let msg = record.into_message(&ConversationId::from_raw("s"));
        assert!(msg.sent_at >= before);
    }

    #[test]
    fn history_response_shape() {
        let resp: HistoryResponse = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.messages.len(), 2);
    }

    #[test]
    fn connect_timeout_constant() {
        assert_eq!(CONNECT_TIMEOUT, Duration::from_secs(30));
    }
}
