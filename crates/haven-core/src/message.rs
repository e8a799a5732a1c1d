use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, ParticipantId};

/// Who authored a message. The wire uses `assistant` for the remote
/// responder; locally that role is `peer` so human listeners and AI
/// responders read the same.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[serde(alias = "assistant")]
    Peer,
    System,
}

/// Delivery status of a locally-originated message. Inbound and persisted
/// messages are `delivered` by definition; optimistic appends start
/// `pending` and are reconciled exactly once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    #[default]
    Delivered,
    Failed,
}

/// Free-form key/value bag carried alongside a message. Keys are strings,
/// values are opaque to the core.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One entry in a conversation's ordered log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: ConversationId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn user(
        conversation_id: ConversationId,
        sender_id: ParticipantId,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            conversation_id,
            role: Role::User,
            sender_id: Some(sender_id),
            content: content.into(),
            metadata,
            status: DeliveryStatus::Pending,
            sent_at: Utc::now(),
        }
    }

    pub fn peer(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role: Role::Peer,
            sender_id: None,
            content: content.into(),
            metadata: None,
            status: DeliveryStatus::Delivered,
            sent_at: Utc::now(),
        }
    }

    /// Local-only notice (welcome text, timer expiry). Never sent anywhere.
    pub fn system(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role: Role::System,
            sender_id: None,
            content: content.into(),
            metadata: None,
            status: DeliveryStatus::Delivered,
            sent_at: Utc::now(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// A conversation as listed by the backend: identity plus display fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(rename = "session_id")]
    pub conversation_id: ConversationId,
    pub category: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
