use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, ParticipantId};
use crate::message::Metadata;

/// Lifecycle of the persistent channel. Exactly one connection is active per
/// manager; reconnection is an explicit caller decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Frames the client emits on the persistent channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    SendMessage {
        conversation_id: ConversationId,
        sender_id: ParticipantId,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    JoinConversation {
        conversation_id: ConversationId,
    },
    LeaveConversation {
        conversation_id: ConversationId,
    },
}

impl OutboundFrame {
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::JoinConversation { .. } => "join_conversation",
            Self::LeaveConversation { .. } => "leave_conversation",
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::SendMessage { conversation_id, .. }
            | Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id } => conversation_id,
        }
    }
}

/// A peer message delivered on the persistent channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Outcome of parsing one raw inbound frame.
#[derive(Debug)]
pub enum ParsedFrame {
    /// A well-formed `message` frame.
    Message(InboundMessage),
    /// A frame type this client does not know. Ignored for forward
    /// compatibility.
    Unknown(String),
}

/// Parse a raw text frame from the persistent channel.
///
/// Frames without a usable conversation id are an error: the caller drops
/// them (with a log line) rather than crashing or routing them anywhere.
pub fn parse_inbound(text: &str) -> Result<ParsedFrame, serde_json::Error> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(rename = "type", default)]
        frame_type: Option<String>,
        #[serde(flatten)]
        rest: serde_json::Value,
    }

    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.frame_type.as_deref() {
        // Untyped frames are treated as messages; the server's fan-out emits
        // the payload bare on the `message` event.
        Some("message") | None => {
            let msg: InboundMessage = serde_json::from_value(envelope.rest)?;
            Ok(ParsedFrame::Message(msg))
        }
        Some(other) => Ok(ParsedFrame::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_send_message_wire_shape() {
        let frame = OutboundFrame::SendMessage {
            conversation_id: ConversationId::from_raw("c1"),
            sender_id: ParticipantId::from_raw("listener-9"),
            content: "I hear you".into(),
            metadata: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "send_message");
        assert_eq!(json["conversation_id"], "c1");
        assert_eq!(json["sender_id"], "listener-9");
        assert_eq!(json["content"], "I hear you");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn outbound_join_leave_wire_shape() {
        let join = OutboundFrame::JoinConversation {
            conversation_id: ConversationId::from_raw("c2"),
        };
        let json = serde_json::to_value(&join).unwrap();
        assert_eq!(json["type"], "join_conversation");
        assert_eq!(json["conversation_id"], "c2");

        let leave = OutboundFrame::LeaveConversation {
            conversation_id: ConversationId::from_raw("c2"),
        };
        assert_eq!(leave.frame_type(), "leave_conversation");
        assert_eq!(leave.conversation_id().as_str(), "c2");
    }

    #[test]
    fn parse_typed_message_frame() {
        let text = r#"{"type":"message","conversation_id":"c1","sender_id":"u2","content":"hey"}"#;
        match parse_inbound(text).unwrap() {
            ParsedFrame::Message(msg) => {
                assert_eq!(msg.conversation_id.as_str(), "c1");
                assert_eq!(msg.sender_id.unwrap().as_str(), "u2");
                assert_eq!(msg.content, "hey");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn parse_bare_message_frame() {
        let text = r#"{"conversation_id":"c1","content":"hey","metadata":{"k":"v"}}"#;
        match parse_inbound(text).unwrap() {
            ParsedFrame::Message(msg) => {
                assert_eq!(msg.metadata.unwrap()["k"], "v");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_type_is_not_an_error() {
        let text = r#"{"type":"typing_indicator","conversation_id":"c1"}"#;
        match parse_inbound(text).unwrap() {
            ParsedFrame::Unknown(t) => assert_eq!(t, "typing_indicator"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn missing_conversation_id_is_an_error() {
        let text = r#"{"type":"message","content":"orphan"}"#;
        assert!(parse_inbound(text).is_err());
    }

    #[test]
    fn unparseable_payload_is_an_error() {
        assert!(parse_inbound("not json at all").is_err());
        assert!(parse_inbound(r#"{"type":"message","conversation_id":42}"#).is_err());
    }
}
