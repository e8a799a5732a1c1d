pub mod backend;
pub mod config;
pub mod errors;
pub mod frames;
pub mod ids;
pub mod message;
pub mod reply;

pub use backend::{ChatBackend, ReplyEventStream, SessionStart};
pub use config::ClientConfig;
pub use errors::ClientError;
pub use frames::{parse_inbound, ConnectionState, InboundMessage, OutboundFrame, ParsedFrame};
pub use ids::{ConversationId, ParticipantId};
pub use message::{ConversationSummary, DeliveryStatus, Message, Metadata, Role};
pub use reply::{ReplyEvent, ReplyRecord};
