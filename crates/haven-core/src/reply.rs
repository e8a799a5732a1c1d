use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// Events yielded while a streamed reply is being assembled.
///
/// Ordering contract: `Delta*` then either the stream ends (reply complete)
/// or a single `Error` terminates it. Partial content accumulated before an
/// error is kept, never discarded.
#[derive(Clone, Debug)]
pub enum ReplyEvent {
    Delta { content: String },
    Error { error: ClientError },
}

impl ReplyEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// One newline-delimited record of the streamed-reply wire format. Records
/// with any other `type` are ignored by the assembler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplyRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ReplyRecord {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            record_type: "delta".into(),
            content: Some(content.into()),
        }
    }

    /// The delta content, if this record contributes any.
    pub fn as_delta(&self) -> Option<&str> {
        if self.record_type == "delta" {
            self.content.as_deref()
        } else {
            None
        }
    }
}
