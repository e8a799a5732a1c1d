use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use haven_core::backend::{ChatBackend, ReplyEventStream, SessionStart};
use haven_core::errors::ClientError;
use haven_core::ids::ConversationId;
use haven_core::message::{ConversationSummary, Message};
use haven_core::reply::ReplyEvent;

/// Pre-programmed replies for deterministic testing without a server.
pub enum MockReply {
    /// Yield a sequence of ReplyEvents.
    Stream(Vec<ReplyEvent>),
    /// Return an error from the stream_message() call itself.
    Error(ClientError),
    /// Wait a duration, then yield the inner reply.
    Delay(Duration, Box<MockReply>),
    /// A stream that never yields, for exercising in-flight states.
    Pending,
}

impl MockReply {
    /// Convenience: a reply delivered as per-word deltas.
    pub fn text(text: &str) -> Self {
        let events = text
            .split_inclusive(' ')
            .map(|word| ReplyEvent::Delta {
                content: word.to_string(),
            })
            .collect();
        Self::Stream(events)
    }

    /// Convenience: some deltas followed by a terminal error event.
    pub fn interrupted(partial: &str, error: ClientError) -> Self {
        Self::Stream(vec![
            ReplyEvent::Delta {
                content: partial.to_string(),
            },
            ReplyEvent::Error { error },
        ])
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Scripted backend that returns pre-programmed results in sequence.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    summaries: Mutex<Vec<ConversationSummary>>,
    histories: Mutex<VecDeque<Result<Vec<Message>, ClientError>>>,
    sessions: Mutex<VecDeque<Result<SessionStart, ClientError>>>,
    sent: Mutex<Vec<(ConversationId, String)>>,
    notes: Mutex<Vec<(ConversationId, String)>>,
    started_categories: Mutex<Vec<String>>,
    history_delay: Mutex<Option<Duration>>,
    stream_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn set_summaries(&self, summaries: Vec<ConversationSummary>) {
        *self.summaries.lock() = summaries;
    }

    pub fn push_history(&self, history: Result<Vec<Message>, ClientError>) {
        self.histories.lock().push_back(history);
    }

    /// Make fetch_history wait before resolving, for exercising load-vs-live
    /// races.
    pub fn set_history_delay(&self, delay: Duration) {
        *self.history_delay.lock() = Some(delay);
    }

    pub fn push_session(&self, session: Result<SessionStart, ClientError>) {
        self.sessions.lock().push_back(session);
    }

    /// Messages passed to stream_message, in call order.
    pub fn sent_messages(&self) -> Vec<(ConversationId, String)> {
        self.sent.lock().clone()
    }

    pub fn notes_updates(&self) -> Vec<(ConversationId, String)> {
        self.notes.lock().clone()
    }

    pub fn started_categories(&self) -> Vec<String> {
        self.started_categories.lock().clone()
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(Ordering::Relaxed)
    }

    pub fn history_call_count(&self) -> usize {
        self.history_calls.load(Ordering::Relaxed)
    }
}

async fn resolve_reply(reply: MockReply) -> Result<ReplyEventStream, ClientError> {
    let mut current = reply;
    loop {
        match current {
            MockReply::Stream(events) => return Ok(Box::pin(stream::iter(events))),
            MockReply::Error(e) => return Err(e),
            MockReply::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockReply::Pending => return Ok(Box::pin(stream::pending())),
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        Ok(self.summaries.lock().clone())
    }

    async fn start_session(&self, category: &str) -> Result<SessionStart, ClientError> {
        self.started_categories.lock().push(category.to_string());
        match self.sessions.lock().pop_front() {
            Some(result) => result,
            None => Ok(SessionStart {
                conversation_id: ConversationId::new(),
                category: category.to_string(),
            }),
        }
    }

    async fn fetch_history(
        &self,
        _conversation_id: &ConversationId,
        _limit: Option<u32>,
    ) -> Result<Vec<Message>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        let delay = *self.history_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.histories.lock().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn set_notes(
        &self,
        conversation_id: &ConversationId,
        notes: &str,
    ) -> Result<(), ClientError> {
        self.notes
            .lock()
            .push((conversation_id.clone(), notes.to_string()));
        Ok(())
    }

    async fn stream_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> Result<ReplyEventStream, ClientError> {
        self.stream_calls.fetch_add(1, Ordering::Relaxed);
        self.sent
            .lock()
            .push((conversation_id.clone(), content.to_string()));

        let reply = self.replies.lock().pop_front().ok_or_else(|| {
            ClientError::InvalidRequest("MockBackend: no reply configured for this call".into())
        })?;
        resolve_reply(reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: ReplyEventStream) -> String {
        let mut content = String::new();
        while let Some(event) = stream.next().await {
            if let ReplyEvent::Delta { content: c } = event {
                content.push_str(&c);
            }
        }
        content
    }

    #[tokio::test]
    async fn text_reply_preserves_content() {
        let mock = MockBackend::new();
        mock.push_reply(MockReply::text("hello mock world"));
        let conv = ConversationId::from_raw("c1");
        let stream = mock.stream_message(&conv, "hi").await.unwrap();
        assert_eq!(collect(stream).await, "hello mock world");
        assert_eq!(mock.stream_call_count(), 1);
        assert_eq!(mock.sent_messages(), vec![(conv, "hi".to_string())]);
    }

    #[tokio::test]
    async fn sequential_replies_in_order() {
        let mock = MockBackend::new();
        mock.push_reply(MockReply::text("first"));
        mock.push_reply(MockReply::text("second"));
        let conv = ConversationId::from_raw("c1");
        let s1 = mock.stream_message(&conv, "a").await.unwrap();
        let s2 = mock.stream_message(&conv, "b").await.unwrap();
        assert_eq!(collect(s1).await, "first");
        assert_eq!(collect(s2).await, "second");
    }

    #[tokio::test]
    async fn exhausted_replies_error() {
        let mock = MockBackend::new();
        let conv = ConversationId::from_raw("c1");
        let result = mock.stream_message(&conv, "x").await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn interrupted_reply_keeps_partial() {
        let mock = MockBackend::new();
        mock.push_reply(MockReply::interrupted(
            "partial ",
            ClientError::StreamInterrupted("connection reset".into()),
        ));
        let conv = ConversationId::from_raw("c1");
        let mut stream = mock.stream_message(&conv, "x").await.unwrap();

        let first = stream.next().await;
        assert!(matches!(first, Some(ReplyEvent::Delta { ref content }) if content == "partial "));
        let second = stream.next().await;
        assert!(matches!(second, Some(ReplyEvent::Error { .. })));
    }

    #[tokio::test]
    async fn start_session_records_category() {
        let mock = MockBackend::new();
        let start = mock.start_session("Yama").await.unwrap();
        assert_eq!(start.category, "Yama");
        assert_eq!(mock.started_categories(), vec!["Yama".to_string()]);
    }

    #[tokio::test]
    async fn scripted_history_error() {
        let mock = MockBackend::new();
        mock.push_history(Err(ClientError::ServerError {
            status: 500,
            body: "boom".into(),
        }));
        let conv = ConversationId::from_raw("c1");
        let result = mock.fetch_history(&conv, None).await;
        assert!(matches!(result, Err(ClientError::ServerError { .. })));
        assert_eq!(mock.history_call_count(), 1);
    }

    #[tokio::test]
    async fn delayed_reply_waits() {
        tokio::time::pause();
        let mock = MockBackend::new();
        mock.push_reply(MockReply::delayed(
            Duration::from_secs(2),
            MockReply::text("late"),
        ));
        let conv = ConversationId::from_raw("c1");
        let start = tokio::time::Instant::now();
        let stream = mock.stream_message(&conv, "x").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(collect(stream).await, "late");
    }
}
