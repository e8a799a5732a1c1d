use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Future, Stream};

use haven_core::errors::ClientError;
use haven_core::reply::ReplyEvent;

use crate::ndjson::NdjsonParser;

pub(crate) const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Wraps a byte stream from reqwest and yields ReplyEvents.
/// Includes an idle timeout: if no data arrives within `idle_duration`,
/// emits a terminal error and ends.
pub struct ReplyStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: NdjsonParser,
    pending: Vec<ReplyEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    done: bool,
}

impl ReplyStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self::with_idle_timeout(byte_stream, STREAM_IDLE_TIMEOUT)
    }

    pub(crate) fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: NdjsonParser::new(),
            pending: Vec::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            done: false,
        }
    }
}

impl Stream for ReplyStream {
    type Item = ReplyEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Return pending events first
        if !self.pending.is_empty() {
            return Poll::Ready(Some(self.pending.remove(0)));
        }
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    // Data received, reset idle timer.
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    let events = self.parser.push(&bytes);
                    self.pending.extend(events);

                    if !self.pending.is_empty() {
                        return Poll::Ready(Some(self.pending.remove(0)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(ReplyEvent::Error {
                        error: ClientError::StreamInterrupted(e.to_string()),
                    }));
                }
                Poll::Ready(None) => {
                    // Stream ended; flush any unterminated trailing record.
                    self.done = true;
                    let events = self.parser.finish();
                    self.pending.extend(events);
                    if !self.pending.is_empty() {
                        return Poll::Ready(Some(self.pending.remove(0)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    // No data available, check the idle timeout.
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.done = true;
                        return Poll::Ready(Some(ReplyEvent::Error {
                            error: ClientError::StreamInterrupted(format!(
                                "idle timeout after {}s",
                                self.idle_duration.as_secs()
                            )),
                        }));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunks(parts: &[&str]) -> Vec<Result<bytes::Bytes, reqwest::Error>> {
        parts
            .iter()
            .map(|p| Ok(bytes::Bytes::from(p.to_string())))
            .collect()
    }

    async fn collect_content(mut stream: Pin<Box<ReplyStream>>) -> (String, Option<ClientError>) {
        let mut content = String::new();
        let mut error = None;
        while let Some(event) = stream.next().await {
            match event {
                ReplyEvent::Delta { content: c } => content.push_str(&c),
                ReplyEvent::Error { error: e } => error = Some(e),
            }
        }
        (content, error)
    }

    #[tokio::test]
    async fn assembles_deltas_in_order() {
        let byte_stream = futures::stream::iter(chunks(&[
            "{\"type\":\"delta\",\"content\":\"The \"}\n",
            "{\"type\":\"delta\",\"content\":\"answer \"}\n{\"type\":\"delta\",\"content\":\"is 42.\"}\n",
        ]));
        let stream = Box::pin(ReplyStream::new(byte_stream));
        let (content, error) = collect_content(stream).await;
        assert_eq!(content, "The answer is 42.");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn record_split_across_network_chunks() {
        let byte_stream = futures::stream::iter(chunks(&[
            "{\"type\":\"de",
            "lta\",\"content",
            "\":\"split\"}\n",
        ]));
        let stream = Box::pin(ReplyStream::new(byte_stream));
        let (content, error) = collect_content(stream).await;
        assert_eq!(content, "split");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn malformed_line_keeps_assembling() {
        let byte_stream = futures::stream::iter(chunks(&[
            "{\"type\":\"delta\",\"content\":\"He\"}\n",
            "garbage not json\n",
            "{\"type\":\"delta\",\"content\":\"llo\"}\n",
        ]));
        let stream = Box::pin(ReplyStream::new(byte_stream));
        let (content, error) = collect_content(stream).await;
        assert_eq!(content, "Hello");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn idle_timeout_fires_when_no_data() {
        tokio::time::pause();

        let byte_stream = futures::stream::pending::<Result<bytes::Bytes, reqwest::Error>>();
        let mut stream = Box::pin(ReplyStream::with_idle_timeout(
            byte_stream,
            Duration::from_secs(5),
        ));

        tokio::time::advance(Duration::from_secs(6)).await;

        let event = stream.next().await;
        assert!(
            matches!(&event, Some(ReplyEvent::Error { error: ClientError::StreamInterrupted(msg) }) if msg.contains("idle timeout")),
            "expected idle timeout error, got: {event:?}"
        );
        // Error is terminal; stream ends after it.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn idle_timeout_resets_on_data() {
        tokio::time::pause();

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<bytes::Bytes, reqwest::Error>>(16);
        let rx_stream = tokio_stream::wrappers::ReceiverStream::new(rx);
        let mut stream = Box::pin(ReplyStream::with_idle_timeout(
            rx_stream,
            Duration::from_secs(5),
        ));

        tx.send(Ok(bytes::Bytes::from(
            "{\"type\":\"delta\",\"content\":\"a\"}\n",
        )))
        .await
        .unwrap();
        let _event = stream.next().await;

        // Less than the timeout from the reset point.
        tokio::time::advance(Duration::from_secs(4)).await;

        tx.send(Ok(bytes::Bytes::from(
            "{\"type\":\"delta\",\"content\":\"b\"}\n",
        )))
        .await
        .unwrap();
        let _event = stream.next().await;

        drop(tx);
        let event = stream.next().await;
        assert!(event.is_none(), "expected stream end, got: {event:?}");
    }

    #[tokio::test]
    async fn partial_content_kept_before_interruption() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<bytes::Bytes, reqwest::Error>>(16);
        let rx_stream = tokio_stream::wrappers::ReceiverStream::new(rx);
        let mut stream = Box::pin(ReplyStream::new(rx_stream));

        tx.send(Ok(bytes::Bytes::from(
            "{\"type\":\"delta\",\"content\":\"partial\"}\n",
        )))
        .await
        .unwrap();

        let event = stream.next().await;
        assert!(matches!(event, Some(ReplyEvent::Delta { ref content }) if content == "partial"));
    }

    #[tokio::test]
    async fn trailing_record_flushed_at_end() {
        let byte_stream =
            futures::stream::iter(chunks(&["{\"type\":\"delta\",\"content\":\"tail\"}"]));
        let stream = Box::pin(ReplyStream::new(byte_stream));
        let (content, error) = collect_content(stream).await;
        assert_eq!(content, "tail");
        assert!(error.is_none());
    }

    #[test]
    fn idle_timeout_constant() {
        assert_eq!(STREAM_IDLE_TIMEOUT, Duration::from_secs(90));
    }
}
