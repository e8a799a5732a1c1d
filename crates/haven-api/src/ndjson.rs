use haven_core::reply::{ReplyEvent, ReplyRecord};

/// Incremental parser for the newline-delimited streamed-reply body.
///
/// A record may span multiple underlying read chunks, so bytes are buffered
/// until a full newline-terminated line is available. Malformed lines are
/// skipped without aborting the rest of the stream; records of unknown type
/// are ignored for forward compatibility.
#[derive(Default)]
pub struct NdjsonParser {
    buffer: String,
}

impl NdjsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of response bytes, yielding any deltas completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ReplyEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// The stream has ended; parse any trailing line that never got its
    /// newline.
    pub fn finish(&mut self) -> Vec<ReplyEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(rest.trim_end_matches('\r')).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<ReplyEvent> {
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<ReplyRecord>(line) {
        Ok(record) => record
            .as_delta()
            .map(|content| ReplyEvent::Delta { content: content.to_string() }),
        Err(err) => {
            tracing::trace!(error = %err, "skipping malformed stream record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(events: Vec<ReplyEvent>) -> String {
        events
            .into_iter()
            .map(|e| match e {
                ReplyEvent::Delta { content } => content,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn single_chunk() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(b"{\"type\":\"delta\",\"content\":\"Hello\"}\n");
        assert_eq!(deltas(events), "Hello");
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn record_split_across_chunks() {
        let mut parser = NdjsonParser::new();
        assert!(parser.push(b"{\"type\":\"del").is_empty());
        assert!(parser.push(b"ta\",\"content\":\"Hi\"").is_empty());
        let events = parser.push(b"}\n");
        assert_eq!(deltas(events), "Hi");
    }

    #[test]
    fn chunk_split_invariance() {
        let wire = b"{\"type\":\"delta\",\"content\":\"The \"}\n{\"type\":\"delta\",\"content\":\"quick \"}\n{\"type\":\"delta\",\"content\":\"brown fox\"}\n";

        // One chunk.
        let mut whole = NdjsonParser::new();
        let mut out_whole = deltas(whole.push(wire));
        out_whole.push_str(&deltas(whole.finish()));

        // Twenty arbitrary chunks (byte-by-byte boundaries included).
        let mut split = NdjsonParser::new();
        let mut out_split = String::new();
        for piece in wire.chunks(wire.len() / 20 + 1) {
            out_split.push_str(&deltas(split.push(piece)));
        }
        out_split.push_str(&deltas(split.finish()));

        assert_eq!(out_whole, "The quick brown fox");
        assert_eq!(out_whole, out_split);
    }

    #[test]
    fn malformed_line_between_valid_records() {
        let mut parser = NdjsonParser::new();
        let wire = b"{\"type\":\"delta\",\"content\":\"He\"}\nnot json {{{\n{\"type\":\"delta\",\"content\":\"llo\"}\n";
        assert_eq!(deltas(parser.push(wire)), "Hello");
    }

    #[test]
    fn unknown_record_types_ignored() {
        let mut parser = NdjsonParser::new();
        let wire = b"{\"type\":\"usage\",\"tokens\":42}\n{\"type\":\"delta\",\"content\":\"ok\"}\n{\"type\":\"done\"}\n";
        assert_eq!(deltas(parser.push(wire)), "ok");
    }

    #[test]
    fn blank_lines_skipped() {
        let mut parser = NdjsonParser::new();
        let wire = b"\n\n{\"type\":\"delta\",\"content\":\"x\"}\n\r\n";
        assert_eq!(deltas(parser.push(wire)), "x");
    }

    #[test]
    fn trailing_record_without_newline() {
        let mut parser = NdjsonParser::new();
        assert!(parser.push(b"{\"type\":\"delta\",\"content\":\"tail\"}").is_empty());
        assert_eq!(deltas(parser.finish()), "tail");
    }

    #[test]
    fn crlf_line_endings() {
        let mut parser = NdjsonParser::new();
        let wire = b"{\"type\":\"delta\",\"content\":\"a\"}\r\n{\"type\":\"delta\",\"content\":\"b\"}\r\n";
        assert_eq!(deltas(parser.push(wire)), "ab");
    }
}
