//! Incremental frame decoder.
//!
//! Bytes arrive in arbitrary chunks; only complete `\n`-terminated lines are
//! decoded. The trailing fragment is carried over to the next `feed`, so the
//! emitted events do not depend on where the transport split the body.
//!
//! A line longer than the reader's limit is dropped whole (and counted) the
//! moment it crosses the limit; bytes up to its terminating `\n` are skipped
//! without being buffered.

use tracing::debug;

use super::events::{Event, Frame};

/// Literal prefix of every frame line.
pub const FRAME_PREFIX: &str = "data:";

/// Longest line the reader buffers.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Turns a chunked byte stream into ordered events.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    dropped: u64,
    max_line: usize,
    /// Inside an oversized line; skip until the next `\n`.
    discarding: bool,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            dropped: 0,
            max_line,
            discarding: false,
        }
    }

    /// Consume one chunk and return every event it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(newline) = rest.iter().position(|b| *b == b'\n') {
            let head = &rest[..newline];
            rest = &rest[newline + 1..];
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buffer.len() + head.len() > self.max_line {
                self.drop_oversized();
                continue;
            }
            self.buffer.extend_from_slice(head);
            let line = std::mem::take(&mut self.buffer);
            events.extend(self.decode_line(&line));
        }

        if !self.discarding {
            if self.buffer.len() + rest.len() > self.max_line {
                self.drop_oversized();
                self.discarding = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }
        events
    }

    /// Flush the carried-over fragment at end of stream.
    pub fn close(&mut self) -> Vec<Event> {
        if std::mem::take(&mut self.discarding) {
            return Vec::new();
        }
        let remaining = std::mem::take(&mut self.buffer);
        self.decode_line(&remaining).into_iter().collect()
    }

    /// Number of non-empty lines dropped so far (bad prefix, bad JSON or
    /// over the line limit).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn drop_oversized(&mut self) {
        self.dropped += 1;
        self.buffer = Vec::new();
        debug!(limit = self.max_line, "Dropping frame over the line limit");
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<Event> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(e) => {
                self.dropped += 1;
                debug!(error = %e, "Dropping frame with invalid UTF-8");
                return None;
            }
        };
        if line.trim().is_empty() {
            return None;
        }

        let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
            self.dropped += 1;
            debug!(line = %truncate(line), "Dropping line without frame prefix");
            return None;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        match serde_json::from_str::<Frame>(payload) {
            Ok(frame) => Some(Event::from(frame)),
            Err(e) => {
                self.dropped += 1;
                debug!(error = %e, line = %truncate(line), "Dropping malformed frame");
                None
            }
        }
    }
}

fn truncate(line: &str) -> &str {
    match line.char_indices().nth(200) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = concat!(
        "data: {\"type\":\"thinking\",\"content\":\"分析問題\"}\n\n",
        "data: {\"type\":\"tool_call\",\"content\":\"rag_search\",\"data\":{\"arguments\":{\"query\":\"x\"}}}\n\n",
        "data: not json\n",
        "event: ignored\n",
        "data: {\"type\":\"tool_result\",\"data\":{\"preview\":\"results=3\"}}\r\n",
        "data: {\"type\":\"token\",\"content\":\"ok\"}\n",
        "data: {\"type\":\"done\"}\n",
    );

    fn read_all(chunks: &[&[u8]]) -> Vec<Event> {
        let mut reader = FrameReader::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(reader.feed(chunk));
        }
        events.extend(reader.close());
        events
    }

    #[test]
    fn test_incomplete_line_is_buffered() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"data: {\"typ").is_empty());
        let events = reader.feed(b"e\":\"done\"}\n");
        assert_eq!(events, vec![Event::Done]);
        assert!(reader.close().is_empty());
    }

    #[test]
    fn test_many_frames_in_one_chunk() {
        let events = read_all(&[BODY.as_bytes()]);
        let kinds: Vec<&str> = events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec!["thinking", "tool_call", "tool_result", "token", "done"]
        );
    }

    #[test]
    fn test_chunking_invariance() {
        let bytes = BODY.as_bytes();
        let whole = read_all(&[bytes]);

        for size in 1..=17 {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(read_all(&chunks), whole, "chunk size {}", size);
        }
        for split in 0..bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(read_all(&[a, b]), whole, "split at {}", split);
        }
    }

    #[test]
    fn test_malformed_frames_are_skipped() {
        let mut reader = FrameReader::new();
        let events = reader.feed(b"data: {broken\ndata: {\"type\":\"done\"}\nhello\n");
        assert_eq!(events, vec![Event::Done]);
        assert_eq!(reader.dropped(), 2);
    }

    #[test]
    fn test_close_flushes_unterminated_frame() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"data:{\"type\":\"answer\",\"content\":\"hi\"}").is_empty());
        assert_eq!(
            reader.close(),
            vec![Event::Answer { content: "hi".to_string() }]
        );
    }

    #[test]
    fn test_oversized_line_is_dropped_without_buffering() {
        let mut reader = FrameReader::with_max_line(32);
        assert!(reader.feed(b"data: {\"type\":\"token\",\"content\":\"").is_empty());
        for _ in 0..100 {
            assert!(reader.feed(b"aaaaaaaaaaaaaaaa").is_empty());
        }
        assert!(reader.buffer.is_empty());
        assert_eq!(reader.dropped(), 1);

        let events = reader.feed(b"\"}\ndata: {\"type\":\"done\"}\n");
        assert_eq!(events, vec![Event::Done]);
        assert_eq!(reader.dropped(), 1);
        assert!(reader.close().is_empty());
    }

    #[test]
    fn test_oversized_line_chunking_invariance() {
        let body = concat!(
            "data: {\"type\":\"done\"}\n",
            "data: {\"type\":\"token\",\"content\":\"far too long for the limit\"}\n",
            "data: {\"type\":\"end\"}\n",
        )
        .as_bytes();
        let read = |chunks: &[&[u8]]| {
            let mut reader = FrameReader::with_max_line(32);
            let mut events = Vec::new();
            for chunk in chunks {
                events.extend(reader.feed(chunk));
            }
            events.extend(reader.close());
            (events, reader.dropped())
        };

        let whole = read(&[body]);
        assert_eq!(whole, (vec![Event::Done, Event::Done], 1));
        for split in 0..body.len() {
            let (a, b) = body.split_at(split);
            assert_eq!(read(&[a, b]), whole, "split at {}", split);
        }
    }
}
