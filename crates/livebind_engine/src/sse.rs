//! Incremental `text/event-stream` decoder.
//!
//! Feeds arbitrary byte chunks and yields complete events once their
//! terminating blank line arrives. Lines may end in LF or CRLF.

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type, `message` when the stream did not name one.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream.
    pub id: Option<String>,
}

impl SseEvent {
    /// Returns true for unnamed events, the only ones bound targets render.
    pub fn is_message(&self) -> bool {
        self.event == "message"
    }
}

/// Stateful decoder for one stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_id: Option<String>,
}

impl SseDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_owned()),
            // `retry` is ignored; reconnects follow the engine's backoff.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        Some(SseEvent {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| "message".to_owned()),
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"v\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"v\":1}");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\r\n").is_empty());
        let events = decoder.feed(b"\r\ndata: second\n\n");
        let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["hello", "second"]);
    }

    #[test]
    fn multiline_data_and_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keepalive\nevent: tick\nid: 7\nretry: 1500\ndata: a\ndata:b\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "tick".into(),
                data: "a\nb".into(),
                id: Some("7".into()),
            }]
        );
    }

    #[test]
    fn named_events_are_not_messages() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: ping\ndata: heartbeat\n\nevent: message\ndata: a\n\ndata: b\n\n");
        let messages: Vec<_> = events
            .iter()
            .filter(|e| e.is_message())
            .map(|e| e.data.as_str())
            .collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: ping\n\n\n").is_empty());
        let events = decoder.feed(b"data: x\n\n");
        assert_eq!(events[0].event, "message");
    }
}
