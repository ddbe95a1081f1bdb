//! Incremental `text/event-stream` decoder.
//!
//! Input arrives as arbitrary byte chunks from the HTTP body, so lines (and
//! multi-byte characters) may be split across chunks. Bytes are buffered until
//! a full line is available; only then is the line decoded as UTF-8.

use std::time::Duration;

/// One dispatched event block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; `None` for the unnamed default (`message`) type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last `id:` seen so far on the stream.
    pub id: Option<String>,
    /// `retry:` reconnection hint carried by this block.
    pub retry: Option<Duration>,
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Option<String>,
    retry: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: PendingEvent,
    last_event_id: Option<String>,
    /// A chunk ended on `\r`; a leading `\n` in the next chunk belongs to it.
    skip_lf: bool,
    started: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recent event, for `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Appends `chunk` and returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut chunk = chunk;
        if self.skip_lf {
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
            self.skip_lf = false;
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..]
            .iter()
            .position(|byte| *byte == b'\n' || *byte == b'\r')
        {
            let end = consumed + offset;
            let mut next = end + 1;
            if self.buffer[end] == b'\r' {
                match self.buffer.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.skip_lf = true,
                }
            }

            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            consumed = next;
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..consumed);
        events
    }

    /// Flushes a final unterminated block once the body has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.process_line(&line);
        }
        self.skip_lf = false;
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = if self.started {
            line
        } else {
            self.started = true;
            line.strip_prefix('\u{feff}').unwrap_or(line)
        };

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
            "event" => self.pending.event = Some(value.to_string()),
            "data" => match self.pending.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.pending.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.pending.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let pending = std::mem::take(&mut self.pending);
        if pending.data.is_none() && pending.retry.is_none() {
            return None;
        }
        Some(SseEvent {
            event: pending.event.filter(|name| !name.is_empty()),
            data: pending.data.unwrap_or_default(),
            id: self.last_event_id.clone(),
            retry: pending.retry,
        })
    }
}
