/// Incremental decoder for `text/event-stream` bodies.
///
/// Network chunks may split a line (or a multi-byte character) anywhere, so raw
/// bytes are buffered until a newline arrives. Only `data:` fields are kept;
/// `event:`, `id:` and `retry:` carry nothing the chat stream needs.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns every event payload it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw_line = self.pending.drain(..=newline).collect::<Vec<_>>();
            let line = String::from_utf8_lossy(&raw_line);
            self.handle_line(line.trim_end_matches(['\n', '\r']), &mut events);
        }

        events
    }

    /// Flushes a trailing event when the body ends without a blank line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();

        if !self.pending.is_empty() {
            let raw_line = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw_line).into_owned();
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }

        self.dispatch(&mut events);
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data_lines.push(value.to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if self.data_lines.is_empty() {
            return;
        }

        events.push(self.data_lines.join("\n"));
        self.data_lines.clear();
    }
}
