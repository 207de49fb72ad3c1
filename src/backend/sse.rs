//! Decoder for the `data: {json}` event stream returned by streaming generation calls

use serde::Deserialize;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Error detail carried by a failure frame
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrameError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FrameError {
    pub fn describe(&self) -> String {
        match (&self.message, &self.code) {
            (Some(message), _) => message.clone(),
            (None, Some(code)) => code.clone(),
            (None, None) => "unknown generation failure".to_string(),
        }
    }
}

/// A typed event frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "image_generation.partial_succeeded")]
    ImageSucceeded {
        url: String,
        #[serde(default)]
        size: String,
    },

    #[serde(rename = "image_generation.partial_failed")]
    ImageFailed {
        #[serde(default)]
        error: Option<FrameError>,
    },

    /// Any frame type this client does not act on
    #[serde(other)]
    Other,
}

/// Parse one line of the stream.
///
/// Returns `None` for blank lines, non-data fields, the `[DONE]` marker and
/// payloads that are not valid JSON.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches('\r');
    let data = line.strip_prefix(DATA_PREFIX)?.trim_start();

    if data.is_empty() || data == DONE_MARKER {
        return None;
    }

    serde_json::from_str(data).ok()
}

/// Incremental decoder fed with raw body chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            events.extend(parse_line(&line));
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}
