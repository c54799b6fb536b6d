//! Server-Sent Events decoding
//!
//! Gemini's `streamGenerateContent?alt=sse` answers with one JSON document
//! per SSE event. Only `data:` fields matter; `event:`, `id:`, `retry:` and
//! comments are ignored.

use futures::{Stream, StreamExt};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use agent_core::error::{AgentError, Result};

/// Line-oriented SSE accumulator
#[derive(Debug, Default)]
pub struct SseDecoder {
    data: String,
}

impl SseDecoder {
    /// Feed one line without its terminator. Returns the data of an event
    /// when `line` completes one.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.finish();
        }

        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(data);
        }
        None
    }

    /// Flush an event left unterminated at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data))
        }
    }
}

/// Data payloads of every event in `response`, in arrival order
pub fn data_events(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let lines = tokio::io::BufReader::new(StreamReader::new(bytes)).lines();

    futures::stream::unfold(Some((lines, SseDecoder::default())), |state| async move {
        let (mut lines, mut decoder) = state?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(data) = decoder.push_line(&line) {
                        return Some((Ok(data), Some((lines, decoder))));
                    }
                }
                Ok(None) => return decoder.finish().map(|data| (Ok(data), None)),
                Err(e) => {
                    let err = AgentError::ProviderUnavailable(format!("response stream interrupted: {e}"));
                    return Some((Err(err), None));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> Vec<String> {
        let mut decoder = SseDecoder::default();
        let mut events: Vec<String> = input.lines().filter_map(|l| decoder.push_line(l)).collect();
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_events_in_order() {
        let events = decode("data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(events, ["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_multiline_data_and_ignored_fields() {
        let events = decode(": keep-alive\nevent: message\nid: 7\ndata: first\ndata:second\r\n\r\n");
        assert_eq!(events, ["first\nsecond"]);
    }

    #[test]
    fn test_trailing_event_without_blank_line() {
        let events = decode("data: one\n\ndata: two");
        assert_eq!(events, ["one", "two"]);
    }

    #[test]
    fn test_blank_lines_alone_produce_nothing() {
        assert!(decode("\n\n\n").is_empty());
    }
}
