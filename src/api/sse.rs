use super::logging::emit_sse_parse_error;
use crate::types::StreamEvent;
use serde::Deserialize;
use serde_json::Value;

/// Event name for file-read progress notices on the orchestration stream.
pub const FILE_READ_EVENT: &str = "x-file-read";
/// Event name for terminal engine errors on the orchestration stream.
pub const ERROR_EVENT: &str = "x-error";

/// One decoded frame from the orchestration stream, ready for the
/// stream client to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    TextDelta(String),
    FileRead { file: String, lines: usize },
    InputTokens(u64),
    OutputTokens(u64),
    Error(String),
}

#[derive(Debug, Deserialize)]
struct FileReadNotice {
    file: String,
    lines: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorNotice {
    message: String,
}

/// Incremental server-sent-event parser. Buffers partial lines across
/// network reads; malformed data lines are skipped, never fatal.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    current_event: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);
            self.handle_line(&line, &mut frames);
        }

        frames
    }

    fn handle_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if let Some(event_name) = line.strip_prefix("event: ") {
            self.current_event = event_name.trim().to_string();
            return;
        }
        if line.is_empty() {
            self.current_event.clear();
            return;
        }
        let Some(raw) = line.strip_prefix("data: ") else {
            return;
        };
        let raw = raw.trim();

        match self.current_event.as_str() {
            FILE_READ_EVENT => match serde_json::from_str::<FileReadNotice>(raw) {
                Ok(notice) => frames.push(SseFrame::FileRead {
                    file: notice.file,
                    lines: notice.lines,
                }),
                Err(error) => emit_sse_parse_error(Some(FILE_READ_EVENT), raw, &error),
            },
            ERROR_EVENT => match serde_json::from_str::<ErrorNotice>(raw) {
                Ok(notice) => frames.push(SseFrame::Error(notice.message)),
                Err(_) => frames.push(SseFrame::Error("Unknown engine error".to_string())),
            },
            _ => {
                if raw == "[DONE]" {
                    return;
                }
                match serde_json::from_str::<StreamEvent>(raw) {
                    Ok(event) => self.handle_model_event(event, frames),
                    Err(error) => emit_sse_parse_error(
                        (!self.current_event.is_empty()).then_some(self.current_event.as_str()),
                        raw,
                        &error,
                    ),
                }
            }
        }
    }

    fn handle_model_event(&self, event: StreamEvent, frames: &mut Vec<SseFrame>) {
        match event {
            StreamEvent::ContentBlockDelta { delta, .. } => {
                if delta.delta_type.as_deref() == Some("text_delta") {
                    if let Some(text) = delta.text {
                        frames.push(SseFrame::TextDelta(text));
                    }
                }
            }
            StreamEvent::MessageStart { message } => {
                frames.push(SseFrame::InputTokens(message.usage.input_tokens));
            }
            StreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    frames.push(SseFrame::OutputTokens(usage.output_tokens));
                }
            }
            StreamEvent::MessageStop | StreamEvent::Unknown => {}
        }
    }
}

/// Encodes one named custom event, wire-compatible with what the
/// orchestration endpoint emits.
pub fn encode_custom_event(event_name: &str, data: &Value) -> String {
    format!("event: {event_name}\ndata: {data}\n\n")
}

/// Encodes one plain data frame.
pub fn encode_data(data: &Value) -> String {
    format!("data: {data}\n\n")
}
