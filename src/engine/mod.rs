pub mod tool_loop;

pub use tool_loop::{run_tool_loop, FileReadRecord, ToolLoopOutcome, MAX_TOOL_ROUNDS};

use crate::api::sse::{encode_custom_event, encode_data, ERROR_EVENT, FILE_READ_EVENT};
use crate::types::{Content, ContentBlock};
use serde_json::json;

pub const SYSTEM_PROMPT: &str = "You are Genie, a world-class AI development assistant for existing products.\n\
You help engineers understand, evolve, and improve their codebase. Be precise, proactive, and conversational.\n\
Use markdown with fenced code blocks (with language tags). Keep answers focused and actionable.\n\
\n\
CODE ENGINE ACTIVE — you have two tools: list_files and read_file.\n\
\n\
When asked to make changes:\n\
1. Use read_file to read relevant files first (always read before modifying).\n\
2. Write a brief natural-language explanation of each change.\n\
3. For every file change, emit a block AFTER the explanation using this exact format:\n\
\n\
To MODIFY an existing file:\n\
<genie_change file=\"path/to/file.ts\" action=\"modified\">\n\
<original>\n\
(EXACT verbatim text from the file to replace — copy it character-for-character)\n\
</original>\n\
<updated>\n\
(the replacement text)\n\
</updated>\n\
</genie_change>\n\
\n\
To CREATE a new file:\n\
<genie_change file=\"path/to/new.ts\" action=\"created\">\n\
<content>\n\
(full file content)\n\
</content>\n\
</genie_change>\n\
\n\
To DELETE a file:\n\
<genie_change file=\"path/to/file.ts\" action=\"deleted\"/>\n\
\n\
Rules:\n\
- The <original> block must be verbatim text taken directly from the file (exact indentation, whitespace, newlines).\n\
- Be surgical: only change what is necessary, keep all surrounding code intact.\n\
- You may emit multiple <genie_change> blocks per response.\n\
- After the blocks, briefly tell the user what to review.";

/// Streamed text is re-chunked at this many characters to keep the UI
/// responsive while replaying a non-streamed final answer.
const STREAM_CHUNK_CHARS: usize = 80;

/// Serializes a finished tool-loop turn into the wire frames the stream
/// client consumes: file-read notices, then the final assistant text
/// replayed as delta chunks, then a usage frame.
pub fn encode_outcome_as_stream(outcome: &ToolLoopOutcome) -> String {
    let mut out = String::new();

    for record in &outcome.file_reads {
        out.push_str(&encode_custom_event(
            FILE_READ_EVENT,
            &json!({ "file": record.file, "lines": record.lines }),
        ));
    }

    let full_text = final_assistant_text(outcome);
    out.push_str(&encode_data(&json!({
        "type": "message_start",
        "message": { "usage": { "input_tokens": outcome.input_tokens } }
    })));

    let chars: Vec<char> = full_text.chars().collect();
    for chunk in chars.chunks(STREAM_CHUNK_CHARS) {
        let text: String = chunk.iter().collect();
        out.push_str(&encode_data(&json!({
            "type": "content_block_delta",
            "delta": { "type": "text_delta", "text": text }
        })));
    }

    // Rough estimate; the non-streamed loop response carries no output count.
    let output_tokens = chars.len().div_ceil(4);
    out.push_str(&encode_data(&json!({
        "type": "message_delta",
        "usage": { "output_tokens": output_tokens }
    })));

    out
}

/// Serializes a turn-fatal error as the terminal error frame.
pub fn encode_error_frame(message: &str) -> String {
    encode_custom_event(ERROR_EVENT, &json!({ "message": message }))
}

fn final_assistant_text(outcome: &ToolLoopOutcome) -> String {
    let Some(last) = outcome.messages.last() else {
        return String::new();
    };
    if last.role != "assistant" {
        return String::new();
    }
    match &last.content {
        Content::Text(text) => text.clone(),
        Content::Blocks(blocks) => {
            let mut text = String::new();
            for block in blocks {
                if let ContentBlock::Text { text: t } = block {
                    text.push_str(t);
                }
            }
            text
        }
    }
}
