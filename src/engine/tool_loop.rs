use crate::api::client::ApiClient;
use crate::types::{ApiMessage, Content, ContentBlock};
use crate::workspace::Workspace;
use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{json, Value};

/// Hard cap on model round-trips per turn. Hitting it is a turn-fatal
/// error, never a silent truncation.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// One file the model read during the turn, surfaced to the client as a
/// progress notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReadRecord {
    pub file: String,
    pub lines: usize,
}

/// Result of a completed turn: the full transcript including every
/// tool exchange, plus what the loop observed along the way.
#[derive(Debug)]
pub struct ToolLoopOutcome {
    pub messages: Vec<ApiMessage>,
    pub file_reads: Vec<FileReadRecord>,
    pub input_tokens: u64,
}

/// Drives the request / tool_use / tool_result cycle until the model
/// produces a final answer. Tool failures are reported back to the model
/// as error-tagged results; only backend failures and loop exhaustion
/// abort the turn.
pub async fn run_tool_loop(
    client: &ApiClient,
    workspace: &Workspace,
    messages: Vec<ApiMessage>,
    system: &str,
) -> Result<ToolLoopOutcome> {
    let mut messages = messages;
    let mut file_reads = Vec::new();
    let mut input_tokens = 0u64;

    for _ in 0..MAX_TOOL_ROUNDS {
        let response = client.complete(&messages, system, true).await?;
        input_tokens += response.usage.input_tokens;

        if !response.requested_tool_use() {
            messages.push(ApiMessage {
                role: "assistant".to_string(),
                content: Content::Blocks(response.content),
            });
            return Ok(ToolLoopOutcome {
                messages,
                file_reads,
                input_tokens,
            });
        }

        let tool_calls: Vec<(String, String, Value)> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        // The assistant turn goes into the transcript before its results.
        messages.push(ApiMessage {
            role: "assistant".to_string(),
            content: Content::Blocks(response.content),
        });

        let mut results = Vec::with_capacity(tool_calls.len());
        for (id, name, input) in tool_calls {
            let (content, is_error) = execute_tool(workspace, &name, &input, &mut file_reads);
            results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                content,
                is_error,
            });
        }
        messages.push(ApiMessage {
            role: "user".to_string(),
            content: Content::Blocks(results),
        });
    }

    bail!("Tool-use loop limit reached without a final response.")
}

fn execute_tool(
    workspace: &Workspace,
    name: &str,
    input: &Value,
    file_reads: &mut Vec<FileReadRecord>,
) -> (String, bool) {
    match name {
        "list_files" => match workspace.list_files() {
            Ok(files) => (json!({ "files": files }).to_string(), false),
            Err(error) => (json!({ "error": error.to_string() }).to_string(), true),
        },
        "read_file" => {
            let path = input.get("path").and_then(|value| value.as_str()).unwrap_or("");
            match workspace.read_file(path) {
                Ok(content) => {
                    let lines = content.split('\n').count();
                    file_reads.push(FileReadRecord {
                        file: path.to_string(),
                        lines,
                    });
                    (json!({ "content": content, "lines": lines }).to_string(), false)
                }
                Err(error) => (json!({ "error": error.to_string() }).to_string(), true),
            }
        }
        other => (
            json!({ "error": format!("Unknown tool: {other}") }).to_string(),
            true,
        ),
    }
}
