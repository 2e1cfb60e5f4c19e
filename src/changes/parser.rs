use super::diff::{build_line_diff, count_changed_lines, DiffKind, DiffLine};
use super::{ChangeAction, FileChange};

const BLOCK_OPEN: &str = "<genie_change";
const BLOCK_CLOSE: &str = "</genie_change>";
const SELF_CLOSE: &str = "/>";

/// Extracts every well-formed change block from a model response, in
/// document order. Malformed blocks are skipped; this never fails on
/// arbitrary model output.
pub fn extract_changes(text: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    let mut cursor = 0usize;

    while let Some(open_rel) = text[cursor..].find(BLOCK_OPEN) {
        let open_start = cursor + open_rel;
        let head_start = open_start + BLOCK_OPEN.len();
        let Some(head_end_rel) = text[head_start..].find('>') else {
            break;
        };
        let head_end = head_start + head_end_rel;
        let head = &text[head_start..head_end];
        let self_closing = head.trim_end().ends_with('/');

        let body_end;
        let body = if self_closing {
            body_end = head_end + 1;
            None
        } else {
            let body_start = head_end + 1;
            match text[body_start..].find(BLOCK_CLOSE) {
                Some(close_rel) => {
                    body_end = body_start + close_rel + BLOCK_CLOSE.len();
                    Some(&text[body_start..body_start + close_rel])
                }
                None => {
                    // Unterminated block; skip the opener and keep scanning.
                    cursor = head_start;
                    continue;
                }
            }
        };

        if let Some(change) = parse_block(head, body) {
            changes.push(change);
        }
        cursor = body_end.max(open_start + 1);
    }

    changes
}

/// Removes every change block from the displayed text so the chat bubble
/// shows only the human-readable explanation. Collapses runs of 3+
/// newlines down to 2 and trims the result. Idempotent.
pub fn strip_change_blocks(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(open_rel) = text[cursor..].find(BLOCK_OPEN) {
        let open_start = cursor + open_rel;
        stripped.push_str(&text[cursor..open_start]);

        let scan_from = open_start + BLOCK_OPEN.len();
        let self_close = text[scan_from..].find(SELF_CLOSE).map(|r| scan_from + r);
        let tag_close = text[scan_from..].find(BLOCK_CLOSE).map(|r| scan_from + r);

        cursor = match (self_close, tag_close) {
            (Some(sc), Some(tc)) if sc < tc => sc + SELF_CLOSE.len(),
            (Some(sc), None) => sc + SELF_CLOSE.len(),
            (_, Some(tc)) => tc + BLOCK_CLOSE.len(),
            (None, None) => {
                // No terminator anywhere; the dangling opener stays visible.
                stripped.push_str(&text[open_start..]);
                cursor = text.len();
                break;
            }
        };
    }
    stripped.push_str(&text[cursor..]);

    collapse_blank_runs(&stripped).trim().to_string()
}

fn parse_block(head: &str, body: Option<&str>) -> Option<FileChange> {
    let path = attribute_value(head, "file")?;
    if path.is_empty() {
        return None;
    }

    let action = match attribute_value(head, "action")? {
        "created" => ChangeAction::Created,
        "modified" => ChangeAction::Modified,
        "deleted" => ChangeAction::Deleted,
        _ => return None,
    };

    match action {
        ChangeAction::Deleted => Some(FileChange::deleted(path)),
        ChangeAction::Created => {
            let content = trim_block_newlines(section(body?, "content").unwrap_or(""));
            let diff: Vec<DiffLine> = content
                .split('\n')
                .map(|line| DiffLine {
                    content: line.to_string(),
                    kind: DiffKind::Added,
                })
                .collect();
            let lines_added = if content.is_empty() {
                0
            } else {
                content.split('\n').count()
            };
            Some(FileChange {
                path: path.to_string(),
                action,
                original_content: None,
                updated_content: Some(content.to_string()),
                diff,
                lines_added,
                lines_removed: 0,
                approved: None,
            })
        }
        ChangeAction::Modified => {
            let body = body?;
            let original = trim_block_newlines(section(body, "original").unwrap_or(""));
            let updated = trim_block_newlines(section(body, "updated").unwrap_or(""));
            let diff = build_line_diff(original, updated);
            let (lines_added, lines_removed) = count_changed_lines(&diff);
            Some(FileChange {
                path: path.to_string(),
                action,
                original_content: Some(original.to_string()),
                updated_content: Some(updated.to_string()),
                diff,
                lines_added,
                lines_removed,
                approved: None,
            })
        }
    }
}

fn attribute_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{name}=\"");
    let value_start = head.find(&marker)? + marker.len();
    let value_end = head[value_start..].find('"')?;
    Some(&head[value_start..value_start + value_end])
}

fn section<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let inner_start = body.find(&open)? + open.len();
    let inner_end = body[inner_start..].find(&close)?;
    Some(&body[inner_start..inner_start + inner_end])
}

/// Trims exactly one leading and one trailing newline, keeping all other
/// whitespace intact.
fn trim_block_newlines(value: &str) -> &str {
    let value = value.strip_prefix('\n').unwrap_or(value);
    value.strip_suffix('\n').unwrap_or(value)
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newline_run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(ch);
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out
}
