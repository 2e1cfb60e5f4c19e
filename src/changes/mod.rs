mod apply;
mod diff;
mod parser;

pub use apply::{apply_changes, ApplyResult};
pub use diff::{build_line_diff, DiffKind, DiffLine, LARGE_DIFF_GUARD_PRODUCT};
pub use parser::{extract_changes, strip_change_blocks};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Modified,
    Deleted,
}

/// One proposed mutation to one file, parsed out of a model response and
/// reviewed by the user before it is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub action: ChangeAction,
    /// Verbatim snippet expected to exist in the current file; anchor for
    /// surgical replacement. Present for `modified` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    /// Full replacement or new-file text. Present for `created`/`modified`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<DiffLine>,
    #[serde(default)]
    pub lines_added: usize,
    #[serde(default)]
    pub lines_removed: usize,
    /// None = pending review, Some(true) = approved, Some(false) = rejected.
    #[serde(default)]
    pub approved: Option<bool>,
}

impl FileChange {
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ChangeAction::Deleted,
            original_content: None,
            updated_content: None,
            diff: Vec::new(),
            lines_added: 0,
            lines_removed: 0,
            approved: None,
        }
    }
}
