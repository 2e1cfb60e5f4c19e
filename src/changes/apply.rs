use super::{ChangeAction, FileChange};
use crate::workspace::Workspace;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub path: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies a batch of approved changes against the workspace, one result
/// per change in input order. Best-effort: a failed change never aborts
/// its siblings, and a failed change leaves its file exactly as found.
pub fn apply_changes(workspace: &Workspace, changes: &[FileChange]) -> Vec<ApplyResult> {
    changes
        .iter()
        .map(|change| match apply_one(workspace, change) {
            Ok(()) => ApplyResult {
                path: change.path.clone(),
                ok: true,
                error: None,
            },
            Err(error) => ApplyResult {
                path: change.path.clone(),
                ok: false,
                error: Some(error.to_string()),
            },
        })
        .collect()
}

fn apply_one(workspace: &Workspace, change: &FileChange) -> Result<()> {
    match change.action {
        ChangeAction::Deleted => workspace.delete_file(&change.path),
        ChangeAction::Created => {
            workspace.write_file(&change.path, change.updated_content.as_deref().unwrap_or(""))
        }
        ChangeAction::Modified => apply_modification(workspace, change),
    }
}

fn apply_modification(workspace: &Workspace, change: &FileChange) -> Result<()> {
    let updated = change.updated_content.as_deref().unwrap_or("");

    match change.original_content.as_deref() {
        Some(original) if !original.is_empty() => {
            let current = workspace.read_file(&change.path)?;
            if !current.contains(original) {
                anyhow::bail!(
                    "Could not locate the original snippet — file may have changed since the diff was generated."
                );
            }
            // Replace only the first occurrence to stay surgical.
            let rewritten = current.replacen(original, updated, 1);
            workspace.write_file(&change.path, &rewritten)
        }
        // No anchor snippet: full-file replacement.
        _ => workspace.write_file(&change.path, updated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::DiffLine;
    use std::fs;
    use tempfile::TempDir;

    fn modification(path: &str, original: &str, updated: &str) -> FileChange {
        FileChange {
            path: path.to_string(),
            action: ChangeAction::Modified,
            original_content: Some(original.to_string()),
            updated_content: Some(updated.to_string()),
            diff: Vec::<DiffLine>::new(),
            lines_added: 0,
            lines_removed: 0,
            approved: Some(true),
        }
    }

    fn creation(path: &str, content: &str) -> FileChange {
        FileChange {
            path: path.to_string(),
            action: ChangeAction::Created,
            original_content: None,
            updated_content: Some(content.to_string()),
            diff: Vec::new(),
            lines_added: 0,
            lines_removed: 0,
            approved: Some(true),
        }
    }

    #[test]
    fn test_modified_replaces_first_occurrence_only() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("a.ts"), "let x = foo; let y = foo;").unwrap();
        let workspace = Workspace::new(temp.path().to_path_buf());

        let results = apply_changes(&workspace, &[modification("a.ts", "foo", "bar")]);

        assert!(results[0].ok);
        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).unwrap(),
            "let x = bar; let y = foo;"
        );
    }

    #[test]
    fn test_stale_base_leaves_file_untouched() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("a.ts"), "let x = 1;").unwrap();
        let workspace = Workspace::new(temp.path().to_path_buf());

        let results = apply_changes(&workspace, &[modification("a.ts", "foo", "bar")]);

        assert!(!results[0].ok);
        assert!(results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("may have changed"));
        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).unwrap(),
            "let x = 1;"
        );
    }

    #[test]
    fn test_traversal_is_denied_for_every_action() {
        let temp = TempDir::new().expect("temp dir");
        let workspace = Workspace::new(temp.path().to_path_buf());

        let changes = vec![
            FileChange::deleted("../outside.txt"),
            creation("../outside.txt", "x"),
            modification("../outside.txt", "a", "b"),
        ];
        let results = apply_changes(&workspace, &changes);

        assert_eq!(results.len(), 3);
        for result in &results {
            assert!(!result.ok);
            assert!(result.error.as_deref().unwrap().contains("Path traversal denied"));
        }
    }

    #[test]
    fn test_created_writes_through_new_directories() {
        let temp = TempDir::new().expect("temp dir");
        let workspace = Workspace::new(temp.path().to_path_buf());

        let results = apply_changes(
            &workspace,
            &[creation("src/lib/helpers.ts", "export const n = 1;\n")],
        );

        assert!(results[0].ok);
        assert_eq!(
            fs::read_to_string(temp.path().join("src/lib/helpers.ts")).unwrap(),
            "export const n = 1;\n"
        );
    }

    #[test]
    fn test_failed_delete_does_not_abort_batch() {
        let temp = TempDir::new().expect("temp dir");
        let workspace = Workspace::new(temp.path().to_path_buf());

        let results = apply_changes(
            &workspace,
            &[
                FileChange::deleted("missing.ts"),
                creation("kept.ts", "ok\n"),
            ],
        );

        assert!(!results[0].ok);
        assert!(results[1].ok);
        assert!(temp.path().join("kept.ts").exists());
    }

    #[test]
    fn test_modified_without_anchor_rewrites_whole_file() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("a.ts"), "old body").unwrap();
        let workspace = Workspace::new(temp.path().to_path_buf());

        let mut change = modification("a.ts", "", "new body");
        change.original_content = None;
        let results = apply_changes(&workspace, &[change]);

        assert!(results[0].ok);
        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).unwrap(),
            "new body"
        );
    }
}
