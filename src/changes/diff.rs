use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub content: String,
    pub kind: DiffKind,
}

impl DiffLine {
    fn new(content: &str, kind: DiffKind) -> Self {
        Self {
            content: content.to_string(),
            kind,
        }
    }
}

/// Lines of context kept around each change hunk.
const CONTEXT_WINDOW: usize = 3;

/// Above this line-count product the exact LCS is skipped and the diff is
/// rendered as a whole-file replacement. Bounds worst-case memory and time
/// at the cost of diff granularity on huge files.
pub const LARGE_DIFF_GUARD_PRODUCT: usize = 250_000;

/// Classified line diff between two whole-file texts.
///
/// Identical inputs yield an all-context diff, not an empty one. The
/// result is context-trimmed: only context lines within `CONTEXT_WINDOW`
/// lines of a change survive.
pub fn build_line_diff(original: &str, updated: &str) -> Vec<DiffLine> {
    if original == updated {
        return original
            .split('\n')
            .map(|line| DiffLine::new(line, DiffKind::Context))
            .collect();
    }

    let old_lines: Vec<&str> = original.split('\n').collect();
    let new_lines: Vec<&str> = updated.split('\n').collect();
    let m = old_lines.len();
    let n = new_lines.len();

    if m * n > LARGE_DIFF_GUARD_PRODUCT {
        let mut out = Vec::with_capacity(m + n);
        out.extend(old_lines.iter().map(|l| DiffLine::new(l, DiffKind::Removed)));
        out.extend(new_lines.iter().map(|l| DiffLine::new(l, DiffKind::Added)));
        return out;
    }

    let dp = build_lcs_table(&old_lines, &new_lines);

    // Backtrack from (m, n). Prefer emitting `added` when the table allows
    // it without shrinking the common subsequence.
    let mut ops = Vec::with_capacity(m.max(n));
    let mut i = m;
    let mut j = n;
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old_lines[i - 1] == new_lines[j - 1] {
            ops.push(DiffLine::new(old_lines[i - 1], DiffKind::Context));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || dp[i][j - 1] >= dp[i - 1][j]) {
            ops.push(DiffLine::new(new_lines[j - 1], DiffKind::Added));
            j -= 1;
        } else {
            ops.push(DiffLine::new(old_lines[i - 1], DiffKind::Removed));
            i -= 1;
        }
    }
    ops.reverse();

    collapse_context(ops)
}

/// Counts of added and removed lines in a diff.
pub fn count_changed_lines(diff: &[DiffLine]) -> (usize, usize) {
    let added = diff.iter().filter(|l| l.kind == DiffKind::Added).count();
    let removed = diff.iter().filter(|l| l.kind == DiffKind::Removed).count();
    (added, removed)
}

fn build_lcs_table(old_lines: &[&str], new_lines: &[&str]) -> Vec<Vec<u32>> {
    let m = old_lines.len();
    let n = new_lines.len();
    let mut dp = vec![vec![0u32; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if old_lines[i - 1] == new_lines[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    dp
}

fn collapse_context(ops: Vec<DiffLine>) -> Vec<DiffLine> {
    let mut keep = vec![false; ops.len()];
    for (index, line) in ops.iter().enumerate() {
        if line.kind != DiffKind::Context {
            let lo = index.saturating_sub(CONTEXT_WINDOW);
            let hi = (index + CONTEXT_WINDOW).min(ops.len().saturating_sub(1));
            for slot in keep.iter_mut().take(hi + 1).skip(lo) {
                *slot = true;
            }
        }
    }

    ops.into_iter()
        .zip(keep)
        .filter_map(|(line, kept)| kept.then_some(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(diff: &[DiffLine]) -> Vec<DiffKind> {
        diff.iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_identical_inputs_yield_all_context() {
        let text = "a\nb\nc";
        let diff = build_line_diff(text, text);
        assert_eq!(diff.len(), 3);
        assert!(diff.iter().all(|l| l.kind == DiffKind::Context));
    }

    #[test]
    fn test_single_line_replacement() {
        let diff = build_line_diff("a\nb\nc", "a\nx\nc");
        assert_eq!(
            kinds(&diff),
            vec![
                DiffKind::Context,
                DiffKind::Removed,
                DiffKind::Added,
                DiffKind::Context,
            ]
        );
        assert_eq!(diff[1].content, "b");
        assert_eq!(diff[2].content, "x");
    }

    #[test]
    fn test_reconstructs_both_sides_when_context_survives() {
        let original = "fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}";
        let updated = "fn main() {\n    let x = 2;\n    let y = 3;\n    println!(\"{x}\");\n}";
        let diff = build_line_diff(original, updated);

        let rebuilt_updated: Vec<&str> = diff
            .iter()
            .filter(|l| l.kind != DiffKind::Removed)
            .map(|l| l.content.as_str())
            .collect();
        assert_eq!(rebuilt_updated.join("\n"), updated);

        let rebuilt_original: Vec<&str> = diff
            .iter()
            .filter(|l| l.kind != DiffKind::Added)
            .map(|l| l.content.as_str())
            .collect();
        assert_eq!(rebuilt_original.join("\n"), original);
    }

    #[test]
    fn test_distant_context_is_dropped() {
        let original: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
        let mut updated = original.clone();
        updated[10] = "changed".to_string();

        let diff = build_line_diff(&original.join("\n"), &updated.join("\n"));

        // one added + one removed + at most three context lines either side
        assert!(diff.len() <= 8);
        let (added, removed) = count_changed_lines(&diff);
        assert_eq!((added, removed), (1, 1));
        assert!(diff.iter().any(|l| l.content == "line 7"));
        assert!(!diff.iter().any(|l| l.content == "line 0"));
        assert!(!diff.iter().any(|l| l.content == "line 19"));
    }

    #[test]
    fn test_large_file_guard_produces_replacement_diff() {
        let original: String = (0..600).map(|i| format!("old {i}\n")).collect();
        let updated: String = (0..600).map(|i| format!("new {i}\n")).collect();

        let diff = build_line_diff(original.trim_end(), updated.trim_end());

        assert_eq!(diff.len(), 1200);
        assert!(diff[..600].iter().all(|l| l.kind == DiffKind::Removed));
        assert!(diff[600..].iter().all(|l| l.kind == DiffKind::Added));
    }

    #[test]
    fn test_deterministic_for_same_inputs() {
        let a = "one\ntwo\nthree";
        let b = "one\nthree\nfour";
        assert_eq!(build_line_diff(a, b), build_line_diff(a, b));
    }

    #[test]
    fn test_pure_insertion_keeps_all_lines_added() {
        let diff = build_line_diff("a", "a\nb\nc");
        assert_eq!(
            kinds(&diff),
            vec![DiffKind::Context, DiffKind::Added, DiffKind::Added]
        );
    }
}
