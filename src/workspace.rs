use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directories never surfaced to the model or walked for enumeration.
const IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    ".next",
    "dist",
    "build",
    "out",
    ".turbo",
    "__pycache__",
    ".venv",
    "venv",
    ".cache",
    "coverage",
    "target",
];

/// Binary and asset extensions excluded from enumeration.
const IGNORE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "bmp", "mp4", "mp3", "wav", "pdf", "zip",
    "gz", "tar", "lock", "woff", "woff2", "ttf", "eot",
];

/// Rooted, traversal-checked view of the connected project tree. The tool
/// loop reads through it; the change applicator reads and writes through
/// it. Nothing in the crate touches the file system outside of it.
pub struct Workspace {
    root: PathBuf,
    canonical_root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let canonical_root = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Self {
            root,
            canonical_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a project-relative path, rejecting anything that would
    /// land outside the root (absolute paths, `..` segments, symlink
    /// escapes).
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            bail!("Path traversal denied: empty path");
        }
        if path.starts_with('/') || path.contains('\\') {
            bail!("Path traversal denied: {path}");
        }

        let relative = Path::new(path);
        for component in relative.components() {
            if matches!(component, Component::ParentDir) {
                bail!("Path traversal denied: {path}");
            }
        }

        let resolved = normalize(&self.root.join(relative));
        self.ensure_within_root(&resolved, path)?;
        Ok(resolved)
    }

    fn ensure_within_root(&self, resolved: &Path, requested: &str) -> Result<()> {
        let guard = if resolved.exists() {
            resolved.to_path_buf()
        } else {
            match nearest_existing_ancestor(resolved) {
                Some(ancestor) => ancestor.to_path_buf(),
                None => bail!("Path traversal denied: {requested}"),
            }
        };

        let canonical_guard = fs::canonicalize(&guard)
            .with_context(|| format!("Failed to canonicalize {}", guard.display()))?;
        if !canonical_guard.starts_with(&self.canonical_root) {
            bail!("Path traversal denied: {requested}");
        }
        Ok(())
    }

    /// Relative paths of every non-ignored file under the root, sorted,
    /// `/`-separated.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        walk(&self.root, "", &mut files)?;
        Ok(files)
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        fs::read_to_string(&resolved).with_context(|| format!("Failed to read {path}"))
    }

    /// Writes the full file content, creating parent directories as needed.
    pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for {path}"))?;
        }
        fs::write(&resolved, content).with_context(|| format!("Failed to write {path}"))
    }

    pub fn delete_file(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        fs::remove_file(&resolved).with_context(|| format!("Failed to delete {path}"))
    }
}

fn walk(dir: &Path, base: &str, out: &mut Vec<String>) -> Result<()> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Ok(());
    };
    let mut entries: Vec<_> = read_dir.filter_map(|entry| entry.ok()).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || IGNORE_DIRS.contains(&name.as_ref()) {
            continue;
        }

        let relative = if base.is_empty() {
            name.to_string()
        } else {
            format!("{base}/{name}")
        };

        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to inspect {relative}"))?;
        if file_type.is_dir() {
            walk(&entry.path(), &relative, out)?;
        } else if !has_ignored_extension(&name) {
            out.push(relative);
        }
    }
    Ok(())
}

fn has_ignored_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            IGNORE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated_workspace() -> (TempDir, Workspace) {
        let temp = TempDir::new().expect("temp dir");
        fs::create_dir_all(temp.path().join("src/components")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join("src/index.ts"), "export {};\n").unwrap();
        fs::write(temp.path().join("src/components/App.tsx"), "<App/>\n").unwrap();
        fs::write(temp.path().join("src/logo.png"), [0u8; 4]).unwrap();
        fs::write(temp.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(temp.path().join(".env"), "SECRET=1").unwrap();
        fs::write(temp.path().join("README.md"), "# readme\n").unwrap();
        let workspace = Workspace::new(temp.path().to_path_buf());
        (temp, workspace)
    }

    #[test]
    fn test_list_files_skips_ignored_entries() {
        let (_temp, workspace) = populated_workspace();
        let files = workspace.list_files().expect("list");
        assert_eq!(
            files,
            vec![
                "README.md".to_string(),
                "src/components/App.tsx".to_string(),
                "src/index.ts".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let (_temp, workspace) = populated_workspace();
        assert!(workspace.resolve("../outside.txt").is_err());
        assert!(workspace.resolve("/etc/passwd").is_err());
        assert!(workspace.resolve("src/../../outside.txt").is_err());
        assert!(workspace.resolve("..\\windows").is_err());
    }

    #[test]
    fn test_resolve_allows_dotted_filenames() {
        let (_temp, workspace) = populated_workspace();
        assert!(workspace.resolve("notes..v2.md").is_ok());
        assert!(workspace.resolve("src/my..file.ts").is_ok());
    }

    #[test]
    fn test_read_and_write_round_trip() {
        let (_temp, workspace) = populated_workspace();
        workspace
            .write_file("docs/guide/setup.md", "# setup\n")
            .expect("write should create parents");
        assert_eq!(
            workspace.read_file("docs/guide/setup.md").expect("read"),
            "# setup\n"
        );
    }

    #[test]
    fn test_delete_missing_file_fails() {
        let (_temp, workspace) = populated_workspace();
        assert!(workspace.delete_file("no/such/file.ts").is_err());
    }
}
