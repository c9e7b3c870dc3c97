//! Path-safe file access inside the project directory.
//!
//! Every task path goes through [`Workspace::resolve`] before anything is
//! read or written. Resolution is lexical first (no absolute paths, no `..`
//! above the root) and then canonical: the deepest existing ancestor of the
//! target must still live under the canonical root, which rejects symlinks
//! pointing out of the tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::patch::{apply_unified_diff, looks_like_unified_diff, unified_diff};
use crate::core::path::normalize_relative;
use crate::error::OrchestratorError;
use crate::io::atomic::write_atomic;

/// Result of a write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file already held exactly these bytes; nothing was touched.
    Unchanged,
    Written { created: bool, diff: String },
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path to an absolute one inside the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let escape = || OrchestratorError::PathEscape {
            path: raw.to_string(),
            root: self.root.clone(),
        };
        let relative = normalize_relative(raw).ok_or_else(escape)?;
        let candidate = self.root.join(&relative);

        let canonical_root = canonicalize_lenient(&self.root)?;
        let canonical_candidate = canonicalize_lenient(&candidate)?;
        if !canonical_candidate.starts_with(&canonical_root) {
            debug!(path = raw, resolved = %canonical_candidate.display(), "path escapes workspace");
            return Err(escape().into());
        }
        Ok(candidate)
    }

    /// Current content of a workspace file, `None` if it does not exist yet.
    pub fn read_existing(&self, raw: &str) -> Result<Option<String>> {
        let path = self.resolve(raw)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Write full file content. Byte-identical content is a no-op.
    #[instrument(skip_all, fields(path = raw))]
    pub fn write_file(&self, raw: &str, content: &str) -> Result<WriteOutcome> {
        let path = self.resolve(raw)?;
        let existing = self.read_existing(raw)?;
        if existing.as_deref() == Some(content) {
            debug!("content unchanged, skipping write");
            return Ok(WriteOutcome::Unchanged);
        }
        let display_path = relative_display(raw);
        let diff = unified_diff(existing.as_deref().unwrap_or_default(), content, &display_path);
        write_atomic(&path, content)?;
        debug!(created = existing.is_none(), bytes = content.len(), "file written");
        Ok(WriteOutcome::Written {
            created: existing.is_none(),
            diff,
        })
    }

    /// Write `content_or_diff`: a unified diff is applied to the current
    /// content, anything else replaces the file.
    pub fn apply_content(&self, raw: &str, content_or_diff: &str) -> Result<WriteOutcome> {
        let content = self.final_content(raw, content_or_diff)?;
        self.write_file(raw, &content)
    }

    /// Content `apply_content` would leave at `raw`, without writing it.
    pub fn final_content(&self, raw: &str, content_or_diff: &str) -> Result<String> {
        if !looks_like_unified_diff(content_or_diff) {
            return Ok(content_or_diff.to_string());
        }
        let base = self.read_existing(raw)?.unwrap_or_default();
        apply_unified_diff(&base, content_or_diff).with_context(|| format!("apply diff to {raw}"))
    }
}

fn relative_display(raw: &str) -> String {
    normalize_relative(raw)
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|| raw.to_string())
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                return Ok(missing
                    .into_iter()
                    .rev()
                    .fold(canonical, |acc: PathBuf, part| acc.join(part)));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    bail!("no existing ancestor for {}", path.display());
                };
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            Err(err) => {
                return Err(err).with_context(|| format!("canonicalize {}", existing.display()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_path_escape(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::PathEscape { .. })
        )
    }

    #[test]
    fn writes_nested_files_and_reports_creation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path().join("proj"));
        let outcome = workspace
            .write_file("src/main.py", "print('hi')\n")
            .expect("write");
        match outcome {
            WriteOutcome::Written { created, diff } => {
                assert!(created);
                assert!(diff.contains("+print('hi')"));
            }
            WriteOutcome::Unchanged => panic!("expected a write"),
        }
        assert_eq!(
            fs::read_to_string(temp.path().join("proj/src/main.py")).expect("read"),
            "print('hi')\n"
        );
    }

    #[test]
    fn identical_content_is_not_rewritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        workspace.write_file("a.txt", "same").expect("first");
        let outcome = workspace.write_file("a.txt", "same").expect("second");
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }

    #[test]
    fn parent_escape_is_rejected_before_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path().join("proj"));
        let err = workspace.write_file("../outside.txt", "x").unwrap_err();
        assert!(is_path_escape(&err));
        assert!(!temp.path().join("outside.txt").exists());
        assert!(!temp.path().join("proj").exists());
    }

    #[test]
    fn absolute_path_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        assert!(is_path_escape(&workspace.resolve("/etc/passwd").unwrap_err()));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("proj");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&root).expect("mkdir root");
        fs::create_dir_all(&outside).expect("mkdir outside");
        std::os::unix::fs::symlink(&outside, root.join("link")).expect("symlink");

        let workspace = Workspace::new(&root);
        let err = workspace.write_file("link/evil.txt", "x").unwrap_err();
        assert!(is_path_escape(&err));
        assert!(!outside.join("evil.txt").exists());
    }

    #[test]
    fn unified_diff_content_is_applied_to_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        workspace.write_file("app.py", "a\nb\nc\n").expect("seed");
        let diff = "--- a/app.py\n+++ b/app.py\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n";
        assert_eq!(workspace.final_content("app.py", diff).expect("preview"), "a\nB\nc\n");
        assert_eq!(
            workspace.read_existing("app.py").expect("read"),
            Some("a\nb\nc\n".to_string())
        );
        workspace.apply_content("app.py", diff).expect("apply");
        assert_eq!(
            workspace.read_existing("app.py").expect("read"),
            Some("a\nB\nc\n".to_string())
        );
    }

    #[test]
    fn non_utf8_file_is_a_read_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("app.pyc"), [0xff, 0xfe, 0x00]).expect("write");
        let workspace = Workspace::new(temp.path());
        assert!(workspace.read_existing("app.pyc").is_err());
        assert_eq!(workspace.read_existing("missing.py").expect("read"), None);
    }
}
