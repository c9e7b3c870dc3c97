//! Lexical path containment for workspace-relative task paths.

use std::path::{Component, Path, PathBuf};

/// Normalize `raw` as a path relative to the workspace root.
///
/// Returns `None` if the path is absolute, empty, or climbs above the root
/// through `..` components. `.` components are dropped. The filesystem is not
/// consulted; symlink containment is checked separately at write time.
pub fn normalize_relative(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.into_iter().collect())
}
