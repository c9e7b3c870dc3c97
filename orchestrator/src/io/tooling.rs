//! Project tooling detection from marker files in the workspace.

use std::fs;
use std::path::Path;

use tracing::debug;

/// Name the build/package tools the workspace already uses, comma-joined in
/// detection order, or `unknown` when no marker is present.
pub fn detect_tooling(root: &Path) -> String {
    let mut found: Vec<&'static str> = Vec::new();
    let mut add = |name: &'static str| {
        if !found.contains(&name) {
            found.push(name);
        }
    };

    if root.join("uv.lock").is_file() {
        add("uv");
    }
    // Unreadable or non-UTF-8 manifests count as absent.
    if let Ok(bytes) = fs::read(root.join("pyproject.toml")) {
        let manifest = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
        for (table, name) in [("[tool.poetry]", "poetry"), ("[tool.pdm]", "pdm"), ("[tool.uv]", "uv")] {
            if manifest.contains(table) {
                add(name);
            }
        }
    }
    if root.join("poetry.lock").is_file() {
        add("poetry");
    }
    if root.join("pdm.toml").is_file() {
        add("pdm");
    }
    if root.join("Cargo.toml").is_file() {
        add("cargo");
    }
    if root.join("package.json").is_file() {
        add("npm");
    }

    let tooling = if found.is_empty() {
        "unknown".to_string()
    } else {
        found.join(", ")
    };
    debug!(root = %root.display(), %tooling, "tooling detected");
    tooling
}
