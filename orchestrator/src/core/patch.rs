//! Unified diffs: render between two file versions and apply to a base text.

use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use similar::TextDiff;

static HUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk regex")
});

/// Render a unified diff from `old` to `new` with `a/` and `b/` headers.
/// Returns an empty string when the texts are equal.
pub fn unified_diff(old: &str, new: &str, file_path: &str) -> String {
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{file_path}"), &format!("b/{file_path}"))
        .to_string()
}

/// Whether `text` is a unified diff rather than full file content.
pub fn looks_like_unified_diff(text: &str) -> bool {
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty());
    match lines.next() {
        Some(first) if first.starts_with("--- ") => lines
            .next()
            .is_some_and(|second| second.starts_with("+++ ")),
        Some(first) => HUNK_RE.is_match(first),
        None => false,
    }
}

/// Apply a unified diff to `base`.
///
/// Hunks are applied in order at their stated positions; every context and
/// removed line must match the base exactly. File headers are ignored.
pub fn apply_unified_diff(base: &str, diff: &str) -> Result<String> {
    let base_lines: Vec<&str> = base.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(base_lines.len());
    let mut cursor = 0usize;
    let mut lines = diff.lines().peekable();
    let mut hunks = 0usize;

    while let Some(line) = lines.next() {
        let Some(caps) = HUNK_RE.captures(line) else {
            continue;
        };
        hunks += 1;
        let old_start: usize = caps[1].parse()?;
        // A zero-length hunk's start names the line before the insertion point.
        let old_len: usize = caps.get(2).map_or(Ok(1), |m| m.as_str().parse())?;
        let start = if old_len == 0 { old_start } else { old_start.saturating_sub(1) };
        if start < cursor || start > base_lines.len() {
            bail!("hunk {hunks} starts at line {old_start}, outside the base text");
        }
        out.extend(base_lines[cursor..start].iter().map(|l| (*l).to_string()));
        cursor = start;

        while let Some(body) = lines.peek() {
            if HUNK_RE.is_match(body) {
                break;
            }
            let body = lines.next().unwrap_or_default();
            if body.starts_with("\\ ") {
                continue;
            }
            let mut chars = body.chars();
            let tag = chars.next();
            let text = chars.as_str();
            match tag {
                Some(' ') | None => {
                    expect_line(&base_lines, cursor, text, hunks)?;
                    out.push(text.to_string());
                    cursor += 1;
                }
                Some('-') => {
                    expect_line(&base_lines, cursor, text, hunks)?;
                    cursor += 1;
                }
                Some('+') => out.push(text.to_string()),
                _ => bail!("hunk {hunks}: unexpected diff line {body:?}"),
            }
        }
    }
    if hunks == 0 {
        bail!("diff contains no hunks");
    }
    out.extend(base_lines[cursor..].iter().map(|l| (*l).to_string()));

    let mut result = out.join("\n");
    if !result.is_empty() && (base.ends_with('\n') || base.is_empty()) {
        result.push('\n');
    }
    Ok(result)
}

fn expect_line(base: &[&str], index: usize, expected: &str, hunk: usize) -> Result<()> {
    let actual = base
        .get(index)
        .ok_or_else(|| anyhow!("hunk {hunk}: base text ends before line {}", index + 1))?;
    if *actual != expected {
        bail!(
            "hunk {hunk}: line {} is {actual:?}, diff expects {expected:?}",
            index + 1
        );
    }
    Ok(())
}
