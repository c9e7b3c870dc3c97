//! Review engine: structure code-review output and select items to fix.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::core::text::{extract_json_array, extract_json_object};
use crate::core::types::{ReviewItem, Severity};

/// A review entry that was dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewParseWarning {
    /// Zero-based position of the entry in the reviewer's `items` array.
    pub index: usize,
    pub reason: String,
}

impl fmt::Display for ReviewParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "review item #{} dropped: {}", self.index, self.reason)
    }
}

/// Structured result of one code review.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewReport {
    /// False when the output carried no JSON payload at all.
    pub parsed: bool,
    pub overall_assessment: Option<String>,
    pub requires_fixes: bool,
    pub items: Vec<ReviewItem>,
    pub warnings: Vec<ReviewParseWarning>,
}

/// Stable identifier for a finding, independent of the reviewer's numbering.
pub fn fingerprint(file: &str, item_type: &str, description: &str) -> String {
    let normalized: Vec<String> = description
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(file.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(item_type.trim().to_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.join(" ").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..10].to_string()
}

/// Parse reviewer output.
///
/// Accepts an object with an `items` array or a bare array of items, possibly
/// wrapped in prose or fences. Entries missing a severity, file or description
/// are dropped with a warning; parsing never fails.
pub fn parse_review(text: &str) -> ReviewReport {
    let (items_value, overall_assessment, requires_fixes) = match extract_json_object(text) {
        Some(Value::Object(mut map)) if map.contains_key("items") => {
            let overall = map
                .get("overall_assessment")
                .and_then(Value::as_str)
                .map(str::to_string);
            let requires = map.get("requires_fixes").and_then(Value::as_bool);
            (map.remove("items"), overall, requires)
        }
        _ => match extract_json_array(text) {
            Some(items) => (Some(Value::Array(items)), None, None),
            None => return ReviewReport::default(),
        },
    };

    let mut report = ReviewReport {
        parsed: true,
        overall_assessment,
        ..ReviewReport::default()
    };
    let entries = match items_value {
        Some(Value::Array(entries)) => entries,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            report.warnings.push(ReviewParseWarning {
                index: 0,
                reason: "`items` is not an array".to_string(),
            });
            Vec::new()
        }
    };

    let mut seen = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        match item_from_value(entry, index) {
            Ok(item) => {
                if seen.insert(item.id.clone()) {
                    report.items.push(item);
                } else {
                    report.warnings.push(ReviewParseWarning {
                        index,
                        reason: format!("duplicate of item {}", item.id),
                    });
                }
            }
            Err(err) => report.warnings.push(ReviewParseWarning {
                index,
                reason: err.to_string(),
            }),
        }
    }
    report.requires_fixes = requires_fixes.unwrap_or(!report.items.is_empty());
    report
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn u32_field(object: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_u64))
        .and_then(|n| u32::try_from(n).ok())
}

fn item_from_value(value: &Value, index: usize) -> Result<ReviewItem> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("entry is not an object"))?;

    let severity: Severity = text_field(object, &["severity"])
        .ok_or_else(|| anyhow!("missing severity"))?
        .parse()?;
    let file =
        text_field(object, &["file", "file_path"]).ok_or_else(|| anyhow!("missing file"))?;
    let description =
        text_field(object, &["description"]).ok_or_else(|| anyhow!("missing description"))?;
    let item_type = text_field(object, &["type", "review_type"])
        .unwrap_or_else(|| "improvement".to_string());
    let ordinal = u32_field(object, &["item_id", "id"])
        .unwrap_or_else(|| u32::try_from(index + 1).unwrap_or(u32::MAX));

    Ok(ReviewItem {
        id: fingerprint(&file, &item_type, &description),
        ordinal,
        severity,
        item_type,
        file,
        description,
        suggestion: text_field(object, &["suggestion"]),
        line_start: u32_field(object, &["line_start"]),
        line_end: u32_field(object, &["line_end"]),
    })
}

/// How review items are chosen for the Fix stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewSelection {
    All,
    None,
    /// Reviewer ordinals or fingerprint ids.
    Ids(Vec<String>),
    /// Items at or above this severity.
    AtLeast(Severity),
}

impl ReviewSelection {
    /// Parse an interactive choice: `a`, `n`, `c` (critical and high),
    /// `>=medium`, or a comma-separated id list such as `1,3`.
    pub fn parse(input: &str) -> Result<Self> {
        let choice = input.trim().to_ascii_lowercase();
        match choice.as_str() {
            "" => bail!("empty selection"),
            "a" | "all" => return Ok(ReviewSelection::All),
            "n" | "none" => return Ok(ReviewSelection::None),
            "c" => return Ok(ReviewSelection::AtLeast(Severity::High)),
            _ => {}
        }
        if let Some(level) = choice.strip_prefix(">=") {
            return Ok(ReviewSelection::AtLeast(level.parse()?));
        }
        let ids: Vec<String> = choice
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            bail!("no ids in selection {input:?}");
        }
        Ok(ReviewSelection::Ids(ids))
    }

    /// Apply the selection, returning items ordered by severity then ordinal.
    pub fn apply(&self, items: &[ReviewItem]) -> Vec<ReviewItem> {
        let mut selected: Vec<ReviewItem> = items
            .iter()
            .filter(|item| match self {
                ReviewSelection::All => true,
                ReviewSelection::None => false,
                ReviewSelection::AtLeast(threshold) => item.severity <= *threshold,
                ReviewSelection::Ids(ids) => ids
                    .iter()
                    .any(|id| *id == item.id || *id == item.ordinal.to_string()),
            })
            .cloned()
            .collect();
        sort_by_severity(&mut selected);
        selected
    }
}

pub fn sort_by_severity(items: &mut [ReviewItem]) {
    items.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
}

/// Items in `current` that were already reported by `previous`.
pub fn unresolved<'a>(previous: &[ReviewItem], current: &'a [ReviewItem]) -> Vec<&'a ReviewItem> {
    let before: HashSet<&str> = previous.iter().map(|item| item.id.as_str()).collect();
    current
        .iter()
        .filter(|item| before.contains(item.id.as_str()))
        .collect()
}
