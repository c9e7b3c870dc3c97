//! Approach extraction from brainstorm output.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^###?\s*(?:approach|option|plan)\s*\d*:?\s*(.*)$").expect("option regex")
});
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("placeholder regex"));
static RECOMMENDED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)##\s*Recommended\s+Approach\s*\n+(.*?)(?:\n##|\z)")
        .expect("recommended regex")
});
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[#\-\s*]*)(?:(?:approach|option|plan)\b)?\s*\d*\s*:?\s*").expect("label regex")
});

/// Whether a heading title carries real text once template placeholders such
/// as `[Name]` are removed.
fn has_real_title(title: &str) -> bool {
    let stripped = PLACEHOLDER_RE.replace_all(title, "");
    stripped.trim().chars().any(char::is_alphabetic)
}

/// Enumerate candidate approaches from brainstorm text.
///
/// Headings such as `### Approach 2: Queue workers` are preferred. When none
/// exist, any `### ` heading is used, then `- **bold**` bullets. Lines are
/// trimmed and deduplicated in order of appearance.
pub fn extract_approaches(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut seen = HashSet::new();
    let mut options = Vec::new();

    for line in &lines {
        if let Some(caps) = OPTION_RE.captures(line)
            && has_real_title(&caps[1])
            && seen.insert(*line)
        {
            options.push((*line).to_string());
        }
    }
    if options.is_empty() {
        for line in &lines {
            if let Some(title) = line.strip_prefix("### ")
                && has_real_title(title)
                && seen.insert(*line)
            {
                options.push((*line).to_string());
            }
        }
    }
    if options.is_empty() {
        for line in &lines {
            if line.starts_with("- **") && seen.insert(*line) {
                options.push((*line).to_string());
            }
        }
    }
    options
}

/// Body of the `## Recommended Approach` section, if present.
pub fn extract_recommended(text: &str) -> Option<String> {
    RECOMMENDED_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|body| !body.is_empty())
}

/// Bare title of an option line, without heading markers or numbering.
pub fn approach_title(option: &str) -> String {
    let without_label = LABEL_RE.replace(option, "");
    without_label.trim().trim_matches('*').trim().to_string()
}

/// Index the auto-select policy picks: the first option whose title is named
/// in the recommendation, otherwise the first option.
pub fn default_choice(options: &[String], recommended: Option<&str>) -> usize {
    let Some(recommended) = recommended.map(str::to_lowercase) else {
        return 0;
    };
    options
        .iter()
        .position(|option| {
            let title = approach_title(option).to_lowercase();
            !title.is_empty() && recommended.contains(&title)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVIEW: &str = "## Refined Approaches\n\n\
### Approach 1: [Name]\n\
### Approach 1: Requests + BeautifulSoup\n- **Summary:** simple\n\n\
### Approach 2: Scrapy spiders\n- **Summary:** heavier\n\n\
## Review Notes\n- none\n\n\
## Recommended Approach\nScrapy spiders, because the site paginates.\n";

    #[test]
    fn headings_are_enumerated_without_placeholders() {
        let options = extract_approaches(REVIEW);
        assert_eq!(
            options,
            vec![
                "### Approach 1: Requests + BeautifulSoup".to_string(),
                "### Approach 2: Scrapy spiders".to_string(),
            ]
        );
    }

    #[test]
    fn bold_bullets_are_the_last_fallback() {
        let text = "- **Approach 1: CLI**\n  - *Summary:* x\n- **Approach 2: Web**\n";
        assert_eq!(extract_approaches(text).len(), 2);
        assert!(extract_approaches("nothing structured here").is_empty());
    }

    #[test]
    fn recommendation_drives_default_choice() {
        let options = extract_approaches(REVIEW);
        let recommended = extract_recommended(REVIEW);
        assert_eq!(
            recommended.as_deref(),
            Some("Scrapy spiders, because the site paginates.")
        );
        assert_eq!(default_choice(&options, recommended.as_deref()), 1);
        assert_eq!(default_choice(&options, None), 0);
    }

    #[test]
    fn title_strips_markers() {
        assert_eq!(approach_title("### Approach 2: Scrapy spiders"), "Scrapy spiders");
        assert_eq!(approach_title("- **Approach 1: CLI**"), "CLI");
    }
}
