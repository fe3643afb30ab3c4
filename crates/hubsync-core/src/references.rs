//! Cross-reference extraction from free text.
//!
//! Three patterns are applied and their matches unioned: bare `#123`,
//! closing keywords (`fixes #123`, `Resolved #9`, ...) and full issue URLs.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static BARE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)\b").expect("valid bare reference regex"));

static KEYWORD_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+#(\d+)\b")
        .expect("valid keyword reference regex")
});

static URL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/[\w.-]+/[\w.-]+/issues/(\d+)\b")
        .expect("valid url reference regex")
});

/// Issue numbers referenced in `text`, deduplicated and ascending.
pub fn extract_issue_references(text: &str) -> BTreeSet<u64> {
    let mut refs = BTreeSet::new();
    for re in [&*BARE_REF, &*KEYWORD_REF, &*URL_REF] {
        for caps in re.captures_iter(text) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                refs.insert(n);
            }
        }
    }
    refs
}

/// References collected across several texts, excluding `own_number`.
pub fn collect_references<'a, I>(texts: I, own_number: Option<u64>) -> Vec<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut refs = BTreeSet::new();
    for text in texts {
        refs.extend(extract_issue_references(text));
    }
    if let Some(own) = own_number {
        refs.remove(&own);
    }
    refs.into_iter().collect()
}
