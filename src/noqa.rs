use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    /// Extracts codes from `noqa: F401, F403` style comments.
    static ref NOQA_CODES_RE: Regex = Regex::new(r"(?i)noqa:\s*([A-Za-z0-9_, ]+)").unwrap();
}

/// Sentinel stored for a bare suppression with no codes.
pub const ALL: &str = "ALL";

/// Per-file suppression index: 1-based line number to the set of codes in
/// effect on that line. A bare `# noqa` (or `# type: ignore`) stores the
/// `ALL` sentinel.
pub type FileNoqa = BTreeMap<usize, BTreeSet<String>>;

/// Scans a source text for suppression comments. `patterns` are the
/// configured markers (default `# noqa` and `# type: ignore`), matched
/// case-insensitively anywhere in the line's trailing comment.
pub fn scan(source: &str, patterns: &[String]) -> FileNoqa {
    let mut index = FileNoqa::new();

    for (i, line) in source.lines().enumerate() {
        let comment = match line.find('#') {
            Some(pos) => &line[pos..],
            None => continue,
        };
        let comment_lower = comment.to_lowercase();
        if !patterns
            .iter()
            .any(|p| comment_lower.contains(&p.to_lowercase()))
        {
            continue;
        }

        let mut codes = BTreeSet::new();
        if let Some(captures) = NOQA_CODES_RE.captures(comment) {
            for code in captures[1].split(',') {
                let code = code.trim();
                if !code.is_empty() {
                    codes.insert(code.to_string());
                }
            }
        }
        if codes.is_empty() {
            codes.insert(ALL.to_string());
        }
        index.insert(i + 1, codes);
    }

    index
}
