//! Line-anchor validation and relocation for model-reported issues.
//!
//! Models often cite a line a few rows away from the code they describe. An
//! issue is kept when its description shares vocabulary with the cited line
//! or its close neighbours; otherwise a wider neighbourhood is searched for a
//! better line, and the issue is dropped if none scores higher.

use std::collections::HashSet;

use vigil_core::Issue;

/// Lines either side of the cited line that count as "on target".
pub const RELEVANCE_WINDOW: u32 = 3;
/// Lines either side of the cited line searched for a better anchor.
pub const SEARCH_RADIUS: u32 = 10;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "are", "was", "were", "not", "but",
    "has", "have", "had", "can", "could", "should", "would", "will", "may", "might", "must",
    "into", "when", "where", "which", "while", "there", "their", "then", "than", "its", "also",
    "any", "all", "been", "being", "does", "doesn", "line", "code", "here", "use", "using",
];

const DECLARATION_KEYWORDS: &[&str] = &["function", "const", "let", "var", "class"];

/// Outcome of anchoring an issue to its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Cited lines are plausible as given.
    Keep(Issue),
    /// Moved to a better-matching line; `from` is the original start line.
    Relocated { issue: Issue, from: u32 },
    /// Not postable.
    Discard(DiscardReason),
}

/// Why an issue was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Zero line, inverted range or empty description.
    Malformed,
    /// Range ends past the last line of the file.
    OutOfBounds { line_end: u32, line_count: u32 },
    /// Nothing nearby relates to the description.
    Irrelevant,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::Malformed => write!(f, "malformed issue"),
            DiscardReason::OutOfBounds {
                line_end,
                line_count,
            } => write!(f, "line {line_end} is past end of file ({line_count} lines)"),
            DiscardReason::Irrelevant => write!(f, "description does not match nearby code"),
        }
    }
}

/// Validate `issue` against the file `content` and relocate it if needed.
///
/// # Examples
///
/// ```
/// use vigil_core::{Category, Issue, Severity};
/// use vigil_review::anchor::{anchor_issue, Anchor, DiscardReason};
///
/// let content = "fn main() {\n    let password = read_password();\n}";
/// let issue = Issue {
///     line_start: 2,
///     line_end: 2,
///     description: "The password is read without validation".into(),
///     severity: Severity::Medium,
///     category: Category::Security,
///     suggested_fix: None,
///     suggest_as_diff: false,
/// };
/// assert!(matches!(anchor_issue(issue.clone(), content), Anchor::Keep(_)));
///
/// let past_end = Issue { line_start: 9, line_end: 9, ..issue };
/// assert!(matches!(
///     anchor_issue(past_end, content),
///     Anchor::Discard(DiscardReason::OutOfBounds { .. })
/// ));
/// ```
pub fn anchor_issue(issue: Issue, content: &str) -> Anchor {
    if !issue.is_well_formed() {
        return Anchor::Discard(DiscardReason::Malformed);
    }
    let lines: Vec<&str> = content.lines().collect();
    let line_count = lines.len() as u32;
    if issue.line_end > line_count {
        return Anchor::Discard(DiscardReason::OutOfBounds {
            line_end: issue.line_end,
            line_count,
        });
    }

    let description = Description::new(&issue.description);
    let window_start = issue.line_start.saturating_sub(RELEVANCE_WINDOW).max(1);
    let window_end = (issue.line_end + RELEVANCE_WINDOW).min(line_count);
    let relevant = (window_start..=window_end)
        .any(|n| description.score(lines[n as usize - 1]) > 0);
    if relevant {
        return Anchor::Keep(issue);
    }

    match find_better_matching_line(&lines, &issue.description, issue.line_start, SEARCH_RADIUS) {
        Some(target) => {
            let from = issue.line_start;
            let span = issue.line_end - issue.line_start;
            let (start, end) = if target + span > line_count {
                (line_count.saturating_sub(span).max(1), line_count)
            } else {
                (target, target + span)
            };
            Anchor::Relocated {
                issue: Issue {
                    line_start: start,
                    line_end: end,
                    ..issue
                },
                from,
            }
        }
        None => Anchor::Discard(DiscardReason::Irrelevant),
    }
}

/// Search `original ± radius` for a line scoring strictly higher than the
/// original line and above zero.
///
/// Candidates are visited nearest first, lower line first at equal distance;
/// a later candidate must beat the best so far, so ties keep the nearer line.
/// Returns `None` when the original line stays the best.
///
/// # Examples
///
/// ```
/// use vigil_review::anchor::find_better_matching_line;
///
/// let lines = vec!["}", "", "const retries = loadRetries();", "", "}"];
/// let found = find_better_matching_line(&lines, "retries is never bounded", 1, 10);
/// assert_eq!(found, Some(3));
/// ```
pub fn find_better_matching_line(
    lines: &[&str],
    description: &str,
    original: u32,
    radius: u32,
) -> Option<u32> {
    let line_count = lines.len() as u32;
    if original == 0 || original > line_count {
        return None;
    }
    let description = Description::new(description);
    let original_score = description.score(lines[original as usize - 1]);

    let mut best_line = original;
    let mut best_score = original_score.max(0);
    for distance in 1..=radius {
        let below = original.checked_sub(distance).filter(|&n| n >= 1);
        let above = Some(original + distance).filter(|&n| n <= line_count);
        for candidate in [below, above].into_iter().flatten() {
            let score = description.score(lines[candidate as usize - 1]);
            if score > best_score {
                best_score = score;
                best_line = candidate;
            }
        }
    }

    (best_line != original).then_some(best_line)
}

/// Relevance of `line` to `description`.
///
/// # Examples
///
/// ```
/// use vigil_review::anchor::relevance_score;
///
/// // shared tokens "user" and "query" plus the declaration bonus for `query`
/// assert_eq!(relevance_score("const query = build(user);", "Unescaped user input reaches query"), 9);
/// assert_eq!(relevance_score("}", "Unescaped user input reaches query"), -2);
/// ```
pub fn relevance_score(line: &str, description: &str) -> i32 {
    Description::new(description).score(line)
}

struct Description {
    tokens: HashSet<String>,
    words: HashSet<String>,
}

impl Description {
    fn new(text: &str) -> Self {
        Self {
            tokens: tokenize(text),
            words: identifier_words(text),
        }
    }

    fn score(&self, line: &str) -> i32 {
        let shared = tokenize(line).intersection(&self.tokens).count() as i32;
        let mut score = 2 * shared;
        if let Some(ident) = declared_identifier(line) {
            if self.words.contains(&ident.to_lowercase()) {
                score += 5;
            }
        }
        if line.trim().chars().count() < 3 {
            score -= 2;
        }
        score
    }
}

/// Lowercased alphanumeric words longer than two characters, minus stopwords.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn identifier_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Name introduced by a `function`/`const`/`let`/`var`/`class` declaration.
fn declared_identifier(line: &str) -> Option<&str> {
    let mut words = line
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|w| !w.is_empty());
    while let Some(word) = words.next() {
        if DECLARATION_KEYWORDS.contains(&word) {
            return words.next().filter(|w| !DECLARATION_KEYWORDS.contains(w));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{Category, Severity};

    fn issue(start: u32, end: u32, description: &str) -> Issue {
        Issue {
            line_start: start,
            line_end: end,
            description: description.into(),
            severity: Severity::High,
            category: Category::Bug,
            suggested_fix: None,
            suggest_as_diff: false,
        }
    }

    fn file_with(line_no: usize, text: &str, total: usize) -> String {
        (1..=total)
            .map(|n| if n == line_no { text.to_string() } else { format!("noop_{n}();") })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn tokenize_drops_short_words_and_stopwords() {
        let t = tokenize("The DB handle is not closed in this_path");
        assert!(t.contains("handle"));
        assert!(t.contains("closed"));
        assert!(t.contains("path"));
        assert!(!t.contains("the"));
        assert!(!t.contains("db"));
        assert!(!t.contains("not"));
    }

    #[test]
    fn word_length_counts_characters() {
        let t = tokenize("ñö café");
        assert!(!t.contains("ñö"));
        assert!(t.contains("café"));
        assert_eq!(relevance_score("ñö", "unrelated text"), -2);
        assert_eq!(relevance_score("ñöx", "unrelated text"), 0);
    }

    #[test]
    fn declaration_identifier_extraction() {
        assert_eq!(declared_identifier("export const apiKey = env.KEY;"), Some("apiKey"));
        assert_eq!(declared_identifier("async function fetchUser(id) {"), Some("fetchUser"));
        assert_eq!(declared_identifier("class Session {"), Some("Session"));
        assert_eq!(declared_identifier("return value;"), None);
    }

    #[test]
    fn declaration_bonus_needs_identifier_in_description() {
        let with = relevance_score("let total = 0;", "total overflows on large carts");
        let without = relevance_score("let count = 0;", "total overflows on large carts");
        assert_eq!(with, 2 + 5);
        assert_eq!(without, 0);
    }

    #[test]
    fn malformed_issue_is_discarded() {
        assert_eq!(
            anchor_issue(issue(0, 1, "x"), "a\nb"),
            Anchor::Discard(DiscardReason::Malformed)
        );
    }

    #[test]
    fn range_past_end_is_discarded() {
        let content = file_with(1, "token", 5);
        let anchor = anchor_issue(issue(4, 6, "token leak"), &content);
        assert_eq!(
            anchor,
            Anchor::Discard(DiscardReason::OutOfBounds {
                line_end: 6,
                line_count: 5
            })
        );
    }

    #[test]
    fn nearby_match_within_window_is_kept() {
        let content = file_with(12, "db.execute(rawQuery);", 30);
        let anchor = anchor_issue(issue(10, 10, "rawQuery is executed unescaped"), &content);
        assert_eq!(anchor, Anchor::Keep(issue(10, 10, "rawQuery is executed unescaped")));
    }

    #[test]
    fn distant_match_is_relocated_preserving_span() {
        let content = file_with(18, "const secret = process.env.SECRET;", 40);
        let anchor = anchor_issue(issue(10, 11, "secret is logged to stdout"), &content);
        match anchor {
            Anchor::Relocated { issue, from } => {
                assert_eq!(from, 10);
                assert_eq!(issue.line_start, 18);
                assert_eq!(issue.line_end, 19);
            }
            other => panic!("expected relocation, got {other:?}"),
        }
    }

    #[test]
    fn relocation_is_clamped_to_file_end() {
        let content = file_with(20, "let buffer = alloc();", 20);
        let anchor = anchor_issue(issue(10, 12, "buffer is never freed"), &content);
        match anchor {
            Anchor::Relocated { issue, .. } => {
                assert_eq!(issue.line_start, 18);
                assert_eq!(issue.line_end, 20);
            }
            other => panic!("expected relocation, got {other:?}"),
        }
    }

    #[test]
    fn nothing_related_is_discarded() {
        let content = file_with(1, "noop();", 40);
        assert_eq!(
            anchor_issue(issue(20, 20, "mutex poisoned on panic"), &content),
            Anchor::Discard(DiscardReason::Irrelevant)
        );
    }

    #[test]
    fn original_wins_ties() {
        let lines = vec!["cache miss", "x", "cache miss"];
        assert_eq!(find_better_matching_line(&lines, "cache miss storm", 1, 10), None);
    }

    #[test]
    fn nearer_candidate_wins_ties() {
        let lines = vec!["a1", "retry", "b1", "b2", "b3", "retry"];
        assert_eq!(find_better_matching_line(&lines, "retry storm", 4, 10), Some(2));
    }

    #[test]
    fn relocation_is_deterministic() {
        let content = file_with(25, "const limit = parse(input);", 40);
        let lines: Vec<&str> = content.lines().collect();
        let first = find_better_matching_line(&lines, "limit is not validated", 20, 10);
        for _ in 0..5 {
            assert_eq!(
                find_better_matching_line(&lines, "limit is not validated", 20, 10),
                first
            );
        }
        assert_eq!(first, Some(25));
    }
}
