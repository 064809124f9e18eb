//! Incremental review baseline carried in the posted summary comment.
//!
//! The summary body starts with [`MARKER_PREFIX`] followed by the head commit
//! and [`SUMMARY_SEPARATOR`]. The next run finds the newest such comment and
//! diffs from that commit instead of the pull request base. These strings are
//! read back by later runs and must not change.

use crate::github::HostComment;

/// Start of every summary comment.
pub const MARKER_PREFIX: &str = "AI review done up to commit: ";
/// Separates the recorded commit from the rendered summary.
pub const SUMMARY_SEPARATOR: &str = "\n\n### AI Review Summary:\n";

/// Compose the summary comment body for `head_commit`.
///
/// # Examples
///
/// ```
/// use vigil_review::baseline::summary_body;
///
/// let body = summary_body("abc123", "All good.");
/// assert_eq!(body, "AI review done up to commit: abc123\n\n### AI Review Summary:\nAll good.");
/// ```
pub fn summary_body(head_commit: &str, markdown: &str) -> String {
    format!("{MARKER_PREFIX}{head_commit}{SUMMARY_SEPARATOR}{markdown}")
}

/// Extract the recorded commit from a single comment body.
///
/// Returns `None` unless the body starts with the marker, contains the
/// separator, and the token between them is a single non-empty word.
///
/// # Examples
///
/// ```
/// use vigil_review::baseline::marker_commit;
///
/// assert_eq!(
///     marker_commit("AI review done up to commit: abc123\n\n### AI Review Summary:\n..."),
///     Some("abc123")
/// );
/// assert_eq!(marker_commit("see AI review done up to commit: abc123"), None);
/// ```
pub fn marker_commit(body: &str) -> Option<&str> {
    let rest = body.strip_prefix(MARKER_PREFIX)?;
    let (commit, _) = rest.split_once(SUMMARY_SEPARATOR)?;
    let commit = commit.trim();
    if commit.is_empty() || commit.contains(char::is_whitespace) {
        return None;
    }
    Some(commit)
}

/// Decide the base commit for this run.
///
/// Comments are in chronological order; the newest marker comment wins. Only
/// the newest marker is consulted: if it is malformed the review falls back
/// to `default_base` rather than an older marker.
///
/// # Examples
///
/// ```
/// use vigil_review::baseline::resolve_baseline;
///
/// assert_eq!(resolve_baseline(&[], "base0"), "base0");
/// ```
pub fn resolve_baseline(comments: &[HostComment], default_base: &str) -> String {
    comments
        .iter()
        .rev()
        .find(|c| c.body().starts_with(MARKER_PREFIX))
        .and_then(|c| marker_commit(c.body()))
        .unwrap_or(default_base)
        .to_string()
}
