use vigil_core::{ChangedFile, Issue};
use vigil_difflens::parser::comment_side;

use crate::github::ReviewCommentRequest;

/// Render an issue as a Markdown review comment.
///
/// A suggested fix is rendered as a host "suggestion" block when the issue
/// asks for it and `allow_suggestions` is set, otherwise as a plain fence.
///
/// # Examples
///
/// ```
/// use vigil_core::{Category, Issue, Severity};
/// use vigil_review::format::format_issue;
///
/// let issue = Issue {
///     line_start: 3,
///     line_end: 3,
///     description: "Unchecked index".into(),
///     severity: Severity::High,
///     category: Category::Bug,
///     suggested_fix: Some("items.get(i)".into()),
///     suggest_as_diff: true,
/// };
/// let body = format_issue(&issue, true);
/// assert!(body.starts_with("**HIGH Severity BUG Issue**: Unchecked index"));
/// assert!(body.ends_with("```suggestion\nitems.get(i)\n```"));
/// ```
pub fn format_issue(issue: &Issue, allow_suggestions: bool) -> String {
    let mut body = format!(
        "**{} Severity {} Issue**: {}",
        issue.severity.label(),
        issue.category.as_str().to_uppercase(),
        issue.description.trim()
    );

    if let Some(fix) = issue.suggested_fix.as_deref().filter(|f| !f.trim().is_empty()) {
        let fix = fix.trim_end_matches('\n');
        if issue.suggest_as_diff && allow_suggestions {
            body.push_str(&format!("\n\n```suggestion\n{fix}\n```"));
        } else {
            body.push_str(&format!("\n\n**Suggested fix:**\n```\n{fix}\n```"));
        }
    }
    body
}

/// Build the review comment request for an anchored issue.
///
/// Single-line issues omit `start_line`.
///
/// # Examples
///
/// ```
/// use vigil_core::{Category, ChangedFile, CommentSide, FileStatus, Issue, Severity};
/// use vigil_review::format::review_comment;
///
/// let file = ChangedFile {
///     filename: "src/a.rs".into(),
///     status: FileStatus::Modified,
///     additions: 2,
///     deletions: 0,
///     changes: 2,
///     patch: Some("@@ -1,1 +1,3 @@\n a\n+b\n+c".into()),
/// };
/// let issue = Issue {
///     line_start: 2,
///     line_end: 3,
///     description: "b and c race".into(),
///     severity: Severity::Medium,
///     category: Category::Bug,
///     suggested_fix: None,
///     suggest_as_diff: false,
/// };
/// let req = review_comment(&file, &issue, "head", true);
/// assert_eq!(req.start_line, Some(2));
/// assert_eq!(req.line, 3);
/// assert_eq!(req.side, CommentSide::Right);
/// ```
pub fn review_comment(
    file: &ChangedFile,
    issue: &Issue,
    head_commit: &str,
    allow_suggestions: bool,
) -> ReviewCommentRequest {
    ReviewCommentRequest {
        commit_id: head_commit.to_string(),
        path: file.filename.clone(),
        body: format_issue(issue, allow_suggestions),
        side: comment_side(file),
        start_line: (issue.line_start < issue.line_end).then_some(issue.line_start),
        line: issue.line_end,
    }
}
