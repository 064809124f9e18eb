use std::collections::BTreeMap;
use std::fmt::Write;

use vigil_core::{FileReview, Issue, ReviewResult};

/// Render a structured review result as the summary comment Markdown.
///
/// Sections appear in a fixed order: summary, files reviewed, issue count,
/// overall severity, issues grouped by category (categories sorted by name,
/// issues in encounter order), recommendations, per-file narratives. File
/// summaries for paths outside `reviewed_files` are dropped.
///
/// # Examples
///
/// ```
/// use vigil_core::{ReviewResult, Severity};
/// use vigil_review::summary::render_summary;
///
/// let result = ReviewResult {
///     summary: "Small, safe change.".into(),
///     per_file_summaries: vec![],
///     overall_severity: Severity::Low,
///     recommendations: vec!["Add a test".into()],
/// };
/// let md = render_summary(&result, &["src/lib.rs".to_string()]);
/// assert!(md.starts_with("Small, safe change."));
/// assert!(md.contains("- `src/lib.rs`"));
/// assert!(md.contains("**Issues found:** 0"));
/// assert!(md.contains("- Add a test"));
/// ```
pub fn render_summary(result: &ReviewResult, reviewed_files: &[String]) -> String {
    let files: Vec<&FileReview> = result
        .per_file_summaries
        .iter()
        .filter(|f| reviewed_files.iter().any(|r| r == &f.filename))
        .collect();
    let issue_count: usize = files.iter().map(|f| f.issues.len()).sum();

    let mut out = String::new();
    let summary = result.summary.trim();
    if !summary.is_empty() {
        out.push_str(summary);
        out.push_str("\n\n");
    }

    out.push_str("**Files reviewed:**\n");
    if reviewed_files.is_empty() {
        out.push_str("- _none_\n");
    }
    for file in reviewed_files {
        let _ = writeln!(out, "- `{file}`");
    }

    let _ = write!(
        out,
        "\n**Issues found:** {issue_count}\n**Overall severity:** {}\n",
        result.overall_severity.label()
    );

    let mut by_category: BTreeMap<&'static str, Vec<(&str, &Issue)>> = BTreeMap::new();
    for file in &files {
        for issue in &file.issues {
            by_category
                .entry(issue.category.as_str())
                .or_default()
                .push((file.filename.as_str(), issue));
        }
    }
    if !by_category.is_empty() {
        out.push_str("\n#### Issues by category\n");
        for (category, issues) in &by_category {
            let _ = writeln!(out, "\n##### {category}");
            for (file, issue) in issues {
                let _ = writeln!(
                    out,
                    "- **{}** `{file}` ({}): {}",
                    issue.severity.label(),
                    line_label(issue),
                    issue.description.trim()
                );
            }
        }
    }

    let recommendations: Vec<&str> = result
        .recommendations
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    if !recommendations.is_empty() {
        out.push_str("\n#### Recommendations\n");
        for rec in recommendations {
            let _ = writeln!(out, "- {rec}");
        }
    }

    if !files.is_empty() {
        out.push_str("\n#### File summaries\n");
        for file in files {
            let _ = write!(
                out,
                "\n##### `{}`\n{}\n",
                file.filename,
                file.narrative_summary.trim()
            );
        }
    }

    out.trim_end().to_string()
}

fn line_label(issue: &Issue) -> String {
    if issue.line_start == issue.line_end {
        format!("line {}", issue.line_start)
    } else {
        format!("lines {}-{}", issue.line_start, issue.line_end)
    }
}

/// Minimal summary used when structured aggregation fails.
///
/// The wording is fixed for every count, singular or not.
///
/// # Examples
///
/// ```
/// use vigil_review::summary::fallback_summary;
///
/// assert_eq!(fallback_summary(2, 5), "Reviewed 2 files, found 5 issues.");
/// assert_eq!(fallback_summary(1, 1), "Reviewed 1 files, found 1 issues.");
/// ```
pub fn fallback_summary(files_reviewed: usize, issues_found: usize) -> String {
    format!("Reviewed {files_reviewed} files, found {issues_found} issues.")
}
