use vigil_core::{ChangedFile, CommentSide, FileStatus, VigilError};

/// Kind of a line inside a diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Present only in the head version (`+`).
    Added,
    /// Present only in the base version (`-`).
    Removed,
    /// Unchanged line shown for context (` `).
    Context,
}

/// One line of a hunk with its position on each side of the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLine {
    pub kind: LineKind,
    /// Line number in the base version, if the line exists there.
    pub old_line: Option<u32>,
    /// Line number in the head version, if the line exists there.
    pub new_line: Option<u32>,
    /// Line text without the leading marker.
    pub text: String,
}

/// A single `@@ -a,b +c,d @@` hunk of a per-file patch.
///
/// # Examples
///
/// ```
/// use vigil_difflens::parser::parse_patch;
///
/// let hunks = parse_patch("@@ -1,2 +1,3 @@\n fn main() {\n+    run();\n }").unwrap();
/// assert_eq!(hunks.len(), 1);
/// assert_eq!(hunks[0].new_start, 1);
/// assert_eq!(hunks[0].lines.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<PatchLine>,
}

/// Parse the patch text the host attaches to a changed file.
///
/// Host patches start directly at the first hunk header, but `diff --git`,
/// `index`, `---` and `+++` header lines are tolerated and skipped, as is
/// anything before the first hunk.
///
/// # Errors
///
/// Returns [`VigilError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use vigil_difflens::parser::{parse_patch, LineKind};
///
/// let hunks = parse_patch("@@ -3 +3 @@\n-old\n+new").unwrap();
/// let kinds: Vec<LineKind> = hunks[0].lines.iter().map(|l| l.kind).collect();
/// assert_eq!(kinds, vec![LineKind::Removed, LineKind::Added]);
/// assert_eq!(hunks[0].lines[0].old_line, Some(3));
/// assert_eq!(hunks[0].lines[1].new_line, Some(3));
/// ```
pub fn parse_patch(patch: &str) -> Result<Vec<PatchHunk>, VigilError> {
    let mut hunks: Vec<PatchHunk> = Vec::new();
    let mut old_cursor = 0u32;
    let mut new_cursor = 0u32;

    for line in patch.lines() {
        if line.starts_with("@@") {
            let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            old_cursor = old_start;
            new_cursor = new_start;
            hunks.push(PatchHunk {
                old_start,
                old_lines,
                new_start,
                new_lines,
                lines: Vec::new(),
            });
            continue;
        }

        let Some(hunk) = hunks.last_mut() else {
            continue;
        };

        if line.starts_with('\\') {
            // "\ No newline at end of file"
            continue;
        }

        let parsed = if let Some(text) = line.strip_prefix('+') {
            let l = PatchLine {
                kind: LineKind::Added,
                old_line: None,
                new_line: Some(new_cursor),
                text: text.to_string(),
            };
            new_cursor += 1;
            l
        } else if let Some(text) = line.strip_prefix('-') {
            let l = PatchLine {
                kind: LineKind::Removed,
                old_line: Some(old_cursor),
                new_line: None,
                text: text.to_string(),
            };
            old_cursor += 1;
            l
        } else {
            // Context lines start with a space; some tools strip it from blank lines.
            let text = line.strip_prefix(' ').unwrap_or(line);
            let l = PatchLine {
                kind: LineKind::Context,
                old_line: Some(old_cursor),
                new_line: Some(new_cursor),
                text: text.to_string(),
            };
            old_cursor += 1;
            new_cursor += 1;
            l
        };
        hunk.lines.push(parsed);
    }

    Ok(hunks)
}

fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), VigilError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| VigilError::Parse(format!("invalid hunk header: {line}")))?;

    let mut parts = inner.split_whitespace();
    let (Some(old), Some(new), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(VigilError::Parse(format!("invalid hunk header: {line}")));
    };

    let old = old
        .strip_prefix('-')
        .ok_or_else(|| VigilError::Parse(format!("invalid old range in hunk: {line}")))?;
    let new = new
        .strip_prefix('+')
        .ok_or_else(|| VigilError::Parse(format!("invalid new range in hunk: {line}")))?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), VigilError> {
    let invalid = || VigilError::Parse(format!("invalid range in: {context}"));
    match range.split_once(',') {
        Some((start, count)) => Ok((
            start.parse().map_err(|_| invalid())?,
            count.parse().map_err(|_| invalid())?,
        )),
        None => Ok((range.parse().map_err(|_| invalid())?, 1)),
    }
}

/// Head-side line ranges added by a patch, merged where they touch.
///
/// # Errors
///
/// Returns [`VigilError::Parse`] if the patch has a malformed hunk header.
///
/// # Examples
///
/// ```
/// use vigil_difflens::parser::added_line_ranges;
///
/// let ranges = added_line_ranges("@@ -1,3 +1,4 @@\n a\n+b\n+c\n d\n-e\n+f").unwrap();
/// assert_eq!(ranges, vec![(2, 3), (5, 5)]);
/// ```
pub fn added_line_ranges(patch: &str) -> Result<Vec<(u32, u32)>, VigilError> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    let added = parse_patch(patch)?
        .into_iter()
        .flat_map(|h| h.lines)
        .filter(|l| l.kind == LineKind::Added)
        .filter_map(|l| l.new_line);
    for line in added {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == line => *end = line,
            _ => ranges.push((line, line)),
        }
    }
    Ok(ranges)
}

/// Pick the diff side for comments on `file`.
///
/// Issue lines are numbered against the content the model saw. That is the
/// head version unless the file was removed, in which case only the base
/// version exists and the comment goes LEFT. Everything else is RIGHT, even
/// when the same number was deleted from the base version.
///
/// # Examples
///
/// ```
/// use vigil_core::{ChangedFile, CommentSide, FileStatus};
/// use vigil_difflens::parser::comment_side;
///
/// let mut file = ChangedFile {
///     filename: "old.rs".into(),
///     status: FileStatus::Removed,
///     additions: 0,
///     deletions: 2,
///     changes: 2,
///     patch: Some("@@ -1,2 +0,0 @@\n-a\n-b".into()),
/// };
/// assert_eq!(comment_side(&file), CommentSide::Left);
///
/// file.status = FileStatus::Modified;
/// assert_eq!(comment_side(&file), CommentSide::Right);
/// ```
pub fn comment_side(file: &ChangedFile) -> CommentSide {
    if file.status == FileStatus::Removed {
        CommentSide::Left
    } else {
        CommentSide::Right
    }
}
