use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Change status of a file in a commit range, as reported by the host.
///
/// Unknown status strings decode as [`FileStatus::Changed`].
///
/// # Examples
///
/// ```
/// use vigil_core::FileStatus;
///
/// let s: FileStatus = serde_json::from_str("\"renamed\"").unwrap();
/// assert_eq!(s, FileStatus::Renamed);
/// let s: FileStatus = serde_json::from_str("\"mystery\"").unwrap();
/// assert_eq!(s, FileStatus::Changed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Unchanged,
    #[serde(other)]
    Changed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Changed => "changed",
            FileStatus::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// A file changed between two commits of a pull request.
///
/// Produced by the host gateway and consumed read-only by the rest of the
/// pipeline.
///
/// # Examples
///
/// ```
/// use vigil_core::{ChangedFile, FileStatus};
///
/// let file = ChangedFile {
///     filename: "src/lib.rs".into(),
///     status: FileStatus::Modified,
///     additions: 3,
///     deletions: 1,
///     changes: 4,
///     patch: Some("@@ -1 +1,3 @@\n-a\n+b\n+c\n+d".into()),
/// };
/// assert_eq!(file.changes, file.additions + file.deletions);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Repository-relative path in the head commit.
    pub filename: String,
    /// How the file changed.
    pub status: FileStatus,
    /// Number of added lines.
    #[serde(default)]
    pub additions: u32,
    /// Number of deleted lines.
    #[serde(default)]
    pub deletions: u32,
    /// Total changed lines.
    #[serde(default)]
    pub changes: u32,
    /// Unified diff for this file, absent for binary or very large files.
    #[serde(default)]
    pub patch: Option<String>,
}

/// Issue severity reported by the reviewer.
///
/// # Examples
///
/// ```
/// use vigil_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"high\"").unwrap();
/// assert_eq!(s, Severity::High);
/// assert!(Severity::High > Severity::Low);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor or cosmetic problem.
    #[default]
    Low,
    /// Worth fixing before merge.
    Medium,
    /// Likely defect or vulnerability.
    High,
}

impl Severity {
    /// Upper-case label used in rendered comments.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Classification of a review issue.
///
/// # Examples
///
/// ```
/// use vigil_core::Category;
///
/// let c: Category = "type-safety".parse().unwrap();
/// assert_eq!(c, Category::TypeSafety);
/// assert_eq!(c.to_string(), "type-safety");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Security,
    Performance,
    Bug,
    TypeSafety,
    ErrorHandling,
    Maintainability,
    BestPractice,
    Other,
}

impl Category {
    /// Wire name of the category, also used for lexicographic grouping.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Bug => "bug",
            Category::TypeSafety => "type-safety",
            Category::ErrorHandling => "error-handling",
            Category::Maintainability => "maintainability",
            Category::BestPractice => "best-practice",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "security" => Ok(Category::Security),
            "performance" => Ok(Category::Performance),
            "bug" => Ok(Category::Bug),
            "type-safety" => Ok(Category::TypeSafety),
            "error-handling" => Ok(Category::ErrorHandling),
            "maintainability" => Ok(Category::Maintainability),
            "best-practice" => Ok(Category::BestPractice),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// A single finding produced by the LLM for one file.
///
/// Line numbers refer to the head version of the file and are 1-based.
///
/// # Examples
///
/// ```
/// use vigil_core::{Category, Issue, Severity};
///
/// let issue = Issue {
///     line_start: 4,
///     line_end: 6,
///     description: "Token is logged in plain text".into(),
///     severity: Severity::High,
///     category: Category::Security,
///     suggested_fix: None,
///     suggest_as_diff: false,
/// };
/// assert!(issue.is_well_formed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// First line of the affected range (1-based).
    pub line_start: u32,
    /// Last line of the affected range (inclusive).
    pub line_end: u32,
    /// What is wrong and why it matters.
    pub description: String,
    pub severity: Severity,
    pub category: Category,
    /// Replacement code for the affected range.
    #[serde(default)]
    pub suggested_fix: Option<String>,
    /// Render the fix as a one-click suggested change.
    #[serde(default)]
    pub suggest_as_diff: bool,
}

impl Issue {
    /// Structural checks independent of the target file: positive lines,
    /// ordered range, non-empty description.
    pub fn is_well_formed(&self) -> bool {
        self.line_start >= 1
            && self.line_end >= self.line_start
            && !self.description.trim().is_empty()
    }
}

/// Follow-up request the model may attach to a review step.
///
/// Also used to decode tool invocations: the tool name is the `action` tag
/// and the remaining fields are its arguments.
///
/// # Examples
///
/// ```
/// use vigil_core::NextAction;
///
/// let json = r#"{"action":"get_file_content","path":"src/db.rs","startLine":10,"endLine":20}"#;
/// let action: NextAction = serde_json::from_str(json).unwrap();
/// assert!(matches!(action, NextAction::GetFileContent { start_line: Some(10), .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    /// Fetch (a slice of) another file in the head commit.
    GetFileContent {
        path: String,
        #[serde(default, rename = "startLine")]
        start_line: Option<u32>,
        #[serde(default, rename = "endLine")]
        end_line: Option<u32>,
    },
    /// List a directory of the repository at the head commit.
    ExploreProject {
        #[serde(default)]
        path: Option<String>,
    },
}

impl NextAction {
    /// Tool name matching the `action` tag.
    pub fn name(&self) -> &'static str {
        match self {
            NextAction::GetFileContent { .. } => "get_file_content",
            NextAction::ExploreProject { .. } => "explore_project",
        }
    }
}

/// One iteration of the per-file analysis loop, as returned by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStep {
    /// File the model believes it is analysing.
    pub current_file: String,
    /// `true` once the model has nothing more to inspect in this file.
    pub analysis_complete: bool,
    /// Free-form notes carried into the next step.
    #[serde(default)]
    pub observations: String,
    /// Issues found in this step.
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Additional context the model wants before continuing.
    #[serde(default)]
    pub next_action: Option<NextAction>,
}

/// Narrative review of a single file inside the final summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileReview {
    pub filename: String,
    pub narrative_summary: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// Structured summary of a whole review run.
///
/// # Examples
///
/// ```
/// use vigil_core::{ReviewResult, Severity};
///
/// let json = r#"{"summary":"Looks fine","perFileSummaries":[],"overallSeverity":"low","recommendations":[]}"#;
/// let result: ReviewResult = serde_json::from_str(json).unwrap();
/// assert_eq!(result.overall_severity, Severity::Low);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub summary: String,
    #[serde(default)]
    pub per_file_summaries: Vec<FileReview>,
    pub overall_severity: Severity,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Diff side a line comment attaches to.
///
/// # Examples
///
/// ```
/// use vigil_core::CommentSide;
///
/// assert_eq!(serde_json::to_string(&CommentSide::Right).unwrap(), "\"RIGHT\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommentSide {
    /// The base (deleted-line) side.
    Left,
    /// The head (added or context line) side.
    Right,
}

impl fmt::Display for CommentSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentSide::Left => write!(f, "LEFT"),
            CommentSide::Right => write!(f, "RIGHT"),
        }
    }
}
