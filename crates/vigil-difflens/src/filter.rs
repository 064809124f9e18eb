//! Pre-LLM file filtering driven by include/exclude rules.
//!
//! Rules come in four lists. A token starting with `.` matches by file
//! suffix (`.rs`, `.d.ts`); any other token is a path prefix and is
//! matched on a directory boundary (`src` matches `src/lib.rs`, not
//! `srcgen/lib.rs`). Empty include lists match everything; exclude lists
//! always apply.

use vigil_core::{ChangedFile, ReviewConfig};

/// Include/exclude rules deciding which changed files get reviewed.
///
/// # Examples
///
/// ```
/// use vigil_difflens::filter::FileFilter;
///
/// let filter = FileFilter::new(&[".rs"], &[], &[], &["vendor"]);
/// assert!(filter.should_review("src/main.rs"));
/// assert!(!filter.should_review("vendor/dep/lib.rs"));
/// assert!(!filter.should_review("README.md"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    include_extensions: Vec<Rule>,
    exclude_extensions: Vec<Rule>,
    include_paths: Vec<Rule>,
    exclude_paths: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Suffix(String),
    Prefix(String),
}

impl Rule {
    fn parse(token: &str) -> Option<Self> {
        let token = normalize_path(token.trim());
        if token.is_empty() {
            return None;
        }
        if token.starts_with('.') && !token.starts_with("./") {
            return Some(Rule::Suffix(token));
        }
        let token = token.trim_start_matches("./");
        if token.is_empty() {
            return None;
        }
        let prefix = if token.ends_with('/') {
            token.to_string()
        } else {
            format!("{token}/")
        };
        Some(Rule::Prefix(prefix))
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Rule::Suffix(suffix) => path.ends_with(suffix.as_str()),
            Rule::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }

    fn token(&self) -> &str {
        match self {
            Rule::Suffix(s) | Rule::Prefix(s) => s,
        }
    }
}

impl FileFilter {
    /// Build a filter from raw rule tokens. Blank tokens are ignored.
    pub fn new<S: AsRef<str>>(
        include_extensions: &[S],
        exclude_extensions: &[S],
        include_paths: &[S],
        exclude_paths: &[S],
    ) -> Self {
        Self {
            include_extensions: parse_rules(include_extensions),
            exclude_extensions: parse_rules(exclude_extensions),
            include_paths: parse_rules(include_paths),
            exclude_paths: parse_rules(exclude_paths),
        }
    }

    /// Create a filter from review configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::ReviewConfig;
    /// use vigil_difflens::filter::FileFilter;
    ///
    /// let config = ReviewConfig {
    ///     exclude_extensions: vec![".lock".into()],
    ///     ..ReviewConfig::default()
    /// };
    /// let filter = FileFilter::from_config(&config);
    /// assert!(!filter.should_review("Cargo.lock"));
    /// assert!(filter.should_review("Cargo.toml"));
    /// ```
    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(
            &config.include_extensions,
            &config.exclude_extensions,
            &config.include_paths,
            &config.exclude_paths,
        )
    }

    /// Check if a single path passes every rule.
    pub fn should_review(&self, path: &str) -> bool {
        self.check_skip(path).is_none()
    }

    /// Split changed files into the ones to review and the ones skipped.
    ///
    /// Order of kept files is preserved.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::{ChangedFile, FileStatus};
    /// use vigil_difflens::filter::FileFilter;
    ///
    /// let file = |name: &str| ChangedFile {
    ///     filename: name.into(),
    ///     status: FileStatus::Modified,
    ///     additions: 1,
    ///     deletions: 0,
    ///     changes: 1,
    ///     patch: None,
    /// };
    /// let filter = FileFilter::new(&[".ts"], &[".d.ts"], &[], &[]);
    /// let result = filter.filter(vec![file("a.ts"), file("types.d.ts"), file("b.py")]);
    /// assert_eq!(result.kept.len(), 1);
    /// assert_eq!(result.skipped.len(), 2);
    /// ```
    pub fn filter(&self, files: Vec<ChangedFile>) -> FilterResult {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            match self.check_skip(&file.filename) {
                Some(reason) => skipped.push(SkippedFile {
                    path: file.filename,
                    reason,
                }),
                None => kept.push(file),
            }
        }

        FilterResult { kept, skipped }
    }

    fn check_skip(&self, path: &str) -> Option<SkipReason> {
        let path = normalize_path(path);
        let path = path.trim_start_matches("./");

        if !self.include_extensions.is_empty()
            && !self.include_extensions.iter().any(|r| r.matches(path))
        {
            return Some(SkipReason::NotIncluded);
        }

        if let Some(rule) = self.exclude_extensions.iter().find(|r| r.matches(path)) {
            return Some(SkipReason::Excluded(rule.token().to_string()));
        }

        if !self.include_paths.is_empty() && !self.include_paths.iter().any(|r| r.matches(path)) {
            return Some(SkipReason::NotIncluded);
        }

        if let Some(rule) = self.exclude_paths.iter().find(|r| r.matches(path)) {
            return Some(SkipReason::Excluded(rule.token().to_string()));
        }

        None
    }
}

fn parse_rules<S: AsRef<str>>(tokens: &[S]) -> Vec<Rule> {
    tokens
        .iter()
        .filter_map(|t| Rule::parse(t.as_ref()))
        .collect()
}

/// Convert Windows separators to `/`.
///
/// # Examples
///
/// ```
/// use vigil_difflens::filter::normalize_path;
///
/// assert_eq!(normalize_path("src\\app\\main.ts"), "src/app/main.ts");
/// ```
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Result of filtering changed files.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Files that passed the filter, in input order.
    pub kept: Vec<ChangedFile>,
    /// Files that were skipped with reasons.
    pub skipped: Vec<SkippedFile>,
}

/// A file that was skipped during filtering.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub path: String,
    /// Why the file was skipped.
    pub reason: SkipReason,
}

/// Reason a file was skipped.
///
/// # Examples
///
/// ```
/// use vigil_difflens::filter::SkipReason;
///
/// let reason = SkipReason::Excluded(".lock".into());
/// assert_eq!(format!("{reason}"), "excluded by .lock");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Include rules exist and none matched.
    NotIncluded,
    /// Matched an exclude rule.
    Excluded(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotIncluded => write!(f, "not matched by any include rule"),
            SkipReason::Excluded(rule) => write!(f, "excluded by {rule}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::FileStatus;

    fn file(name: &str) -> ChangedFile {
        ChangedFile {
            filename: name.into(),
            status: FileStatus::Modified,
            additions: 1,
            deletions: 1,
            changes: 2,
            patch: None,
        }
    }

    fn names(files: &[ChangedFile]) -> Vec<&str> {
        files.iter().map(|f| f.filename.as_str()).collect()
    }

    fn sample() -> Vec<ChangedFile> {
        vec![
            file("src/main.ts"),
            file("src/types.d.ts"),
            file("src/legacy/old.ts"),
            file("docs/guide.md"),
            file("package-lock.json"),
            file("scripts\\build.ts"),
            file("srcgen/api.ts"),
        ]
    }

    #[test]
    fn empty_rules_keep_everything() {
        let filter = FileFilter::default();
        let result = filter.filter(sample());
        assert_eq!(result.kept.len(), sample().len());
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn include_extension_by_suffix() {
        let filter = FileFilter::new(&[".ts"], &[], &[], &[]);
        let result = filter.filter(sample());
        assert_eq!(
            names(&result.kept),
            vec![
                "src/main.ts",
                "src/types.d.ts",
                "src/legacy/old.ts",
                "scripts\\build.ts",
                "srcgen/api.ts"
            ]
        );
        assert!(result
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::NotIncluded));
    }

    #[test]
    fn exclude_extension_applies_after_include() {
        let filter = FileFilter::new(&[".ts"], &[".d.ts"], &[], &[]);
        assert!(!filter.should_review("src/types.d.ts"));
        assert!(filter.should_review("src/main.ts"));
    }

    #[test]
    fn path_prefix_respects_directory_boundary() {
        let filter = FileFilter::new::<&str>(&[], &[], &["src"], &[]);
        assert!(filter.should_review("src/main.ts"));
        assert!(!filter.should_review("srcgen/api.ts"));
        assert!(!filter.should_review("docs/guide.md"));
    }

    #[test]
    fn exclude_path_with_trailing_slash() {
        let filter = FileFilter::new::<&str>(&[], &[], &["src/"], &["src/legacy/"]);
        let result = filter.filter(sample());
        assert_eq!(names(&result.kept), vec!["src/main.ts", "src/types.d.ts"]);
    }

    #[test]
    fn non_dot_token_in_extension_list_is_a_prefix() {
        let filter = FileFilter::new(&["scripts"], &["docs"], &[], &[]);
        assert!(filter.should_review("scripts/build.ts"));
        assert!(!filter.should_review("src/main.ts"));
        let filter = FileFilter::new::<&str>(&[], &["docs"], &[], &[]);
        assert!(!filter.should_review("docs/guide.md"));
    }

    #[test]
    fn windows_separators_are_normalized() {
        let filter = FileFilter::new::<&str>(&[], &[], &["scripts"], &[]);
        assert!(filter.should_review("scripts\\build.ts"));
        let filter = FileFilter::new::<&str>(&[], &[], &["src\\legacy"], &[]);
        assert!(filter.should_review("src/legacy/old.ts"));
    }

    #[test]
    fn blank_tokens_are_ignored() {
        let filter = FileFilter::new(&["", "  "], &[""], &[], &[]);
        assert!(filter.should_review("anything.txt"));
    }

    #[test]
    fn filtering_is_idempotent() {
        let filter = FileFilter::new(&[".ts", ".md"], &[".d.ts"], &[], &["src/legacy"]);
        let once = filter.filter(sample()).kept;
        let twice = filter.filter(once.clone()).kept;
        assert_eq!(once, twice);
    }

    #[test]
    fn exclusion_wins_regardless_of_rule_order() {
        let a = FileFilter::new(&[".ts", ".md"], &[".md", ".d.ts"], &[], &[]);
        let b = FileFilter::new(&[".md", ".ts"], &[".d.ts", ".md"], &[], &[]);
        for f in sample() {
            assert_eq!(a.should_review(&f.filename), b.should_review(&f.filename));
        }
        assert!(!a.should_review("docs/guide.md"));
    }

    #[test]
    fn excluded_reason_names_rule() {
        let filter = FileFilter::new::<&str>(&[], &[], &[], &["docs"]);
        let result = filter.filter(vec![file("docs/guide.md")]);
        assert_eq!(result.skipped[0].reason, SkipReason::Excluded("docs/".into()));
    }
}
