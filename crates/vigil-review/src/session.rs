use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use vigil_core::{ChangedFile, Issue};

use crate::cache::ContentCache;
use crate::github::PullRequestId;

/// State shared by every attempt of one review run.
///
/// Holds what must survive a retry: the resolved commits, the filtered file
/// list, fetched contents, and the ledger of comments already posted.
#[derive(Debug)]
pub struct ReviewSession {
    pub pr: PullRequestId,
    pub base_commit: String,
    pub head_commit: String,
    /// The base came from an earlier summary marker.
    pub incremental: bool,
    pub files: Vec<ChangedFile>,
    pub cache: ContentCache,
    ledger: Mutex<CommentLedger>,
}

#[derive(Debug, Default)]
struct CommentLedger {
    posted: usize,
    keys: HashSet<String>,
}

impl ReviewSession {
    pub fn new(
        pr: PullRequestId,
        base_commit: String,
        head_commit: String,
        incremental: bool,
        files: Vec<ChangedFile>,
        cache_lock_timeout: Duration,
    ) -> Self {
        Self {
            pr,
            base_commit,
            head_commit,
            incremental,
            files,
            cache: ContentCache::new(cache_lock_timeout),
            ledger: Mutex::new(CommentLedger::default()),
        }
    }

    /// Whether a comment with `key` has already been posted in this run.
    pub fn already_posted(&self, key: &str) -> bool {
        self.ledger
            .lock()
            .map(|l| l.keys.contains(key))
            .unwrap_or(false)
    }

    /// Record a successfully posted comment.
    pub fn record_posted(&self, key: String) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.posted += 1;
            ledger.keys.insert(key);
        }
    }

    /// Comments posted so far, across all attempts.
    pub fn comments_posted(&self) -> usize {
        self.ledger.lock().map(|l| l.posted).unwrap_or(0)
    }
}

/// Stable key identifying a comment by file, range and description.
///
/// # Examples
///
/// ```
/// use vigil_core::{Category, Issue, Severity};
/// use vigil_review::session::idempotency_key;
///
/// let issue = Issue {
///     line_start: 1,
///     line_end: 2,
///     description: "x".into(),
///     severity: Severity::Low,
///     category: Category::Other,
///     suggested_fix: None,
///     suggest_as_diff: false,
/// };
/// let key = idempotency_key("a.rs", &issue);
/// assert_eq!(key.len(), 64);
/// assert_eq!(key, idempotency_key("a.rs", &issue));
/// assert_ne!(key, idempotency_key("b.rs", &issue));
/// ```
pub fn idempotency_key(filename: &str, issue: &Issue) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{filename}|{}|{}|{}",
            issue.line_start,
            issue.line_end,
            issue.description.trim()
        )
        .as_bytes(),
    );
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Progress of a single review attempt.
///
/// A retry starts from a fresh value, so step budgets apply per attempt.
#[derive(Debug, Default)]
pub struct AttemptProgress {
    per_file_steps: HashMap<String, u32>,
    total_steps: u32,
    /// Files processed this attempt, in processing order.
    pub reviewed: Vec<String>,
    /// Issues that were posted or would have been, with their file.
    pub findings: Vec<(String, Issue)>,
    /// Text gathered during the project-structure phase.
    pub project_context: String,
    /// Recorded non-fatal degradations.
    pub warnings: Vec<String>,
}

impl AttemptProgress {
    /// Count one analysis step for `filename`.
    pub fn record_step(&mut self, filename: &str) {
        *self.per_file_steps.entry(filename.to_string()).or_insert(0) += 1;
        self.total_steps += 1;
    }

    pub fn steps_for(&self, filename: &str) -> u32 {
        self.per_file_steps.get(filename).copied().unwrap_or(0)
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn mark_reviewed(&mut self, filename: &str) {
        if !self.reviewed.iter().any(|f| f == filename) {
            self.reviewed.push(filename.to_string());
        }
    }

    pub fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}
