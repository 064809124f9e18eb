use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use vigil_core::{ChangedFile, Issue, NextAction, ReviewConfig, ReviewResult, ReviewStep, VigilError};
use vigil_difflens::filter::{FileFilter, FilterResult, SkippedFile};

use crate::anchor::{anchor_issue, Anchor};
use crate::baseline::{resolve_baseline, summary_body};
use crate::format::review_comment;
use crate::github::{is_sentinel, HostGateway, PullRequestId};
use crate::llm::{generate_typed, LanguageModel, ToolInvocation};
use crate::prompt::{self, StepContext};
use crate::retry::RetryPolicy;
use crate::session::{idempotency_key, AttemptProgress, ReviewSession};
use crate::summary::{fallback_summary, render_summary};

/// Tool calls executed during the project-structure phase.
pub const MAX_STRUCTURE_TOOL_CALLS: usize = 8;

/// Stage of a review run, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    FetchStructure,
    PerFileLoop,
    Summarize,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::FetchStructure => "fetch_structure",
            Phase::PerFileLoop => "per_file_loop",
            Phase::Summarize => "summarize",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a finished review run did.
///
/// # Examples
///
/// ```
/// use vigil_review::orchestrator::ReviewOutcome;
///
/// let outcome = ReviewOutcome {
///     base_commit: "a1".into(),
///     head_commit: "b2".into(),
///     incremental: true,
///     files_reviewed: 2,
///     comments_posted: 3,
///     attempts: 1,
///     summary_posted: true,
///     warnings: vec![],
/// };
/// assert!(outcome.to_string().contains("3 comments"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub base_commit: String,
    pub head_commit: String,
    /// The diff started from an earlier review marker instead of the PR base.
    pub incremental: bool,
    pub files_reviewed: usize,
    pub comments_posted: usize,
    /// Attempts used by the retried phase; zero when nothing needed review.
    pub attempts: u32,
    pub summary_posted: bool,
    pub warnings: Vec<String>,
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.incremental { "incremental" } else { "full" };
        writeln!(
            f,
            "Reviewed {} files ({mode}, {}..{}): {} comments, summary {}",
            self.files_reviewed,
            short_sha(&self.base_commit),
            short_sha(&self.head_commit),
            self.comments_posted,
            if self.summary_posted { "posted" } else { "not posted" },
        )?;
        for w in &self.warnings {
            writeln!(f, "  warning: {w}")?;
        }
        Ok(())
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Resolved commits and filtered files, before any model call.
#[derive(Debug)]
pub struct ReviewPlan {
    pub session: ReviewSession,
    pub skipped: Vec<SkippedFile>,
}

struct AttemptResult {
    progress: AttemptProgress,
    markdown: String,
}

/// Drives one pull request through filtering, per-file analysis, comment
/// posting and the final summary.
///
/// Every model interaction is bounded: at most
/// [`ReviewConfig::max_steps_per_file`] steps per file and
/// [`ReviewConfig::max_total_steps`] per attempt. The analysis phase is
/// retried as a whole by the [`RetryPolicy`]; comments posted by a failed
/// attempt stay posted, and with `dedupe_comments` they are not posted again.
pub struct ReviewOrchestrator {
    host: Arc<dyn HostGateway>,
    llm: Arc<dyn LanguageModel>,
    config: ReviewConfig,
    filter: FileFilter,
    retry: RetryPolicy,
    dry_run: bool,
}

impl ReviewOrchestrator {
    pub fn new(host: Arc<dyn HostGateway>, llm: Arc<dyn LanguageModel>, config: ReviewConfig) -> Self {
        Self {
            host,
            llm,
            filter: FileFilter::from_config(&config),
            retry: RetryPolicy::from_config(&config),
            config,
            dry_run: false,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Log comments and the summary instead of posting them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Resolve commits and the incremental baseline, then filter the diff.
    ///
    /// # Errors
    ///
    /// Fails if the pull request or its changed files cannot be fetched.
    pub async fn prepare(&self, pr: &PullRequestId) -> Result<ReviewPlan, VigilError> {
        debug!(phase = %Phase::Init, %pr, "resolving pull request");
        let pull = self.host.get_pull_request(pr).await?;

        let comments = match self.host.list_comments(pr).await {
            Ok(comments) => comments,
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "could not list comments, falling back to a full review");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        let base = resolve_baseline(&comments, &pull.base_commit);
        let incremental = base != pull.base_commit;
        if incremental {
            info!(base = %base, "incremental review from previous marker");
        }

        let files = if base == pull.head_commit {
            info!(head = %pull.head_commit, "no new commits since the last review");
            Vec::new()
        } else {
            self.host
                .get_files_between_commits(pr, &base, &pull.head_commit)
                .await?
        };

        let FilterResult { kept, skipped } = self.filter.filter(files);
        for s in &skipped {
            debug!(path = %s.path, reason = %s.reason, "skipping file");
        }
        info!(
            files = kept.len(),
            skipped = skipped.len(),
            base = %base,
            head = %pull.head_commit,
            "review plan ready"
        );

        Ok(ReviewPlan {
            session: ReviewSession::new(
                pr.clone(),
                base,
                pull.head_commit,
                incremental,
                kept,
                Duration::from_millis(self.config.cache_lock_timeout_ms),
            ),
            skipped,
        })
    }

    /// Review the pull request and post comments plus one summary.
    ///
    /// # Errors
    ///
    /// Returns fatal setup errors, or the last error once every attempt of
    /// the analysis phase has failed. Nothing is summarised in that case.
    pub async fn run(&self, pr: &PullRequestId) -> Result<ReviewOutcome, VigilError> {
        let session = self.prepare(pr).await?.session;

        if session.files.is_empty() {
            info!("nothing to review after filtering");
            return Ok(self.outcome(&session, Vec::new(), Vec::new(), 0, false));
        }

        let (result, attempts) = match self
            .retry
            .run(|attempt| self.attempt(&session, attempt))
            .await
        {
            Ok(ok) => ok,
            Err(err) => {
                warn!(phase = %Phase::Failed, error = %err, "review failed");
                return Err(err);
            }
        };
        let AttemptResult { progress, mut markdown } = result;

        if markdown.trim().is_empty() {
            markdown = fallback_summary(progress.reviewed.len(), progress.findings.len());
        }
        let body = summary_body(&session.head_commit, &markdown);

        let summary_posted = if self.dry_run {
            info!(summary = %body, "dry run: summary not posted");
            false
        } else {
            self.retry
                .run(|_| self.host.create_comment(pr, &body))
                .await?;
            true
        };

        info!(phase = %Phase::Done, attempts, comments = session.comments_posted(), "review complete");
        Ok(self.outcome(
            &session,
            progress.reviewed,
            progress.warnings,
            attempts,
            summary_posted,
        ))
    }

    fn outcome(
        &self,
        session: &ReviewSession,
        reviewed: Vec<String>,
        warnings: Vec<String>,
        attempts: u32,
        summary_posted: bool,
    ) -> ReviewOutcome {
        ReviewOutcome {
            base_commit: session.base_commit.clone(),
            head_commit: session.head_commit.clone(),
            incremental: session.incremental,
            files_reviewed: reviewed.len(),
            comments_posted: session.comments_posted(),
            attempts,
            summary_posted,
            warnings,
        }
    }

    async fn attempt(&self, session: &ReviewSession, attempt: u32) -> Result<AttemptResult, VigilError> {
        debug!(attempt = attempt + 1, "starting review attempt");
        let mut progress = AttemptProgress::default();

        self.fetch_structure(session, &mut progress).await?;

        debug!(phase = %Phase::PerFileLoop, files = session.files.len());
        for file in &session.files {
            if progress.total_steps() >= self.config.max_total_steps {
                warn!(
                    budget = self.config.max_total_steps,
                    "global step budget exhausted, skipping remaining files"
                );
                progress.warn(format!(
                    "step budget of {} exhausted before {}",
                    self.config.max_total_steps, file.filename
                ));
                break;
            }
            self.review_file(session, file, &mut progress).await?;
            progress.mark_reviewed(&file.filename);
        }

        let markdown = self.summarize(session, &mut progress).await;
        Ok(AttemptResult { progress, markdown })
    }

    async fn fetch_structure(
        &self,
        session: &ReviewSession,
        progress: &mut AttemptProgress,
    ) -> Result<(), VigilError> {
        debug!(phase = %Phase::FetchStructure);
        let response = self
            .llm
            .generate_with_tools(
                &prompt::build_system_prompt(),
                &prompt::build_structure_prompt(&session.files),
                &prompt::structure_tools(),
            )
            .await?;

        let mut context = response.text.trim().to_string();
        if response.invocations.len() > MAX_STRUCTURE_TOOL_CALLS {
            warn!(
                requested = response.invocations.len(),
                limit = MAX_STRUCTURE_TOOL_CALLS,
                "ignoring extra tool calls"
            );
        }

        for invocation in response.invocations.iter().take(MAX_STRUCTURE_TOOL_CALLS) {
            let output = match decode_invocation(invocation) {
                Ok(action) => self.perform(session, &action).await,
                Err(err) => Err(err),
            };
            match output {
                Ok(text) => {
                    if !context.is_empty() {
                        context.push_str("\n\n");
                    }
                    context.push_str(&text);
                }
                Err(err) => {
                    warn!(tool = %invocation.name, error = %err, "tool call failed");
                    progress.warn(format!("tool {} failed: {err}", invocation.name));
                }
            }
        }

        progress.project_context = context;
        Ok(())
    }

    /// Analyse one file. Step failures end the file early, except rate
    /// limiting, which fails the whole attempt so the retry cooldown applies
    /// instead of the per-file swallow.
    async fn review_file(
        &self,
        session: &ReviewSession,
        file: &ChangedFile,
        progress: &mut AttemptProgress,
    ) -> Result<(), VigilError> {
        let name = file.filename.as_str();
        let content = match self.file_content(session, name).await {
            Ok(content) => content,
            Err(err) => {
                warn!(file = name, error = %err, "skipping file, content unavailable");
                progress.warn(format!("skipped {name}: {err}"));
                return Ok(());
            }
        };

        let mut extra_context: Vec<String> = Vec::new();
        let mut observations = String::new();
        loop {
            if progress.steps_for(name) >= self.config.max_steps_per_file {
                debug!(file = name, "per-file step limit reached");
                break;
            }
            if progress.total_steps() >= self.config.max_total_steps {
                debug!(file = name, "global step budget reached");
                break;
            }
            progress.record_step(name);

            let step_prompt = prompt::build_step_prompt(&StepContext {
                file,
                content: &content,
                project_context: &progress.project_context,
                extra_context: &extra_context,
                observations: &observations,
                step: progress.steps_for(name),
                max_steps: self.config.max_steps_per_file,
            });
            let step: ReviewStep =
                match generate_typed(self.llm.as_ref(), &step_prompt, "review_step").await {
                    Ok(step) => step,
                    Err(err) if err.is_rate_limited() => return Err(err),
                    Err(err) => {
                        warn!(file = name, error = %err, "analysis step failed, finishing file");
                        progress.warn(format!("analysis of {name} stopped early: {err}"));
                        break;
                    }
                };

            if step.current_file != name {
                debug!(file = name, reported = %step.current_file, "model reported a different file");
            }
            for issue in step.issues {
                self.handle_issue(session, file, &content, issue, progress).await;
            }

            if step.analysis_complete {
                break;
            }
            observations = step.observations;
            if let Some(action) = step.next_action {
                match self.perform(session, &action).await {
                    Ok(text) => extra_context.push(text),
                    Err(err) => {
                        warn!(file = name, action = action.name(), error = %err, "next action failed");
                        progress.warn(format!("{} for {name} failed: {err}", action.name()));
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_issue(
        &self,
        session: &ReviewSession,
        file: &ChangedFile,
        content: &str,
        issue: Issue,
        progress: &mut AttemptProgress,
    ) {
        let name = file.filename.as_str();
        let issue = match anchor_issue(issue, content) {
            Anchor::Keep(issue) => issue,
            Anchor::Relocated { issue, from } => {
                warn!(file = name, from, to = issue.line_start, "relocated issue to a better matching line");
                issue
            }
            Anchor::Discard(reason) => {
                warn!(file = name, %reason, "discarding issue");
                progress.warn(format!("discarded issue in {name}: {reason}"));
                return;
            }
        };

        let key = idempotency_key(name, &issue);
        if self.config.dedupe_comments && session.already_posted(&key) {
            debug!(file = name, line = issue.line_end, "comment already posted in this run");
            progress.findings.push((name.to_string(), issue));
            return;
        }

        let request = review_comment(file, &issue, &session.head_commit, self.config.suggest_as_diff);
        if self.dry_run {
            info!(file = name, line = request.line, side = %request.side, "dry run: comment not posted");
        } else {
            match self.host.create_review_comment(&session.pr, &request).await {
                Ok(()) => session.record_posted(key),
                Err(err) => {
                    warn!(file = name, line = request.line, error = %err, "failed to post comment");
                    progress.warn(format!("could not comment on {name}:{}: {err}", request.line));
                }
            }
        }
        progress.findings.push((name.to_string(), issue));
    }

    async fn summarize(&self, session: &ReviewSession, progress: &mut AttemptProgress) -> String {
        debug!(phase = %Phase::Summarize);
        let summary_prompt =
            prompt::build_summary_prompt(&session.files, &progress.project_context, &progress.findings);
        match generate_typed::<ReviewResult, _>(self.llm.as_ref(), &summary_prompt, "review_result")
            .await
        {
            Ok(result) => render_summary(&result, &progress.reviewed),
            Err(err) => {
                warn!(error = %err, "summary generation failed, using fallback summary");
                progress.warn(format!("summary fallback: {err}"));
                fallback_summary(progress.reviewed.len(), progress.findings.len())
            }
        }
    }

    /// Full head content of `path` through the session cache. Sentinel
    /// content counts as a failure.
    async fn file_content(&self, session: &ReviewSession, path: &str) -> Result<String, VigilError> {
        let content = session
            .cache
            .get(path, || {
                self.host
                    .get_content(&session.pr, &session.base_commit, &session.head_commit, path)
            })
            .await?;
        if is_sentinel(&content) {
            return Err(VigilError::Host(format!("{path}: {content}")));
        }
        Ok(content)
    }

    /// Execute a model-requested action. One handler per variant.
    async fn perform(&self, session: &ReviewSession, action: &NextAction) -> Result<String, VigilError> {
        match action {
            NextAction::GetFileContent {
                path,
                start_line,
                end_line,
            } => self.get_file_content(session, path, *start_line, *end_line).await,
            NextAction::ExploreProject { path } => {
                self.explore_project(session, path.as_deref().unwrap_or("")).await
            }
        }
    }

    async fn get_file_content(
        &self,
        session: &ReviewSession,
        path: &str,
        start_line: Option<u32>,
        end_line: Option<u32>,
    ) -> Result<String, VigilError> {
        let text = session
            .cache
            .get_range(
                path,
                start_line,
                end_line,
                self.config.context_margin_lines,
                || {
                    self.host
                        .get_content(&session.pr, &session.base_commit, &session.head_commit, path)
                },
            )
            .await?;
        let range = match (start_line, end_line) {
            (None, None) => String::new(),
            (start, end) => format!(
                " (lines {}-{} with context)",
                start.unwrap_or(1),
                end.map(|e| e.to_string()).unwrap_or_else(|| "end".into())
            ),
        };
        Ok(format!("`{path}`{range}:\n```\n{text}\n```"))
    }

    async fn explore_project(&self, session: &ReviewSession, path: &str) -> Result<String, VigilError> {
        let entries = self
            .host
            .list_directory(&session.pr, &session.head_commit, path)
            .await?;
        let label = if path.trim_matches('/').is_empty() { "/" } else { path };
        let mut out = format!("Contents of `{label}`:");
        for entry in entries {
            let suffix = if entry.kind == "dir" { "/" } else { "" };
            out.push_str(&format!("\n- {}{suffix}", entry.path));
        }
        Ok(out)
    }
}

/// Decode a tool call into a [`NextAction`]: the tool name becomes the
/// `action` tag and the arguments supply the fields.
///
/// # Errors
///
/// Returns [`VigilError::Parse`] for unknown tools or bad arguments.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vigil_core::NextAction;
/// use vigil_review::llm::ToolInvocation;
/// use vigil_review::orchestrator::decode_invocation;
///
/// let call = ToolInvocation { name: "explore_project".into(), arguments: json!({"path": "src"}) };
/// assert_eq!(
///     decode_invocation(&call).unwrap(),
///     NextAction::ExploreProject { path: Some("src".into()) }
/// );
/// ```
pub fn decode_invocation(invocation: &ToolInvocation) -> Result<NextAction, VigilError> {
    let mut fields = match &invocation.arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(VigilError::Parse(format!(
                "arguments for {} must be an object, got {other}",
                invocation.name
            )))
        }
    };
    fields.insert("action".into(), Value::String(invocation.name.clone()));
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| VigilError::Parse(format!("unsupported tool call {}: {e}", invocation.name)))
}
