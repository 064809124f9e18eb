//! Integration tests: full review runs against in-memory host and model fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vigil_core::{ChangedFile, CommentSide, FileStatus, ReviewConfig, VigilError};
use vigil_review::baseline::summary_body;
use vigil_review::github::{
    DirectoryEntry, HostComment, HostGateway, PullRequestId, PullRequestRef, ReviewCommentRequest,
    UNAVAILABLE_SENTINEL,
};
use vigil_review::llm::{LanguageModel, StructuredSchema, ToolInvocation, ToolResponse, ToolSchema};
use vigil_review::orchestrator::ReviewOrchestrator;
use vigil_review::retry::{RetryPolicy, Sleeper};

const AUTH_TS: &str = "import { log } from \"./log\";\n\
export function login(user: string, password: string) {\n\
  log(`login ${user} with password ${password}`);\n\
  return check(user, password);\n\
}";

const AUTH_PATCH: &str = "@@ -1,4 +1,5 @@\n import { log } from \"./log\";\n \
export function login(user: string, password: string) {\n\
+  log(`login ${user} with password ${password}`);\n   return check(user, password);\n }";

// --- host fake ---

struct FakeHost {
    pull: PullRequestRef,
    comments: Vec<HostComment>,
    files: Vec<ChangedFile>,
    contents: HashMap<String, String>,
    reject_credentials: bool,
    compare_calls: Mutex<Vec<(String, String)>>,
    content_fetches: Mutex<Vec<String>>,
    directory_calls: Mutex<Vec<(String, String)>>,
    review_comments: Mutex<Vec<ReviewCommentRequest>>,
    issue_comments: Mutex<Vec<String>>,
}

impl FakeHost {
    fn new(files: Vec<ChangedFile>) -> Self {
        Self {
            pull: PullRequestRef {
                head_commit: "head1".into(),
                base_commit: "base0".into(),
            },
            comments: Vec::new(),
            files,
            contents: HashMap::from([("src/auth.ts".to_string(), AUTH_TS.to_string())]),
            reject_credentials: false,
            compare_calls: Mutex::default(),
            content_fetches: Mutex::default(),
            directory_calls: Mutex::default(),
            review_comments: Mutex::default(),
            issue_comments: Mutex::default(),
        }
    }

    fn with_content(mut self, path: &str, content: &str) -> Self {
        self.contents.insert(path.into(), content.into());
        self
    }

    fn review_comments(&self) -> Vec<ReviewCommentRequest> {
        self.review_comments.lock().unwrap().clone()
    }

    fn issue_comments(&self) -> Vec<String> {
        self.issue_comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostGateway for FakeHost {
    async fn get_pull_request(&self, _pr: &PullRequestId) -> Result<PullRequestRef, VigilError> {
        if self.reject_credentials {
            return Err(VigilError::Auth("Bad credentials".into()));
        }
        Ok(self.pull.clone())
    }

    async fn get_files_between_commits(
        &self,
        _pr: &PullRequestId,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, VigilError> {
        self.compare_calls
            .lock()
            .unwrap()
            .push((base.to_string(), head.to_string()));
        Ok(self.files.clone())
    }

    async fn get_content(
        &self,
        _pr: &PullRequestId,
        _base_ref: &str,
        _head_ref: &str,
        path: &str,
    ) -> Result<String, VigilError> {
        self.content_fetches.lock().unwrap().push(path.to_string());
        Ok(self
            .contents
            .get(path)
            .cloned()
            .unwrap_or_else(|| UNAVAILABLE_SENTINEL.to_string()))
    }

    async fn list_comments(&self, _pr: &PullRequestId) -> Result<Vec<HostComment>, VigilError> {
        Ok(self.comments.clone())
    }

    async fn create_comment(&self, _pr: &PullRequestId, body: &str) -> Result<(), VigilError> {
        self.issue_comments.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn create_review_comment(
        &self,
        _pr: &PullRequestId,
        comment: &ReviewCommentRequest,
    ) -> Result<(), VigilError> {
        self.review_comments.lock().unwrap().push(comment.clone());
        Ok(())
    }

    async fn list_directory(
        &self,
        _pr: &PullRequestId,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, VigilError> {
        self.directory_calls
            .lock()
            .unwrap()
            .push((git_ref.to_string(), path.to_string()));
        Ok(vec![
            DirectoryEntry {
                path: "src".into(),
                kind: "dir".into(),
            },
            DirectoryEntry {
                path: "package.json".into(),
                kind: "file".into(),
            },
        ])
    }
}

// --- model fake ---

type StepFn = Box<dyn Fn(&str, usize) -> Result<Value, VigilError> + Send + Sync>;

/// Answers step prompts through `step(file, previous_calls_for_file)`.
struct ScriptedModel {
    structure: ToolResponse,
    structure_failures: AtomicU32,
    structure_calls: AtomicU32,
    step: StepFn,
    step_calls: Mutex<Vec<String>>,
    step_prompts: Mutex<Vec<String>>,
    summary: Value,
    summary_calls: AtomicU32,
}

impl ScriptedModel {
    fn new(step: impl Fn(&str, usize) -> Result<Value, VigilError> + Send + Sync + 'static) -> Self {
        Self {
            structure: ToolResponse {
                text: "TypeScript service.".into(),
                invocations: Vec::new(),
            },
            structure_failures: AtomicU32::new(0),
            structure_calls: AtomicU32::new(0),
            step: Box::new(step),
            step_calls: Mutex::default(),
            step_prompts: Mutex::default(),
            summary: good_summary(),
            summary_calls: AtomicU32::new(0),
        }
    }

    fn failing_structure(self, failures: u32) -> Self {
        self.structure_failures.store(failures, Ordering::SeqCst);
        self
    }

    fn with_summary(mut self, summary: Value) -> Self {
        self.summary = summary;
        self
    }

    fn with_tool_calls(mut self, invocations: Vec<ToolInvocation>) -> Self {
        self.structure.invocations = invocations;
        self
    }

    fn step_calls(&self) -> Vec<String> {
        self.step_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate_with_tools(
        &self,
        _system: &str,
        _user: &str,
        _tools: &[ToolSchema],
    ) -> Result<ToolResponse, VigilError> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.structure_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.structure_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VigilError::Llm("upstream returned 502".into()));
        }
        Ok(self.structure.clone())
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &StructuredSchema,
    ) -> Result<Value, VigilError> {
        match schema.name.as_str() {
            "review_step" => {
                let file = reviewed_file(prompt);
                let previous = {
                    let mut calls = self.step_calls.lock().unwrap();
                    let n = calls.iter().filter(|f| **f == file).count();
                    calls.push(file.clone());
                    n
                };
                self.step_prompts.lock().unwrap().push(prompt.to_string());
                (self.step)(&file, previous)
            }
            "review_result" => {
                self.summary_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.summary.clone())
            }
            other => Err(VigilError::Llm(format!("unexpected schema {other}"))),
        }
    }
}

fn reviewed_file(prompt: &str) -> String {
    prompt
        .split("## Reviewing `")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
        .unwrap_or_default()
        .to_string()
}

// --- fixtures ---

struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

fn changed(filename: &str, patch: Option<&str>) -> ChangedFile {
    ChangedFile {
        filename: filename.into(),
        status: FileStatus::Modified,
        additions: 1,
        deletions: 0,
        changes: 1,
        patch: patch.map(String::from),
    }
}

fn step(file: &str, complete: bool, issues: Value) -> Value {
    json!({
        "currentFile": file,
        "analysisComplete": complete,
        "observations": "",
        "issues": issues,
    })
}

fn issue(line: u32, description: &str) -> Value {
    json!({
        "lineStart": line,
        "lineEnd": line,
        "description": description,
        "severity": "high",
        "category": "security",
    })
}

fn good_summary() -> Value {
    json!({
        "summary": "The login flow leaks credentials.",
        "perFileSummaries": [
            {"filename": "src/auth.ts", "narrativeSummary": "Logs the password.", "issues": []}
        ],
        "overallSeverity": "high",
        "recommendations": ["Remove credential logging"],
    })
}

/// Reports the password leak on line 3 of `src/auth.ts`, nothing elsewhere.
fn leak_reporter(file: &str, _previous: usize) -> Result<Value, VigilError> {
    if file == "src/auth.ts" {
        Ok(step(
            file,
            true,
            json!([issue(3, "Password is written to the log in plain text")]),
        ))
    } else {
        Ok(step(file, true, json!([])))
    }
}

fn pr() -> PullRequestId {
    "acme/webapp#7".parse().unwrap()
}

fn orchestrator(
    host: &Arc<FakeHost>,
    model: &Arc<ScriptedModel>,
    config: ReviewConfig,
) -> (ReviewOrchestrator, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper {
        delays: Mutex::default(),
    });
    let retry = RetryPolicy::from_config(&config)
        .with_max_jitter(Duration::ZERO)
        .with_sleeper(sleeper.clone());
    let orchestrator = ReviewOrchestrator::new(host.clone(), model.clone(), config)
        .with_retry_policy(retry);
    (orchestrator, sleeper)
}

// --- scenarios ---

#[tokio::test]
async fn full_review_posts_comment_and_summary() {
    let host = Arc::new(
        FakeHost::new(vec![
            changed("src/auth.ts", Some(AUTH_PATCH)),
            changed("src/util.ts", Some("@@ -0,0 +1 @@\n+export const id = (x) => x;")),
        ])
        .with_content("src/util.ts", "export const id = (x) => x;"),
    );
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let (orchestrator, sleeper) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert!(!outcome.incremental);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.files_reviewed, 2);
    assert_eq!(outcome.comments_posted, 1);
    assert!(outcome.summary_posted);
    assert!(sleeper.delays.lock().unwrap().is_empty());
    assert_eq!(
        *host.content_fetches.lock().unwrap(),
        vec!["src/auth.ts", "src/util.ts"]
    );
    assert_eq!(model.step_calls(), vec!["src/auth.ts", "src/util.ts"]);
    assert_eq!(
        *host.compare_calls.lock().unwrap(),
        vec![("base0".to_string(), "head1".to_string())]
    );

    let comments = host.review_comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].path, "src/auth.ts");
    assert_eq!(comments[0].line, 3);
    assert_eq!(comments[0].start_line, None);
    assert_eq!(comments[0].side, CommentSide::Right);
    assert_eq!(comments[0].commit_id, "head1");
    assert!(comments[0]
        .body
        .starts_with("**HIGH Severity SECURITY Issue**: Password is written"));

    let summaries = host.issue_comments();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].starts_with("AI review done up to commit: head1\n\n### AI Review Summary:\n"));
    assert!(summaries[0].contains("The login flow leaks credentials."));
    assert!(summaries[0].contains("- Remove credential logging"));
}

#[tokio::test]
async fn incremental_review_diffs_from_newest_marker() {
    let mut host = FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]);
    host.comments = vec![
        HostComment {
            id: 1,
            body: Some(summary_body("old111", "first pass")),
        },
        HostComment {
            id: 2,
            body: Some(summary_body("abc123", "second pass")),
        },
        HostComment {
            id: 3,
            body: Some("Thanks, fixed!".into()),
        },
    ];
    let host = Arc::new(host);
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert!(outcome.incremental);
    assert_eq!(outcome.base_commit, "abc123");
    assert_eq!(
        *host.compare_calls.lock().unwrap(),
        vec![("abc123".to_string(), "head1".to_string())]
    );
    assert!(host.issue_comments()[0].starts_with("AI review done up to commit: head1"));
}

#[tokio::test]
async fn marker_at_head_skips_review() {
    let mut host = FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]);
    host.comments = vec![HostComment {
        id: 1,
        body: Some(summary_body("head1", "done")),
    }];
    let host = Arc::new(host);
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(outcome.files_reviewed, 0);
    assert!(!outcome.summary_posted);
    assert!(host.compare_calls.lock().unwrap().is_empty());
    assert!(host.issue_comments().is_empty());
}

#[tokio::test]
async fn transient_failures_retry_then_post_one_summary() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(leak_reporter).failing_structure(2));
    let (orchestrator, sleeper) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(model.structure_calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        *sleeper.delays.lock().unwrap(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(host.issue_comments().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_post_nothing() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(leak_reporter).failing_structure(5));
    let (orchestrator, sleeper) = orchestrator(&host, &model, ReviewConfig::default());

    let err = orchestrator.run(&pr()).await.unwrap_err();

    assert!(matches!(err, VigilError::Llm(_)));
    assert_eq!(model.structure_calls.load(Ordering::SeqCst), 3);
    assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    assert!(host.issue_comments().is_empty());
    assert!(host.review_comments().is_empty());
}

#[tokio::test]
async fn malformed_summary_falls_back_to_counts() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(leak_reporter).with_summary(json!({"verdict": "ok"})));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert!(outcome.summary_posted);
    assert!(outcome.warnings.iter().any(|w| w.starts_with("summary fallback")));
    let summaries = host.issue_comments();
    assert_eq!(summaries.len(), 1);
    assert_eq!(
        summaries[0],
        summary_body("head1", "Reviewed 1 files, found 1 issues.")
    );
}

#[tokio::test]
async fn step_budgets_bound_model_calls() {
    let files: Vec<ChangedFile> = (0..10)
        .map(|i| changed(&format!("src/f{i}.ts"), Some("@@ -0,0 +1 @@\n+const x = 1;")))
        .collect();
    let mut host = FakeHost::new(files);
    for i in 0..10 {
        host = host.with_content(&format!("src/f{i}.ts"), "const x = 1;");
    }
    let host = Arc::new(host);
    let model = Arc::new(ScriptedModel::new(|file, _| Ok(step(file, false, json!([])))));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    let calls = model.step_calls();
    assert_eq!(calls.len(), 50);
    for i in 0..10 {
        let name = format!("src/f{i}.ts");
        let n = calls.iter().filter(|f| **f == name).count();
        assert!(n <= 10, "{name} used {n} steps");
        if i >= 5 {
            assert_eq!(n, 0, "{name} should not be reached");
        }
    }
    assert_eq!(outcome.files_reviewed, 5);
    assert!(outcome.warnings.iter().any(|w| w.contains("step budget")));
    assert!(outcome.summary_posted);
}

#[tokio::test]
async fn out_of_bounds_issue_is_never_posted() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(|file, _| {
        Ok(step(file, true, json!([issue(40, "Password leaks through the logger")])))
    }));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert!(host.review_comments().is_empty());
    assert_eq!(outcome.comments_posted, 0);
    assert!(outcome.warnings.iter().any(|w| w.contains("past end of file")));
    assert!(outcome.summary_posted);
}

#[tokio::test]
async fn nothing_left_after_filtering() {
    let host = Arc::new(FakeHost::new(vec![changed("Cargo.lock", None)]));
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let config = ReviewConfig {
        exclude_extensions: vec![".lock".into()],
        ..ReviewConfig::default()
    };
    let (orchestrator, _) = orchestrator(&host, &model, config);

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(outcome.files_reviewed, 0);
    assert_eq!(outcome.attempts, 0);
    assert!(!outcome.summary_posted);
    assert_eq!(model.structure_calls.load(Ordering::SeqCst), 0);
    assert!(host.issue_comments().is_empty());
    assert!(host.review_comments().is_empty());
}

#[tokio::test]
async fn comments_are_not_reposted_after_retry() {
    let host = Arc::new(
        FakeHost::new(vec![
            changed("src/auth.ts", Some(AUTH_PATCH)),
            changed("src/util.ts", Some("@@ -0,0 +1 @@\n+export const id = (x) => x;")),
        ])
        .with_content("src/util.ts", "export const id = (x) => x;"),
    );
    let model = Arc::new(ScriptedModel::new(|file, previous| {
        if file == "src/util.ts" && previous == 0 {
            return Err(VigilError::RateLimited("429 Too Many Requests".into()));
        }
        leak_reporter(file, previous)
    }));
    let (orchestrator, sleeper) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(host.review_comments().len(), 1);
    assert_eq!(outcome.comments_posted, 1);
    assert_eq!(
        *sleeper.delays.lock().unwrap(),
        vec![Duration::from_secs(10), Duration::from_millis(1000)]
    );
    assert_eq!(host.issue_comments().len(), 1);
}

#[tokio::test]
async fn comments_repeat_after_retry_when_dedupe_is_off() {
    let host = Arc::new(
        FakeHost::new(vec![
            changed("src/auth.ts", Some(AUTH_PATCH)),
            changed("src/util.ts", Some("@@ -0,0 +1 @@\n+export const id = (x) => x;")),
        ])
        .with_content("src/util.ts", "export const id = (x) => x;"),
    );
    let model = Arc::new(ScriptedModel::new(|file, previous| {
        if file == "src/util.ts" && previous == 0 {
            return Err(VigilError::RateLimited("429 Too Many Requests".into()));
        }
        leak_reporter(file, previous)
    }));
    let config = ReviewConfig {
        dedupe_comments: false,
        ..ReviewConfig::default()
    };
    let (orchestrator, _) = orchestrator(&host, &model, config);

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    let comments = host.review_comments();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0], comments[1]);
    assert_eq!(outcome.comments_posted, 2);
    assert_eq!(host.issue_comments().len(), 1);
}

#[tokio::test]
async fn failed_step_finishes_file_without_retry() {
    let host = Arc::new(
        FakeHost::new(vec![
            changed("src/util.ts", Some("@@ -0,0 +1 @@\n+export const id = (x) => x;")),
            changed("src/auth.ts", Some(AUTH_PATCH)),
        ])
        .with_content("src/util.ts", "export const id = (x) => x;"),
    );
    let model = Arc::new(ScriptedModel::new(|file, previous| {
        if file == "src/util.ts" {
            return Err(VigilError::Llm("upstream returned 500".into()));
        }
        leak_reporter(file, previous)
    }));
    let (orchestrator, sleeper) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(outcome.attempts, 1);
    assert!(sleeper.delays.lock().unwrap().is_empty());
    assert_eq!(model.step_calls(), vec!["src/util.ts", "src/auth.ts"]);
    assert_eq!(outcome.files_reviewed, 2);
    assert_eq!(host.review_comments().len(), 1);
    assert_eq!(host.review_comments()[0].path, "src/auth.ts");
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("analysis of src/util.ts stopped early")));
    assert!(outcome.summary_posted);
}

#[tokio::test]
async fn duplicate_findings_within_a_file_post_once() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(|file, previous| {
        let found = json!([issue(3, "Password is written to the log in plain text")]);
        Ok(step(file, previous >= 1, found))
    }));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(model.step_calls().len(), 2);
    assert_eq!(host.review_comments().len(), 1);
    assert_eq!(outcome.comments_posted, 1);
}

#[tokio::test]
async fn structure_tools_feed_later_prompts() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(leak_reporter).with_tool_calls(vec![
        ToolInvocation {
            name: "explore_project".into(),
            arguments: json!({}),
        },
        ToolInvocation {
            name: "get_file_content".into(),
            arguments: json!({"path": "src/auth.ts", "startLine": 2, "endLine": 2}),
        },
        ToolInvocation {
            name: "run_shell".into(),
            arguments: json!({"cmd": "ls"}),
        },
    ]));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(
        *host.directory_calls.lock().unwrap(),
        vec![("head1".to_string(), String::new())]
    );
    // the structure phase fetched auth.ts; the file loop reuses it
    assert_eq!(*host.content_fetches.lock().unwrap(), vec!["src/auth.ts"]);
    assert!(outcome.warnings.iter().any(|w| w.contains("run_shell")));

    let prompts = model.step_prompts.lock().unwrap();
    assert!(prompts[0].contains("Contents of `/`"));
    assert!(prompts[0].contains("- src/"));
    assert!(prompts[0].contains("TypeScript service."));
}

#[tokio::test]
async fn next_action_context_reaches_the_next_step() {
    let host = Arc::new(
        FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))])
            .with_content("src/log.ts", "export function log(msg: string) { console.log(msg); }"),
    );
    let model = Arc::new(ScriptedModel::new(|file, previous| {
        if previous == 0 {
            let mut first = step(file, false, json!([]));
            first["nextAction"] = json!({"action": "get_file_content", "path": "src/log.ts"});
            Ok(first)
        } else {
            Ok(step(file, true, json!([])))
        }
    }));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    orchestrator.run(&pr()).await.unwrap();

    let prompts = model.step_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("console.log"));
    assert!(prompts[1].contains("### Additional context 1"));
    assert!(prompts[1].contains("console.log(msg)"));
}

#[tokio::test]
async fn unavailable_content_skips_file() {
    let host = Arc::new(FakeHost::new(vec![
        changed("src/auth.ts", Some(AUTH_PATCH)),
        changed("src/missing.ts", None),
    ]));
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert_eq!(model.step_calls(), vec!["src/auth.ts"]);
    assert!(outcome.warnings.iter().any(|w| w.starts_with("skipped src/missing.ts")));
    assert_eq!(outcome.files_reviewed, 2);
    assert!(outcome.summary_posted);
}

#[tokio::test]
async fn rejected_credentials_are_fatal() {
    let mut host = FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]);
    host.reject_credentials = true;
    let host = Arc::new(host);
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let (orchestrator, sleeper) = orchestrator(&host, &model, ReviewConfig::default());

    let err = orchestrator.run(&pr()).await.unwrap_err();

    assert!(matches!(err, VigilError::Auth(_)));
    assert_eq!(model.structure_calls.load(Ordering::SeqCst), 0);
    assert!(sleeper.delays.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_posts_nothing() {
    let host = Arc::new(FakeHost::new(vec![changed("src/auth.ts", Some(AUTH_PATCH))]));
    let model = Arc::new(ScriptedModel::new(leak_reporter));
    let (orchestrator, _) = orchestrator(&host, &model, ReviewConfig::default());
    let orchestrator = orchestrator.with_dry_run(true);

    let outcome = orchestrator.run(&pr()).await.unwrap();

    assert!(!outcome.summary_posted);
    assert_eq!(outcome.comments_posted, 0);
    assert!(host.review_comments().is_empty());
    assert!(host.issue_comments().is_empty());
    assert_eq!(model.summary_calls.load(Ordering::SeqCst), 1);
}
