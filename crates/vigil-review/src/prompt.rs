use std::fmt::Write;

use serde_json::json;
use vigil_core::{ChangedFile, Issue};
use vigil_difflens::parser::added_line_ranges;

use crate::llm::ToolSchema;

const SYSTEM_PROMPT: &str = "\
You are Vigil, an expert code reviewer working through a pull request one \
file at a time. Your job is to find genuine bugs, security issues, and \
significant problems in the changed code.

Rules:
- Only report issues you are CERTAIN about
- Line numbers refer to the numbered file content you are shown
- Do not speculate about code behavior you cannot verify
- Do not comment on style, formatting, or naming unless it creates a bug
- Focus on: bugs, security vulnerabilities, logic errors, race conditions, \
resource leaks, error handling
- Provide suggestedFix only when you can write the exact replacement code";

const STRUCTURE_PROMPT: &str = "\
Before the file-by-file review, build a short picture of the project. \
Use explore_project to list directories and get_file_content to read key \
files (entry points, manifests, modules touched by the change). \
Then describe the architecture and anything a reviewer of these changes \
should keep in mind, in a few sentences.";

/// Build the system prompt for the review conversation.
///
/// # Examples
///
/// ```
/// use vigil_review::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("Vigil"));
/// assert!(prompt.contains("CERTAIN"));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// Build the project-structure prompt listing the changed files.
///
/// # Examples
///
/// ```
/// use vigil_core::{ChangedFile, FileStatus};
/// use vigil_review::prompt::build_structure_prompt;
///
/// let files = vec![ChangedFile {
///     filename: "src/api.ts".into(),
///     status: FileStatus::Added,
///     additions: 40,
///     deletions: 0,
///     changes: 40,
///     patch: None,
/// }];
/// let prompt = build_structure_prompt(&files);
/// assert!(prompt.contains("src/api.ts (added, +40/-0)"));
/// ```
pub fn build_structure_prompt(files: &[ChangedFile]) -> String {
    let mut prompt = String::from(STRUCTURE_PROMPT);
    prompt.push_str("\n\nChanged files:\n");
    push_file_overview(&mut prompt, files);
    prompt
}

fn push_file_overview(out: &mut String, files: &[ChangedFile]) {
    for f in files {
        let _ = writeln!(
            out,
            "- {} ({}, +{}/-{})",
            f.filename, f.status, f.additions, f.deletions
        );
    }
}

/// Inputs for one step of the per-file loop.
pub struct StepContext<'a> {
    pub file: &'a ChangedFile,
    pub content: &'a str,
    pub project_context: &'a str,
    /// Context fetched by earlier `nextAction` requests for this file.
    pub extra_context: &'a [String],
    /// Observations from the previous step.
    pub observations: &'a str,
    pub step: u32,
    pub max_steps: u32,
}

/// Build the prompt for one analysis step of a file.
///
/// File content is numbered so the model can cite lines directly.
///
/// # Examples
///
/// ```
/// use vigil_core::{ChangedFile, FileStatus};
/// use vigil_review::prompt::{build_step_prompt, StepContext};
///
/// let file = ChangedFile {
///     filename: "src/lib.rs".into(),
///     status: FileStatus::Modified,
///     additions: 1,
///     deletions: 0,
///     changes: 1,
///     patch: Some("@@ -1 +1,2 @@\n a\n+b".into()),
/// };
/// let prompt = build_step_prompt(&StepContext {
///     file: &file,
///     content: "a\nb",
///     project_context: "",
///     extra_context: &[],
///     observations: "",
///     step: 1,
///     max_steps: 10,
/// });
/// assert!(prompt.contains("2 | b"));
/// assert!(prompt.contains("step 1 of 10"));
/// ```
pub fn build_step_prompt(ctx: &StepContext<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push_str("\n\n");

    if !ctx.project_context.trim().is_empty() {
        let _ = write!(prompt, "## Project context\n{}\n\n", ctx.project_context.trim());
    }

    let _ = writeln!(
        prompt,
        "## Reviewing `{}` ({}) - step {} of {}\n",
        ctx.file.filename, ctx.file.status, ctx.step, ctx.max_steps
    );

    if let Some(patch) = &ctx.file.patch {
        let _ = write!(prompt, "### Diff\n```diff\n{patch}\n```\n\n");
        let ranges = added_line_ranges(patch).unwrap_or_default();
        if !ranges.is_empty() {
            let listed: Vec<String> = ranges
                .iter()
                .map(|&(start, end)| {
                    if start == end {
                        start.to_string()
                    } else {
                        format!("{start}-{end}")
                    }
                })
                .collect();
            let _ = write!(prompt, "Lines added in this change: {}\n\n", listed.join(", "));
        }
    }

    prompt.push_str("### File content\n```\n");
    for (idx, line) in ctx.content.lines().enumerate() {
        let _ = writeln!(prompt, "{:>4} | {line}", idx + 1);
    }
    prompt.push_str("```\n\n");

    for (idx, extra) in ctx.extra_context.iter().enumerate() {
        let _ = write!(prompt, "### Additional context {}\n{extra}\n\n", idx + 1);
    }

    if !ctx.observations.trim().is_empty() {
        let _ = write!(prompt, "### Your notes so far\n{}\n\n", ctx.observations.trim());
    }

    prompt.push_str(
        "Report new issues for this file only. Set analysisComplete to true when \
nothing else in this file needs inspection. If you need more context first, set \
nextAction to get_file_content or explore_project and analysisComplete to false.",
    );
    prompt
}

/// Build the prompt for the final aggregation step.
///
/// # Examples
///
/// ```
/// use vigil_review::prompt::build_summary_prompt;
///
/// let prompt = build_summary_prompt(&[], "", &[]);
/// assert!(prompt.contains("overallSeverity"));
/// ```
pub fn build_summary_prompt(
    files: &[ChangedFile],
    project_context: &str,
    findings: &[(String, Issue)],
) -> String {
    let mut prompt = String::from(
        "Summarize this pull request review. Write a short summary, one \
narrativeSummary per reviewed file listing its issues, an overallSeverity, and \
concrete recommendations.\n\n## Files\n",
    );
    push_file_overview(&mut prompt, files);

    if !project_context.trim().is_empty() {
        let _ = write!(prompt, "\n## Project context\n{}\n", project_context.trim());
    }

    prompt.push_str("\n## Findings\n");
    if findings.is_empty() {
        prompt.push_str("No issues were reported.\n");
    }
    for (file, issue) in findings {
        let _ = writeln!(
            prompt,
            "- {file}:{}-{} [{} {}] {}",
            issue.line_start, issue.line_end, issue.severity, issue.category, issue.description
        );
    }
    prompt
}

/// Tool schemas offered during the project-structure phase.
///
/// # Examples
///
/// ```
/// use vigil_review::prompt::structure_tools;
///
/// let names: Vec<_> = structure_tools().into_iter().map(|t| t.name).collect();
/// assert_eq!(names, vec!["explore_project", "get_file_content"]);
/// ```
pub fn structure_tools() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "explore_project".into(),
            description: "List files and directories at a repository path. \
                          Omit path for the repository root."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory path relative to the repository root"}
                },
            }),
        },
        ToolSchema {
            name: "get_file_content".into(),
            description: "Read a file at the pull request head, optionally limited to a line range."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "startLine": {"type": "integer", "minimum": 1},
                    "endLine": {"type": "integer", "minimum": 1}
                },
                "required": ["path"],
            }),
        },
    ]
}
