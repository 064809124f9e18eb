//! LLM review orchestration for pull requests.
//!
//! [`orchestrator::ReviewOrchestrator`] resolves the commit range to review,
//! filters the changed files, drives a bounded per-file analysis loop against
//! a [`llm::LanguageModel`], posts line-anchored comments through a
//! [`github::HostGateway`], and finishes with one summary comment carrying
//! the marker used by the next incremental run.

pub mod anchor;
pub mod baseline;
pub mod cache;
pub mod format;
pub mod github;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod session;
pub mod summary;
