//! Core types, configuration, and error handling for Vigil.
//!
//! This crate provides the shared foundation used by all other Vigil crates:
//! - [`VigilError`]: unified error type using `thiserror`
//! - [`VigilConfig`]: configuration loaded from `.vigil.toml`
//! - Review data model: [`ChangedFile`], [`Issue`], [`ReviewStep`],
//!   [`ReviewResult`], [`Severity`], [`Category`]

mod config;
mod error;
mod types;

pub use config::{GitHubConfig, LlmConfig, ReviewConfig, VigilConfig};
pub use error::VigilError;
pub use types::{
    Category, ChangedFile, CommentSide, FileReview, FileStatus, Issue, NextAction, ReviewResult,
    ReviewStep, Severity,
};

/// A convenience `Result` type for Vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;
