//! Changed-file filtering and per-file patch analysis.
//!
//! Decides which files of a pull request are worth sending to the model
//! ([`filter`]), and reads their patches to list the added lines and pick the
//! side review comments attach to ([`parser`]).

pub mod filter;
pub mod parser;
