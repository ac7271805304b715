//! Shared types for repairing Java clients broken by a dependency upgrade.
//!
//! The pipeline stages live in their own crates under `tools/`; this crate holds what they pass
//! between each other: the compile diagnostics, the broken snippet, the resolved error location,
//! the proposed edits, and the per-attempt [`context::Context`]. It also owns the configuration
//! and the wrappers around the text-completion and text-embedding services.

pub mod config;
pub mod context;
pub mod llm;
pub mod model;
pub mod test_util;

pub use llm::CompletionError;
pub use model::{
    BrokenCode, CompileError, ConflictType, Details, ErrorLocation, ProposedChange,
};

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. `filter` uses `EnvFilter` syntax, e.g. `"info"` or
/// `"bump_fix=debug,api_diff=trace"`. Calling this twice is harmless; the second call is ignored.
pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .try_init();
}
