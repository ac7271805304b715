//! Best-effort static analysis over Java code that does not compile.
//!
//! Given a compiler diagnostic, this crate finds the broken snippet ([`broken_line`]), infers the
//! types the snippet works with from the surrounding source and from dependency bytecode
//! ([`resolver`]), and walks call chains to the hop that fails ([`method_chain`]). Nothing here is
//! sound: every lookup falls back to the next signal source and returns `None` when all of them
//! are exhausted.

pub mod brackets;
pub mod broken_line;
pub mod bytecode;
pub mod comments;
pub mod expression;
pub mod method_chain;
pub mod resolver;
pub mod source_model;
pub mod types;

pub use broken_line::read_broken_line;
pub use method_chain::{ChainInput, MethodChainAnalysis, MethodChainAnalyzer};
pub use resolver::TypeResolver;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("malformed class file {name}: {reason}")]
    ClassFormat { name: String, reason: String },
    #[error("cannot read jar {path}: {source}")]
    Jar {
        path: std::path::PathBuf,
        source: zip::result::ZipError,
    },
    #[error("cannot parse Java source: {0}")]
    Parse(String),
}

impl AnalysisError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> AnalysisError {
        AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
