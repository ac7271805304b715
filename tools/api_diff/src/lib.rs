//! Compares two versions of a library jar and classifies compile errors against the result.
//!
//! [`ApiDiff`] holds a per-class, per-member comparison of the old and new jar. The
//! [`Classifier`] takes an [`bump_core::ErrorLocation`] and reports which
//! [`bump_core::ConflictType`]s apply to it. Diffs are costly to build and are shared through a
//! [`DiffCache`].

pub mod cache;
pub mod classifier;
pub mod diff;
pub mod model;

pub use cache::DiffCache;
pub use classifier::{Classification, Classifier, infer_member};
pub use diff::{ApiDiff, JarApi};
pub use model::{
    ChangeStatus, ClassDiff, CompatibilityChange, MethodDiff, MethodReport, ParameterChange,
    ParameterDiff, render_member,
};

use code_analysis::AnalysisError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("jar not found: {}", .0.display())]
    MissingJar(PathBuf),
}
