//! Maps a compiler diagnostic and its broken snippet to the class, method and argument types it
//! is about.
//!
//! Each [`ErrorLocationProvider`] recognizes one diagnostic shape. [`ErrorLocator`] asks them in
//! a fixed order and the first one that matches decides; a diagnostic no provider matches is
//! uncategorized and is not solved.

pub mod providers;

use bump_core::{BrokenCode, CompileError, ErrorLocation};
use code_analysis::{AnalysisError, TypeResolver};
use std::path::Path;
use tracing::{debug, warn};

pub use providers::{
    CannotFindSymbol, ConstructorType, Declaration, Deprecation, Import, MethodChain, Super, TypeCast,
};

/// What a provider may read besides the diagnostic: the class the error is in and the
/// resolver for the project's types.
#[derive(Clone, Copy)]
pub struct Site<'a> {
    pub resolver: &'a TypeResolver,
    /// Current version of the broken class's source.
    pub class_file: &'a Path,
    /// Simple name of the broken class.
    pub class_name: &'a str,
}

/// Recognizes one kind of diagnostic.
pub trait ErrorLocationProvider: Send + Sync {
    /// Short identifier, used in logs and as part of the response-cache key.
    fn name(&self) -> &'static str;

    fn matches(&self, error: &CompileError, broken: &BrokenCode) -> bool;

    /// Only called when [`ErrorLocationProvider::matches`] returned true. Fails only when a
    /// source file cannot be read.
    fn locate(
        &self,
        error: &CompileError,
        broken: &BrokenCode,
        site: &Site,
    ) -> Result<ErrorLocation, AnalysisError>;
}

/// The location of an error and the provider that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub provider: &'static str,
    pub location: ErrorLocation,
}

pub struct ErrorLocator {
    providers: Vec<Box<dyn ErrorLocationProvider>>,
}

impl Default for ErrorLocator {
    fn default() -> ErrorLocator {
        ErrorLocator::new(vec![
            Box::new(Declaration),
            Box::new(CannotFindSymbol),
            Box::new(ConstructorType),
            Box::new(Deprecation),
            Box::new(MethodChain),
            Box::new(Super),
            Box::new(TypeCast),
            Box::new(Import),
        ])
    }
}

impl ErrorLocator {
    /// A locator asking `providers` in the given order.
    pub fn new(providers: Vec<Box<dyn ErrorLocationProvider>>) -> ErrorLocator {
        ErrorLocator { providers }
    }

    /// Locates `error` with the first provider that matches it. `Ok(None)` means uncategorized.
    pub fn locate(
        &self,
        error: &CompileError,
        broken: &BrokenCode,
        site: &Site,
    ) -> Result<Option<Located>, AnalysisError> {
        let Some(provider) = self.providers.iter().find(|p| p.matches(error, broken)) else {
            warn!(
                "uncategorized error at {}:{}: {}",
                error.file.display(),
                error.line,
                error.message
            );
            return Ok(None);
        };
        let location = provider.locate(error, broken, site)?;
        debug!("{} located {location}", provider.name());
        Ok(Some(Located {
            provider: provider.name(),
            location,
        }))
    }
}

#[cfg(test)]
mod tests;
