//! Turns a classified compile error into a replacement for its broken code.
//!
//! Each [`Solver`] handles one kind of breakage. They are tried in a fixed order and the first
//! one that both targets the error and reports it fixable produces the fix; the rest are not
//! consulted. The deterministic solvers come first and the text-completion based
//! [`LlmSolver`] takes everything else.

pub mod final_class;
pub mod import;
pub mod llm_solver;
pub mod overrides;
pub mod parameters;

pub use final_class::FinalClassSolver;
pub use import::ImportSolver;
pub use llm_solver::LlmSolver;
pub use overrides::OverrideSolver;
pub use parameters::MethodParameterSolver;

use api_diff::{ApiDiff, Classification};
use bump_core::{BrokenCode, CompileError, CompletionError, ErrorLocation, ProposedChange};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything known about one error when it is solved.
#[derive(Clone, Copy)]
pub struct Problem<'a> {
    pub error: &'a CompileError,
    pub broken: &'a BrokenCode,
    pub location: &'a ErrorLocation,
    pub classification: &'a Classification,
    /// Text of the class the error is in, as the current iteration sees it.
    pub class_source: &'a str,
    pub diff: &'a ApiDiff,
}

impl Problem<'_> {
    /// A change replacing the broken code with `code`.
    pub fn change(&self, code: impl Into<String>) -> ProposedChange {
        ProposedChange {
            class_name: self.error.class_file_name(),
            code: code.into(),
            file: self.error.file.clone(),
            start: self.broken.start,
            end: self.broken.end,
        }
    }
}

pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the error is of the kind this solver handles.
    fn targets(&self, problem: &Problem) -> bool;

    /// Whether this solver can produce a fix for a targeted error.
    fn fixable(&self, problem: &Problem) -> bool;

    /// The fix, or `None` when the attempt produced nothing usable.
    fn solve(&self, problem: &Problem) -> Result<Option<ProposedChange>, SolveError>;
}

/// The result of the solver that took an error.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub solver: &'static str,
    pub change: Option<ProposedChange>,
}

/// Solvers in the order they are tried.
pub struct Solvers {
    solvers: Vec<Box<dyn Solver>>,
}

impl Solvers {
    pub fn new(solvers: Vec<Box<dyn Solver>>) -> Solvers {
        Solvers { solvers }
    }

    /// The deterministic solvers followed by `llm` as the catch-all.
    pub fn standard(llm: LlmSolver) -> Solvers {
        Solvers::new(vec![
            Box::new(ImportSolver),
            Box::new(OverrideSolver),
            Box::new(FinalClassSolver),
            Box::new(MethodParameterSolver),
            Box::new(llm),
        ])
    }

    /// Hands the problem to the first solver that targets it and can fix it. `None` if there is
    /// no such solver.
    pub fn solve(&self, problem: &Problem) -> Result<Option<Attempt>, SolveError> {
        let Some(solver) = self
            .solvers
            .iter()
            .find(|s| s.targets(problem) && s.fixable(problem))
        else {
            warn!(
                "no solver for {}:{} {}",
                problem.error.file.display(),
                problem.error.line,
                problem.error.message
            );
            return Ok(None);
        };
        debug!("{} solves {}:{}", solver.name(), problem.error.class_file_name(), problem.error.line);
        let change = solver.solve(problem)?;
        Ok(Some(Attempt {
            solver: solver.name(),
            change,
        }))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use bump_core::Details;
    use std::collections::BTreeSet;
    use std::path::Path;

    pub struct Fixture {
        pub error: CompileError,
        pub broken: BrokenCode,
        pub location: ErrorLocation,
        pub classification: Classification,
        pub class_source: String,
        pub diff: ApiDiff,
    }

    impl Fixture {
        pub fn new(message: &str, code: &str) -> Fixture {
            Fixture {
                error: CompileError {
                    file: Path::new("/app/src/main/java/com/app/Main.java").to_path_buf(),
                    line: 7,
                    column: 1,
                    message: message.to_string(),
                    import_related: false,
                    details: Details::new(),
                },
                broken: BrokenCode::new(code, 7, 7),
                location: ErrorLocation::unresolved(),
                classification: Classification::default(),
                class_source: String::new(),
                diff: ApiDiff::default(),
            }
        }

        pub fn conflicts(mut self, conflicts: &[bump_core::ConflictType]) -> Fixture {
            self.classification.conflicts = conflicts.iter().copied().collect::<BTreeSet<_>>();
            self
        }

        pub fn problem(&self) -> Problem<'_> {
            Problem {
                error: &self.error,
                broken: &self.broken,
                location: &self.location,
                classification: &self.classification,
                class_source: &self.class_source,
                diff: &self.diff,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use bump_core::test_util::MockCompletion;
    use std::sync::Arc;

    fn solvers(completion: &Arc<MockCompletion>) -> Solvers {
        Solvers::standard(LlmSolver::new(completion.clone()))
    }

    #[test]
    fn deterministic_solvers_go_first() {
        let completion = Arc::new(MockCompletion::replying("```java\nx();\n```"));
        let fixture = Fixture::new("Class Foo should be declared as final", "public class Foo extends Bar {");
        let attempt = solvers(&completion).solve(&fixture.problem()).unwrap().unwrap();
        assert_eq!(attempt.solver, "final_class");
        assert_eq!(attempt.change.unwrap().code, "public final class Foo extends Bar {");
        assert!(completion.prompts().is_empty());
    }

    #[test]
    fn completion_takes_the_rest() {
        let completion = Arc::new(MockCompletion::replying("```java\n        client.fetchAll();\n```"));
        let fixture = Fixture::new("cannot find symbol", "        client.fetch();");
        let attempt = solvers(&completion).solve(&fixture.problem()).unwrap().unwrap();
        assert_eq!(attempt.solver, "llm");
        let change = attempt.change.unwrap();
        assert_eq!(change.code, "        client.fetchAll();");
        assert_eq!((change.start, change.end), (7, 7));
        assert_eq!(completion.prompts().len(), 1);
    }

    #[test]
    fn nothing_applies_without_a_catch_all() {
        let fixture = Fixture::new("cannot find symbol", "        client.fetch();");
        let solvers = Solvers::new(vec![Box::new(ImportSolver), Box::new(FinalClassSolver)]);
        assert!(solvers.solve(&fixture.problem()).unwrap().is_none());
    }
}
