use crate::{Problem, SolveError, Solver};
use bump_core::{ConflictType, ProposedChange};

const ANNOTATION: &str = "@Override";

/// Drops `@Override` from a method whose supertype no longer declares it.
pub struct OverrideSolver;

fn remove_annotation(code: &str) -> String {
    let Some(at) = code.find(ANNOTATION) else {
        return code.to_string();
    };
    let rest = code[at + ANNOTATION.len()..].trim_start_matches([' ', '\t']);
    let result = format!("{}{rest}", &code[..at]);
    if result.trim().is_empty() {
        String::new()
    } else {
        result
    }
}

impl Solver for OverrideSolver {
    fn name(&self) -> &'static str {
        "override"
    }

    fn targets(&self, problem: &Problem) -> bool {
        problem.classification.has(ConflictType::MethodNoLongerOverrides)
            && problem.broken.trimmed().starts_with(ANNOTATION)
    }

    fn fixable(&self, _problem: &Problem) -> bool {
        true
    }

    fn solve(&self, problem: &Problem) -> Result<Option<ProposedChange>, SolveError> {
        Ok(Some(problem.change(remove_annotation(&problem.broken.code))))
    }
}
