use crate::{Problem, SolveError, Solver};
use api_diff::classifier::is_final_class_message;
use bump_core::ProposedChange;
use once_cell::sync::Lazy;
use regex::Regex;

static CLASS_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bclass\b").unwrap());

/// Marks a class `final` when the sealed class it extends requires it.
pub struct FinalClassSolver;

impl Solver for FinalClassSolver {
    fn name(&self) -> &'static str {
        "final_class"
    }

    fn targets(&self, problem: &Problem) -> bool {
        is_final_class_message(&problem.error.message) && CLASS_KEYWORD.is_match(&problem.broken.code)
    }

    fn fixable(&self, problem: &Problem) -> bool {
        !problem.broken.code.contains("final class")
    }

    fn solve(&self, problem: &Problem) -> Result<Option<ProposedChange>, SolveError> {
        let code = CLASS_KEYWORD.replace(&problem.broken.code, "final class");
        Ok(Some(problem.change(code.into_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[test]
    fn final_is_inserted_before_class() {
        let fixture = Fixture::new("Class Foo should be declared as final", "public class Foo extends Bar {");
        let problem = fixture.problem();
        assert!(FinalClassSolver.targets(&problem) && FinalClassSolver.fixable(&problem));
        let change = FinalClassSolver.solve(&problem).unwrap().unwrap();
        assert_eq!(change.code, "public final class Foo extends Bar {");
    }

    #[test]
    fn other_lines_are_ignored() {
        let field = Fixture::new("Class Foo should be declared as final", "private Foo classic;");
        assert!(!FinalClassSolver.targets(&field.problem()));
        let other = Fixture::new("cannot find symbol", "public class Foo {");
        assert!(!FinalClassSolver.targets(&other.problem()));
    }
}
