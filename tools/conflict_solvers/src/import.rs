use crate::{Problem, SolveError, Solver};
use bump_core::ProposedChange;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*import\s+(static\s+)?([\w$.]+?)(\.\*)?\s*;").unwrap());

/// The class an import statement names. Static imports name a member of it, which is dropped.
fn imported_class(code: &str) -> Option<(String, bool)> {
    let c = IMPORT.captures(code)?;
    let wildcard = c.get(3).is_some();
    let name = &c[2];
    let class = if c.get(1).is_some() && !wildcard {
        name.rsplit_once('.').map(|(class, _)| class)?
    } else {
        name
    };
    Some((class.to_string(), wildcard))
}

/// Redirects an import of a class that moved to its new package.
pub struct ImportSolver;

impl ImportSolver {
    fn alternative(problem: &Problem) -> Option<(String, String)> {
        let (class, wildcard) = imported_class(&problem.broken.code)?;
        if wildcard {
            return None;
        }
        let alternative = problem
            .classification
            .alternative
            .clone()
            .filter(|a| code_analysis::types::simple_name(a) == code_analysis::types::simple_name(&class))
            .or_else(|| problem.diff.find_alternative(&class))?;
        Some((class, alternative))
    }
}

impl Solver for ImportSolver {
    fn name(&self) -> &'static str {
        "import"
    }

    fn targets(&self, problem: &Problem) -> bool {
        IMPORT.is_match(&problem.broken.code)
    }

    fn fixable(&self, problem: &Problem) -> bool {
        ImportSolver::alternative(problem).is_some()
    }

    fn solve(&self, problem: &Problem) -> Result<Option<ProposedChange>, SolveError> {
        let Some((class, alternative)) = ImportSolver::alternative(problem) else {
            return Ok(None);
        };
        debug!("{class} moved to {alternative}");
        let code = problem.broken.code.replacen(&class, &alternative, 1);
        Ok(Some(problem.change(code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use api_diff::ApiDiff;
    use code_analysis::bytecode::test_support::{ClassBuilder, write_jar};

    #[test]
    fn reads_import_statements() {
        assert_eq!(imported_class("import com.a.B;"), Some(("com.a.B".into(), false)));
        assert_eq!(imported_class("  import static com.a.B.run;"), Some(("com.a.B".into(), false)));
        assert_eq!(imported_class("import com.a.*;"), Some(("com.a".into(), true)));
        assert_eq!(imported_class("B b = new B();"), None);
    }

    #[test]
    fn moved_class_import_is_redirected() {
        let dir = tempfile::tempdir().unwrap();
        let (old, new) = (dir.path().join("w-1.jar"), dir.path().join("w-2.jar"));
        write_jar(&old, vec![ClassBuilder::new("com/old/pkg/Widget")]);
        write_jar(&new, vec![ClassBuilder::new("com/new/pkg/Widget")]);

        let mut fixture = Fixture::new("package com.old.pkg does not exist", "import com.old.pkg.Widget;");
        fixture.diff = ApiDiff::compute(&old, &new).unwrap();
        let problem = fixture.problem();
        assert!(ImportSolver.targets(&problem));
        assert!(ImportSolver.fixable(&problem));
        let change = ImportSolver.solve(&problem).unwrap().unwrap();
        assert_eq!(change.code, "import com.new.pkg.Widget;");
        assert_eq!((change.start, change.end), (7, 7));
    }

    #[test]
    fn wildcards_and_unknown_classes_are_left_alone() {
        let wildcard = Fixture::new("package com.old does not exist", "import com.old.*;");
        assert!(ImportSolver.targets(&wildcard.problem()));
        assert!(!ImportSolver.fixable(&wildcard.problem()));
        let unknown = Fixture::new("package com.old does not exist", "import com.old.Gone;");
        assert!(!ImportSolver.fixable(&unknown.problem()));
    }
}
