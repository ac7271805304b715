//! Rewrites calls whose target gained, lost or retyped parameters.

use crate::{Problem, SolveError, Solver};
use api_diff::{MethodDiff, ParameterChange};
use bump_core::ProposedChange;
use code_analysis::brackets::{find_matching, split_arguments};
use code_analysis::method_chain::column_to_offset;
use code_analysis::types;
use regex::Regex;
use tracing::{debug, trace};

/// Primitive name of a numeric type, in primitive, simple or qualified wrapper form.
fn numeric_primitive(name: &str) -> Option<&'static str> {
    match types::simple_name(&types::boxed(&types::erase_generics(name))) {
        "Byte" => Some("byte"),
        "Short" => Some("short"),
        "Integer" => Some("int"),
        "Long" => Some("long"),
        "Float" => Some("float"),
        "Double" => Some("double"),
        _ => None,
    }
}

/// A value to pass for a new parameter, if there is an obvious one.
fn default_argument(parameter: &str) -> Option<String> {
    if let Some(primitive) = numeric_primitive(parameter) {
        return Some(format!("({primitive}) 0"));
    }
    matches!(parameter, "String" | types::STRING).then(|| "\"\"".to_string())
}

fn cast(primitive: &str, argument: &str) -> String {
    let simple = argument
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '(' | ')'));
    if simple {
        format!("({primitive}) {argument}")
    } else {
        format!("({primitive}) ({argument})")
    }
}

/// The argument list a call to `method` needs in the new version, derived from the arguments
/// passed under the old version. `None` if some position has no safe rewrite.
fn adjust_arguments(method: &MethodDiff, arguments: &[&str]) -> Option<Vec<String>> {
    if arguments.len() != method.old_parameters().len() {
        return None;
    }
    let mut out = Vec::with_capacity(method.new_parameters().len());
    let mut next = 0;
    for parameter in &method.parameters {
        match parameter.change {
            ParameterChange::Unchanged => {
                out.push(arguments.get(next)?.to_string());
                next += 1;
            }
            ParameterChange::Removed => next += 1,
            ParameterChange::Added => out.push(default_argument(parameter.new_type.as_deref()?)?),
            ParameterChange::Modified => {
                let argument = arguments.get(next)?;
                // Only numeric to numeric changes can be bridged with a cast.
                numeric_primitive(parameter.old_type.as_deref()?)?;
                let primitive = numeric_primitive(parameter.new_type.as_deref()?)?;
                out.push(cast(primitive, argument));
                next += 1;
            }
        }
    }
    (next == arguments.len()).then_some(out)
}

pub struct MethodParameterSolver;

impl MethodParameterSolver {
    /// The byte offset of the `(` of the call the error points at.
    fn call_paren(problem: &Problem, method: &MethodDiff) -> Option<usize> {
        let code = &problem.broken.code;
        let pattern = if method.is_constructor() {
            let class = problem
                .classification
                .class
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or(&problem.location.class_name);
            format!(
                r"(?:\bnew\s+(?:[\w$]+\.)*{}\s*(?:<[^>]*>)?|\bsuper|\bthis)\s*\(",
                regex::escape(types::simple_name(class))
            )
        } else {
            format!(r"\b{}\s*\(", regex::escape(&method.name))
        };
        let regex = Regex::new(&pattern).ok()?;
        let first_line = code.lines().next().unwrap_or("");
        let offset = column_to_offset(first_line, problem.error.column);
        let matches: Vec<_> = regex.find_iter(code).collect();
        let call = matches
            .iter()
            .find(|m| m.start() + 1 >= offset)
            .or(matches.last())?;
        Some(call.end() - 1)
    }

    fn rewrite(problem: &Problem) -> Option<String> {
        let method = problem.classification.method.as_ref()?;
        method.old.as_ref()?;
        method.new.as_ref()?;
        let code = &problem.broken.code;
        let open = MethodParameterSolver::call_paren(problem, method)?;
        let close = find_matching(code, open)?;
        let arguments = split_arguments(&code[open + 1..close]);
        trace!("call arguments {arguments:?}");
        let adjusted = adjust_arguments(method, &arguments)?;
        Some(format!(
            "{}{}{}",
            &code[..=open],
            adjusted.join(", "),
            &code[close..]
        ))
    }
}

impl Solver for MethodParameterSolver {
    fn name(&self) -> &'static str {
        "method_parameter"
    }

    fn targets(&self, problem: &Problem) -> bool {
        let classification = problem.classification;
        classification.conflicts.iter().any(|c| c.is_parameter_change())
            && classification
                .method
                .as_ref()
                .is_some_and(|m| m.old.is_some() && m.new.is_some())
    }

    fn fixable(&self, problem: &Problem) -> bool {
        let fixable = MethodParameterSolver::rewrite(problem).is_some();
        if !fixable {
            debug!("no safe argument rewrite for {}", problem.location);
        }
        fixable
    }

    fn solve(&self, problem: &Problem) -> Result<Option<ProposedChange>, SolveError> {
        Ok(MethodParameterSolver::rewrite(problem).map(|code| problem.change(code)))
    }
}
