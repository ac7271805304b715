//! Best-effort type resolution over source that does not compile.
//!
//! Types come from, in order: the shape of the text itself (literals, lambdas, operator
//! expressions), the nearest preceding declaration in the comment-stripped source, the parsed
//! source model of the project, and finally the bytecode of dependency and platform jars.

use crate::AnalysisError;
use crate::bytecode::{ClassFile, ClassPath, MethodInfo};
use crate::comments::clean_lines;
use crate::expression::{ExpressionTyper, NumericPromotionTyper};
use crate::source_model::SourceModel;
use crate::types::{self, FUNCTIONAL_INTERFACE_MARKER};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Superclass hops followed in bytecode when a class does not declare a member itself.
const MAX_SUPERCLASS_DEPTH: usize = 8;

static INT_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:0[xX][0-9a-fA-F_]+|0[bB][01_]+|\d[\d_]*)$").unwrap());
static LONG_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:0[xX][0-9a-fA-F_]+|0[bB][01_]+|\d[\d_]*)[lL]$").unwrap());
static FLOAT_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:\d[\d_]*\.?[\d_]*|\.\d[\d_]*)(?:[eE][+-]?\d+)?[fF]$").unwrap());
static DOUBLE_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:(?:\d[\d_]*\.[\d_]*|\.\d[\d_]*)(?:[eE][+-]?\d+)?[dD]?|\d[\d_]*(?:[eE][+-]?\d+)[dD]?|\d[\d_]*[dD])$")
        .unwrap()
});
static EXTENDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|interface)\s+[A-Za-z_$][\w$]*(?:\s*<[^{]*?>)?\s+extends\s+([A-Za-z_$][\w$.]*)")
        .unwrap()
});

/// Words the declaration pattern captures in statements that are not declarations.
const NOT_A_TYPE: [&str; 9] = [
    "return", "throw", "case", "else", "instanceof", "yield", "assert", "package", "import",
];

/// Operator characters that mark an expression rather than a name.
const OPERATOR_CHARS: &[char] = &['+', '-', '*', '/', '%', '&', '|', '^', '~', '<', '>', '!', '='];

/// Type of a literal or lambda, recognized from the text alone.
pub fn literal_type(text: &str) -> Option<String> {
    let text = text.trim();
    let ty = if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        types::STRING
    } else if text.len() >= 3 && text.starts_with('\'') && text.ends_with('\'') {
        types::CHARACTER
    } else if text == "true" || text == "false" {
        types::BOOLEAN
    } else if INT_LITERAL.is_match(text) {
        types::INTEGER
    } else if LONG_LITERAL.is_match(text) {
        types::LONG
    } else if FLOAT_LITERAL.is_match(text) {
        types::FLOAT
    } else if DOUBLE_LITERAL.is_match(text) {
        types::DOUBLE
    } else if text.contains("->") {
        FUNCTIONAL_INTERFACE_MARKER
    } else {
        return None;
    };
    Some(ty.to_string())
}

fn is_operator_expression(text: &str) -> bool {
    text.contains(OPERATOR_CHARS)
}

/// Whether the formal parameter list of `method` accepts `actuals`.
///
/// For a varargs method every parameter but the last is matched by position; the trailing
/// arguments must each fit the component type of the last parameter unless that component is
/// `Object`, which accepts anything.
pub fn arguments_match(formals: &[String], actuals: &[Option<String>], varargs: bool) -> bool {
    let positional = |formals: &[String], actuals: &[Option<String>]| {
        formals
            .iter()
            .zip(actuals)
            .all(|(f, a)| types::parameter_compatible(f, a.as_deref()))
    };
    if !varargs || formals.is_empty() {
        return formals.len() == actuals.len() && positional(formals, actuals);
    }
    let fixed = formals.len() - 1;
    if actuals.len() < fixed || !positional(&formals[..fixed], &actuals[..fixed]) {
        return false;
    }
    let array = &formals[fixed];
    let component = array.strip_suffix("[]").unwrap_or(array);
    if component == types::OBJECT || component == "Object" {
        return true;
    }
    let trailing = &actuals[fixed..];
    // A single array argument may be passed as the varargs array itself.
    let passes_array = trailing.len() == 1 && types::parameter_compatible(array, trailing[0].as_deref());
    passes_array
        || trailing
            .iter()
            .all(|a| types::parameter_compatible(component, a.as_deref()))
}

/// Picks the method a call with `actuals` binds to among `candidates`: the first whose parameters
/// accept the arguments, or failing that the first candidate at all (flagged as inexact).
pub fn select_overload<'a>(
    candidates: impl IntoIterator<Item = &'a MethodInfo>,
    actuals: &[Option<String>],
) -> Option<(&'a MethodInfo, bool)> {
    let mut fallback = None;
    for method in candidates {
        if arguments_match(&method.parameter_types(), actuals, method.is_varargs()) {
            return Some((method, true));
        }
        fallback.get_or_insert((method, false));
    }
    fallback
}

pub struct TypeResolver {
    source_model: Arc<SourceModel>,
    dependency_classes: Arc<ClassPath>,
    platform_classes: Arc<ClassPath>,
    typer: Box<dyn ExpressionTyper>,
}

impl TypeResolver {
    pub fn new(
        source_model: Arc<SourceModel>,
        dependency_classes: Arc<ClassPath>,
        platform_classes: Arc<ClassPath>,
    ) -> TypeResolver {
        TypeResolver {
            source_model,
            dependency_classes,
            platform_classes,
            typer: Box::new(NumericPromotionTyper),
        }
    }

    pub fn with_typer(mut self, typer: Box<dyn ExpressionTyper>) -> TypeResolver {
        self.typer = typer;
        self
    }

    pub fn source_model(&self) -> &SourceModel {
        &self.source_model
    }

    pub fn dependency_classes(&self) -> &ClassPath {
        &self.dependency_classes
    }

    /// Resolves the type of `name` (a variable, literal or expression) as seen at the 1-based
    /// `line` of `source`. Returns `Ok(None)` when nothing is found; only reading `source` can fail.
    pub fn resolve_variable_type(
        &self,
        name: &str,
        source: &Path,
        line: usize,
    ) -> Result<Option<String>, AnalysisError> {
        if let Some(ty) = literal_type(name) {
            return Ok(Some(ty));
        }
        let text = fs::read_to_string(source).map_err(|e| AnalysisError::io(source, e))?;
        let lines: Vec<&str> = text.lines().collect();
        Ok(self.resolve_in_lines(name, &lines, line))
    }

    /// [`TypeResolver::resolve_variable_type`] over already loaded lines.
    pub fn resolve_in_lines(&self, name: &str, lines: &[&str], line: usize) -> Option<String> {
        let name = name.trim();
        if let Some(ty) = literal_type(name) {
            return Some(ty);
        }
        let cleaned = clean_lines(lines, line.saturating_sub(1).min(lines.len().saturating_sub(1)));
        if is_operator_expression(name) {
            let lookup = |ident: &str| -> Option<String> {
                literal_type(ident).or_else(|| declaration_scan(ident, &cleaned.lines, cleaned.index))
            };
            return self.typer.infer(name, &lookup);
        }
        declaration_scan(name, &cleaned.lines, cleaned.index)
    }

    /// Declared type of `field` in the parsed source model.
    pub fn resolve_field_type(&self, class: &str, field: &str) -> Option<String> {
        self.source_model.field_type(class, field)
    }

    /// Declared type of `field` in the bytecode of `class` or its superclasses, looked up in the
    /// dependency jars and then the platform jars.
    pub fn resolve_field_type_from_bytecode(&self, class: &str, field: &str) -> Option<String> {
        self.superclass_chain(self.load_class(class))
            .find_map(|c| c.field(field).and_then(|f| f.type_name()))
    }

    fn load_class(&self, name: &str) -> Option<Arc<ClassFile>> {
        let name = types::erase_generics(name);
        if name.is_empty() || types::is_primitive(&name) || name.ends_with("[]") {
            return None;
        }
        self.dependency_classes
            .find(&name)
            .or_else(|| self.platform_classes.find(&name))
    }

    fn superclass_chain(&self, start: Option<Arc<ClassFile>>) -> impl Iterator<Item = Arc<ClassFile>> + '_ {
        let mut next = start;
        std::iter::from_fn(move || {
            let current = next.take()?;
            next = current.super_name.as_deref().and_then(|s| self.load_class(s));
            Some(current)
        })
        .take(MAX_SUPERCLASS_DEPTH)
    }

    /// Return type of `class.method(parameter_types)`.
    ///
    /// The parsed source model is asked first (by name only). Then the dependency jars and the
    /// platform jars, where a method must also accept the arguments; a same-named method that does
    /// not is remembered and returned only when no jar has an exact match.
    pub fn resolve_method_return_type(
        &self,
        class: &str,
        method: &str,
        parameter_types: &[Option<String>],
    ) -> Option<String> {
        if let Some(ty) = self.source_model.method_return_type(class, method) {
            trace!("{class}.{method} returns {ty} (source)");
            return Some(types::erase_generics(&ty));
        }
        let receiver = types::erase_generics(class);
        let library_parent = self.library_superclass(&receiver);
        let mut fallback = None;
        for classes in [&self.dependency_classes, &self.platform_classes] {
            let start = classes
                .find(&receiver)
                .or_else(|| library_parent.as_deref().and_then(|p| classes.find(p)));
            for declaring in self.superclass_chain(start) {
                match select_overload(declaring.methods_named(method), parameter_types) {
                    Some((m, true)) => {
                        trace!("{class}.{method} returns {:?} ({})", m.return_type(), declaring.name);
                        return m.return_type();
                    }
                    Some((m, false)) => {
                        if fallback.is_none() {
                            fallback = m.return_type();
                        }
                    }
                    None => {}
                }
            }
        }
        fallback
    }

    /// For a class declared in the project sources, the first superclass up its hierarchy that
    /// is not declared in the sources, i.e. where the hierarchy continues in a jar.
    fn library_superclass(&self, class: &str) -> Option<String> {
        let mut current = self.source_model.find_class(class)?;
        for _ in 0..MAX_SUPERCLASS_DEPTH {
            let parent = current.superclass.as_deref()?;
            match self.source_model.find_class(parent) {
                Some(next) if next.qualified_name != current.qualified_name => current = next,
                Some(_) => return None,
                None => return Some(types::erase_generics(parent)),
            }
        }
        None
    }

    /// Name of the class `source` extends, from its `extends` clause.
    pub fn resolve_parent_class(&self, source: &Path) -> Result<Option<String>, AnalysisError> {
        let text = fs::read_to_string(source).map_err(|e| AnalysisError::io(source, e))?;
        let lines: Vec<&str> = text.lines().collect();
        let cleaned = clean_lines(&lines, 0).lines.join("\n");
        Ok(EXTENDS
            .captures(&cleaned)
            .map(|c| types::erase_generics(&c[1])))
    }

    /// Resolves a variable the way a reader of the broken class would: a local or parameter
    /// declaration in `source`, a field of `class_name` (or its source-declared superclasses), a
    /// field declared in the parent class's source, and finally a field in the bytecode of the
    /// parent or, for a project parent, of the first library class above it.
    pub fn resolve_variable_in_hierarchy(
        &self,
        name: &str,
        source: &Path,
        line: usize,
        class_name: &str,
    ) -> Result<Option<String>, AnalysisError> {
        let name = name.trim();
        if let Some(field) = name.strip_prefix("this.") {
            return Ok(self.resolve_field_type(class_name, field));
        }
        if let Some(ty) = self.resolve_variable_type(name, source, line)? {
            return Ok(Some(ty));
        }
        if let Some(ty) = self.resolve_field_type(class_name, name) {
            return Ok(Some(ty));
        }
        let Some(parent) = self.resolve_parent_class(source)? else {
            return Ok(None);
        };
        if let Some(ty) = self.resolve_field_type(&parent, name) {
            return Ok(Some(ty));
        }
        let parent_source = self
            .source_model
            .find_class(&parent)
            .map(|c| c.file.clone())
            .filter(|f| f.exists());
        let bytecode_class = match parent_source {
            Some(parent_source) => {
                let end = fs::read_to_string(&parent_source)
                    .map_err(|e| AnalysisError::io(&parent_source, e))?
                    .lines()
                    .count();
                if let Some(ty) = self.resolve_variable_type(name, &parent_source, end)? {
                    return Ok(Some(ty));
                }
                // The parent is a project class; its own hierarchy continues in a jar, if at all.
                match self.library_superclass(&parent) {
                    Some(library) => library,
                    None => return Ok(None),
                }
            }
            None => parent,
        };
        Ok(self.resolve_field_type_from_bytecode(&bytecode_class, name))
    }
}

/// Scans backward from `index` for the nearest declaration of `name` and returns its type.
///
/// A capture of `new` means the pattern hit an object creation rather than a declaration; that
/// case stays unresolved instead of scanning further. `var` declarations are unresolved too.
fn declaration_scan(name: &str, lines: &[String], index: usize) -> Option<String> {
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return None;
    }
    let pattern = format!(
        r"(?:^|[\s(,;{{])([A-Za-z_$][\w$.]*(?:\s*<[^;=()]*>)?(?:\s*\[\])*)\s+{}\s*(?:[,;=):]|$)",
        regex::escape(name)
    );
    let declaration = Regex::new(&pattern).ok()?;
    for line in lines.iter().take(index + 1).rev() {
        for captures in declaration.captures_iter(line) {
            let ty = captures[1].trim();
            if ty == "new" || ty == "var" {
                return None;
            }
            if NOT_A_TYPE.contains(&ty) {
                continue;
            }
            return Some(ty.to_string());
        }
    }
    None
}
