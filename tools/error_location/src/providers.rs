//! The diagnostic shapes, in the order [`crate::ErrorLocator`] asks them.

use crate::{ErrorLocationProvider, Site};
use bump_core::{BrokenCode, CompileError, ErrorLocation};
use code_analysis::brackets::{find_matching, find_open_paren, split_arguments};
use code_analysis::types::{self, parse_parameter_list};
use code_analysis::{AnalysisError, ChainInput, MethodChainAnalyzer};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use tracing::trace;

static CONSTRUCTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"constructor (\S+) in (?:class|enum|record) (\S+) cannot be applied to given types")
        .unwrap()
});
static DEPRECATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S+)\((.*)\) in (\S+) has been deprecated").unwrap());
static INCOMPATIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"incompatible types: (\S+) cannot be converted to (\S+)").unwrap());
static FINAL_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[Cc]lass (\S+) )?should be declared (?:as )?final|sealed, non-sealed or final modifiers expected")
        .unwrap()
});
const NO_OVERRIDE: &str = "does not override or implement a method from a supertype";
static CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:new\s+|=\s*|\.)\s*[A-Za-z_$][\w$]*\s*\(").unwrap());

/// The class named by a `location:` detail: `class com.x.Foo`, `interface Foo` or
/// `variable client of type com.x.Client`.
fn location_class(location: &str) -> String {
    let location = location.trim();
    if let Some((_, ty)) = location.split_once(" of type ") {
        return types::erase_generics(ty);
    }
    let name = ["class ", "interface ", "enum ", "record ", "package "]
        .iter()
        .find_map(|prefix| location.strip_prefix(prefix))
        .unwrap_or(location);
    types::erase_generics(name)
}

/// Splits `name(params)` into the name and the parsed parameter list.
fn split_signature(signature: &str) -> (String, Vec<Option<String>>) {
    let signature = signature.trim();
    let Some(open) = signature.find('(') else {
        return (signature.to_string(), Vec::new());
    };
    let close = signature.rfind(')').filter(|&c| c > open).unwrap_or(signature.len());
    (
        signature[..open].trim().to_string(),
        parse_parameter_list(&signature[open + 1..close]),
    )
}

fn chain_input<'a>(error: &CompileError, broken: &'a BrokenCode, site: &Site<'a>) -> ChainInput<'a> {
    ChainInput {
        column: error.column,
        line: error.line,
        expression: &broken.code,
        class_file: site.class_file,
        class_name: site.class_name,
    }
}

/// `cannot find symbol`, located through its `symbol:` and `location:` details.
pub struct CannotFindSymbol;

impl ErrorLocationProvider for CannotFindSymbol {
    fn name(&self) -> &'static str {
        "cannot_find_symbol"
    }

    fn matches(&self, error: &CompileError, _broken: &BrokenCode) -> bool {
        error.message.trim() == "cannot find symbol"
    }

    fn locate(
        &self,
        error: &CompileError,
        _broken: &BrokenCode,
        site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        let Some(symbol) = error.details.get("symbol") else {
            return Ok(ErrorLocation::unresolved());
        };
        let location = error.details.get("location").map(location_class);
        let (kind, rest) = symbol.trim().split_once(char::is_whitespace).unwrap_or(("", symbol));
        let rest = rest.trim();
        Ok(match kind {
            "class" | "interface" | "enum" | "record" => ErrorLocation::class_only(rest),
            "method" | "constructor" => {
                let (method, parameter_types) = split_signature(rest);
                ErrorLocation::new(location.unwrap_or_default(), Some(method), parameter_types)
            }
            "variable" => {
                let resolved = site.resolver.resolve_variable_in_hierarchy(
                    rest,
                    site.class_file,
                    error.line,
                    site.class_name,
                )?;
                // Nothing declares it: a reference to a class by its name.
                ErrorLocation::class_only(resolved.unwrap_or_else(|| rest.to_string()))
            }
            _ => {
                trace!("unknown symbol kind in {symbol:?}");
                ErrorLocation::unresolved()
            }
        })
    }
}

/// `constructor X in class Y cannot be applied to given types`.
pub struct ConstructorType;

impl ErrorLocationProvider for ConstructorType {
    fn name(&self) -> &'static str {
        "constructor_type"
    }

    fn matches(&self, error: &CompileError, _broken: &BrokenCode) -> bool {
        CONSTRUCTOR.is_match(&error.message)
    }

    fn locate(
        &self,
        error: &CompileError,
        _broken: &BrokenCode,
        _site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        let Some(captures) = CONSTRUCTOR.captures(&error.message) else {
            return Ok(ErrorLocation::unresolved());
        };
        let parameter_types = error
            .details
            .get("found")
            .map(parse_parameter_list)
            .unwrap_or_default();
        // javac prints the declared signature: `Baz(String)`.
        let name = captures[1].split('(').next().unwrap_or(&captures[1]);
        Ok(ErrorLocation::new(
            &captures[2],
            Some(name.to_string()),
            parameter_types,
        ))
    }
}

/// `m(params) in C has been deprecated`.
pub struct Deprecation;

impl ErrorLocationProvider for Deprecation {
    fn name(&self) -> &'static str {
        "deprecation"
    }

    fn matches(&self, error: &CompileError, _broken: &BrokenCode) -> bool {
        DEPRECATED.is_match(&error.message)
    }

    fn locate(
        &self,
        error: &CompileError,
        _broken: &BrokenCode,
        _site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        let Some(captures) = DEPRECATED.captures(&error.message) else {
            return Ok(ErrorLocation::unresolved());
        };
        Ok(ErrorLocation::new(
            &captures[3],
            Some(captures[1].to_string()),
            parse_parameter_list(&captures[2]),
        ))
    }
}

/// Errors the message alone classifies: a class that must become `final` for the sealed class
/// it extends, or an `@Override` whose supertype method is gone. Located on the enclosing class
/// or on the annotated method.
pub struct Declaration;

/// The method declared at or after `line` (1-based), skipping annotations: its name and
/// parameter types as written.
fn declared_method(source: &str, line: usize) -> Option<(String, Vec<Option<String>>)> {
    let declaration = source
        .lines()
        .skip(line.saturating_sub(1))
        .take(8)
        .map(|l| l.trim())
        .map(|l| l.strip_prefix("@Override").map(str::trim).unwrap_or(l))
        .find(|l| !l.is_empty() && !l.starts_with('@'))?;
    let open = declaration.find('(')?;
    let name = declaration[..open].split_whitespace().last()?;
    let close = find_matching(declaration, open).unwrap_or(declaration.len());
    let parameter_types = split_arguments(&declaration[open + 1..close])
        .into_iter()
        .map(|p| {
            let words: Vec<&str> = p.split_whitespace().filter(|w| *w != "final" && !w.starts_with('@')).collect();
            match words.as_slice() {
                [ty @ .., _name] if !ty.is_empty() => Some(ty.join(" ")),
                _ => None,
            }
        })
        .collect();
    Some((name.to_string(), parameter_types))
}

impl ErrorLocationProvider for Declaration {
    fn name(&self) -> &'static str {
        "declaration"
    }

    fn matches(&self, error: &CompileError, _broken: &BrokenCode) -> bool {
        FINAL_CLASS.is_match(&error.message) || error.message.contains(NO_OVERRIDE)
    }

    fn locate(
        &self,
        error: &CompileError,
        _broken: &BrokenCode,
        site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        if let Some(captures) = FINAL_CLASS.captures(&error.message) {
            let class = captures.get(1).map_or(site.class_name, |c| c.as_str());
            return Ok(ErrorLocation::class_only(class));
        }
        let source = fs::read_to_string(site.class_file).map_err(|source| AnalysisError::Io {
            path: site.class_file.to_path_buf(),
            source,
        })?;
        Ok(match declared_method(&source, error.line) {
            Some((method, parameter_types)) => ErrorLocation::new(site.class_name, Some(method), parameter_types),
            None => ErrorLocation::class_only(site.class_name),
        })
    }
}

/// Any broken code containing a call, located by walking the call chain.
pub struct MethodChain;

impl ErrorLocationProvider for MethodChain {
    fn name(&self) -> &'static str {
        "method_chain"
    }

    fn matches(&self, _error: &CompileError, broken: &BrokenCode) -> bool {
        CALL.is_match(&broken.code)
    }

    fn locate(
        &self,
        error: &CompileError,
        broken: &BrokenCode,
        site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        let analyzer = MethodChainAnalyzer::new(site.resolver);
        Ok(analyzer
            .analyze(&chain_input(error, broken, site))?
            .map(ErrorLocation::from)
            .unwrap_or_else(ErrorLocation::unresolved))
    }
}

/// A `super(...)` call: the parent's constructor.
pub struct Super;

impl ErrorLocationProvider for Super {
    fn name(&self) -> &'static str {
        "super"
    }

    fn matches(&self, _error: &CompileError, broken: &BrokenCode) -> bool {
        broken.trimmed().starts_with("super")
    }

    fn locate(
        &self,
        error: &CompileError,
        broken: &BrokenCode,
        site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        let Some(parent) = site.resolver.resolve_parent_class(site.class_file)? else {
            return Ok(ErrorLocation::unresolved());
        };
        let code = broken.trimmed();
        let arguments = find_open_paren(code, 0)
            .and_then(|open| find_matching(code, open).map(|close| &code[open + 1..close]))
            .map(split_arguments)
            .unwrap_or_default();
        let analyzer = MethodChainAnalyzer::new(site.resolver);
        let input = chain_input(error, broken, site);
        let parameter_types = arguments
            .into_iter()
            .map(|a| analyzer.argument_type(a, &input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ErrorLocation::new(
            parent.clone(),
            Some(parent),
            parameter_types,
        ))
    }
}

/// `incompatible types: A cannot be converted to B`. Only the required type is known.
pub struct TypeCast;

impl ErrorLocationProvider for TypeCast {
    fn name(&self) -> &'static str {
        "type_cast"
    }

    fn matches(&self, error: &CompileError, _broken: &BrokenCode) -> bool {
        INCOMPATIBLE.is_match(&error.message)
    }

    fn locate(
        &self,
        error: &CompileError,
        _broken: &BrokenCode,
        _site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        let required = INCOMPATIBLE
            .captures(&error.message)
            .map(|c| c[2].to_string());
        Ok(ErrorLocation::new("", None, vec![required]))
    }
}

/// A single-type import of a class that no longer exists.
pub struct Import;

/// The qualified class an import statement names, or `None` for wildcard imports.
pub fn imported_class(code: &str) -> Option<String> {
    let rest = code.trim().strip_prefix("import")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim().trim_end_matches(';').trim();
    let (is_static, name) = match rest.strip_prefix("static") {
        Some(member) if member.starts_with(char::is_whitespace) => (true, member.trim()),
        _ => (false, rest),
    };
    if name.ends_with(".*") || name.is_empty() {
        return None;
    }
    Some(if is_static {
        types::package_of(name).to_string()
    } else {
        name.to_string()
    })
}

impl ErrorLocationProvider for Import {
    fn name(&self) -> &'static str {
        "import"
    }

    fn matches(&self, _error: &CompileError, broken: &BrokenCode) -> bool {
        imported_class(&broken.code).is_some()
    }

    fn locate(
        &self,
        _error: &CompileError,
        broken: &BrokenCode,
        _site: &Site,
    ) -> Result<ErrorLocation, AnalysisError> {
        Ok(imported_class(&broken.code)
            .map(|class| ErrorLocation::class_only(types::simple_name(&class)))
            .unwrap_or_else(ErrorLocation::unresolved))
    }
}
