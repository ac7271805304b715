use bump_core::CompileError;
use std::path::PathBuf;
use tracing::debug;

/// The name a `symbol:` detail refers to: `class Widget` gives `Widget`, `method foo(int)`
/// gives `foo`.
fn symbol_name(error: &CompileError) -> Option<String> {
    let symbol = error.details.get("symbol")?;
    let name = symbol.split_whitespace().last()?;
    let name = name.split('(').next().unwrap_or(name);
    Some(name.to_string())
}

/// The simple name an import statement brings into scope: `Widget` for
/// `import com.lib.Widget;`, `make` for `import static com.lib.Util.make;`.
fn imported_name(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("import")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim().trim_end_matches(';').trim();
    let rest = rest.strip_prefix("static ").map(str::trim).unwrap_or(rest);
    match rest.rsplit('.').next()? {
        "" | "*" => None,
        name => Some(name.to_string()),
    }
}

/// [`prioritize_with`] for logs whose sources are not at hand. A `package ... does not exist`
/// error only covers later errors when it carries a `symbol:` detail.
pub fn prioritize(errors: Vec<CompileError>) -> Vec<CompileError> {
    prioritize_with(errors, |_| None)
}

/// Orders the errors of one build for solving.
///
/// Errors on the same file and line are merged into the first one (details are unioned).
/// Import-related errors then move to the front, keeping log order otherwise. A `cannot find
/// symbol` error about a symbol that an import error of the same file already covers is a
/// consequence of that import and is dropped.
///
/// `source_line` returns the source text an error points at. javac names only the missing
/// package of an import, so the imported symbol is read from the import statement itself.
pub fn prioritize_with(
    errors: Vec<CompileError>,
    source_line: impl Fn(&CompileError) -> Option<String>,
) -> Vec<CompileError> {
    let mut merged: Vec<CompileError> = Vec::with_capacity(errors.len());
    for error in errors {
        match merged
            .iter_mut()
            .find(|e| e.file == error.file && e.line == error.line)
        {
            Some(existing) => {
                existing.details.merge(&error.details);
                existing.import_related |= error.import_related;
            }
            None => merged.push(error),
        }
    }
    merged.sort_by_key(|e| !e.import_related);

    let mut imported: Vec<(PathBuf, String)> = Vec::new();
    merged.retain(|e| {
        if e.import_related {
            let symbol = symbol_name(e).or_else(|| source_line(e).as_deref().and_then(imported_name));
            if let Some(symbol) = symbol {
                imported.push((e.file.clone(), symbol));
            }
            return true;
        }
        let downstream = e.message.starts_with("cannot find symbol")
            && symbol_name(e).is_some_and(|s| imported.iter().any(|(f, i)| *f == e.file && *i == s));
        if downstream {
            debug!("dropping {}:{}, caused by a failed import", e.file.display(), e.line);
        }
        !downstream
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use bump_core::Details;

    fn error(file: &str, line: usize, message: &str, details: &[(&str, &str)], import: bool) -> CompileError {
        CompileError {
            file: PathBuf::from(file),
            line,
            column: 1,
            message: message.to_string(),
            import_related: import,
            details: details.iter().copied().collect::<Details>(),
        }
    }

    #[test]
    fn same_line_errors_are_merged() {
        let merged = prioritize(vec![
            error("A.java", 4, "cannot find symbol", &[("symbol", "method go()")], false),
            error("A.java", 4, "cannot find symbol", &[("location", "class B")], false),
            error("A.java", 5, "cannot find symbol", &[], false),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].details.get("symbol"), Some("method go()"));
        assert_eq!(merged[0].details.get("location"), Some("class B"));
    }

    #[test]
    fn imports_first_and_consequences_dropped() {
        let ordered = prioritize(vec![
            error("A.java", 20, "cannot find symbol", &[("symbol", "class Widget"), ("location", "class A")], false),
            error("A.java", 30, "incompatible types: int cannot be converted to String", &[], false),
            error("A.java", 3, "cannot find symbol", &[("symbol", "class Widget"), ("location", "package com.old")], true),
            error("B.java", 9, "cannot find symbol", &[("symbol", "class Widget"), ("location", "class B")], false),
        ]);
        let lines: Vec<(&str, usize)> = ordered
            .iter()
            .map(|e| (e.file.to_str().unwrap(), e.line))
            .collect();
        assert_eq!(lines, [("A.java", 3), ("A.java", 30), ("B.java", 9)]);
    }

    #[test]
    fn missing_package_covers_its_imported_class() {
        let errors = vec![
            error("A.java", 12, "cannot find symbol", &[("symbol", "class Widget"), ("location", "class A")], false),
            error("A.java", 3, "package com.lib does not exist", &[], true),
            error("A.java", 4, "package com.lib.util does not exist", &[], true),
            error("A.java", 15, "cannot find symbol", &[("symbol", "method make(int)"), ("location", "class A")], false),
            error("A.java", 18, "cannot find symbol", &[("symbol", "class Gadget"), ("location", "class A")], false),
        ];
        let line = |e: &CompileError| match e.line {
            3 => Some("import com.lib.Widget;".to_string()),
            4 => Some("import static com.lib.util.Util.make;".to_string()),
            _ => None,
        };
        let lines: Vec<usize> = prioritize_with(errors.clone(), line).iter().map(|e| e.line).collect();
        assert_eq!(lines, [3, 4, 18]);

        // Without the import text nothing is known to be covered.
        let lines: Vec<usize> = prioritize(errors).iter().map(|e| e.line).collect();
        assert_eq!(lines, [3, 4, 12, 15, 18]);
    }

    #[test]
    fn imported_names() {
        assert_eq!(imported_name("import com.lib.Widget;").as_deref(), Some("Widget"));
        assert_eq!(imported_name("  import static com.lib.Util.make ;").as_deref(), Some("make"));
        assert_eq!(imported_name("import com.lib.*;"), None);
        assert_eq!(imported_name("important();"), None);
    }
}
