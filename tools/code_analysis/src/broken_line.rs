//! Extraction of the source snippet a diagnostic points at.

use crate::AnalysisError;
use crate::brackets::paren_counts;
use bump_core::BrokenCode;
use bump_core::context::Context;
use std::fs;
use std::path::Path;

fn self_contained(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.ends_with(';') || trimmed.ends_with('{') || trimmed.ends_with('}')
}

/// Reads the snippet at the 1-based `position = [line, column]` of `source`.
///
/// A line that is neither terminated (`;`, `{`, `}`) nor parenthesis-balanced is joined with the
/// following lines until one ends with `;` or the parentheses balance. `end` is then the line
/// after the last joined one; a snippet that fits on its line has `end == start`.
pub fn read_broken_line(source: &Path, position: [usize; 2]) -> Result<BrokenCode, AnalysisError> {
    let text = fs::read_to_string(source).map_err(|e| AnalysisError::io(source, e))?;
    let lines: Vec<&str> = text.lines().collect();
    let start = position[0];
    let Some(first) = start.checked_sub(1).and_then(|i| lines.get(i)) else {
        return Err(AnalysisError::Parse(format!(
            "line {start} is outside {} ({} lines)",
            source.display(),
            lines.len()
        )));
    };

    let (opened, closed) = paren_counts(first);
    if self_contained(first) || opened == closed {
        return Ok(BrokenCode::new(*first, start, start));
    }

    let mut code = first.to_string();
    let mut next = start;
    while let Some(line) = lines.get(next) {
        code.push('\n');
        code.push_str(line);
        next += 1;
        let (opened, closed) = paren_counts(&code);
        if line.trim_end().ends_with(';') || (opened == closed && opened != 0) {
            break;
        }
    }
    Ok(BrokenCode::new(code, start, next + 1))
}

/// Reads a broken line of `class_file_name` (e.g. `Foo.java`) from the version of the class the
/// context's current iteration works on: the broken original in iteration 0, afterwards the
/// newest corrected copy.
pub fn read_broken_line_in(
    context: &Context,
    class_file_name: &str,
    position: [usize; 2],
) -> Result<BrokenCode, AnalysisError> {
    read_broken_line(&context.current_class_source(class_file_name), position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brackets::paren_counts;

    const SOURCE: &str = "class A {
    void run() {
        int x = compute(1,
            2,
            helper(3));
        client.call(a,
            b)
        String s = \"done\";
        list.forEach(e -> {
    }
}
";

    fn write(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("A.java");
        fs::write(&path, SOURCE).unwrap();
        path
    }

    #[test]
    fn single_line_has_empty_trailing_span() {
        let dir = tempfile::tempdir().unwrap();
        let code = read_broken_line(&write(dir.path()), [8, 9]).unwrap();
        assert_eq!(code.code.trim(), "String s = \"done\";");
        assert_eq!((code.start, code.end), (8, 8));
    }

    #[test]
    fn extends_until_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        let code = read_broken_line(&write(dir.path()), [3, 17]).unwrap();
        assert_eq!((code.start, code.end), (3, 6));
        let (opened, closed) = paren_counts(&code.code);
        assert_eq!(opened, closed);
        assert!(code.code.lines().last().unwrap().trim_end().ends_with(';'));
    }

    #[test]
    fn extends_until_parentheses_balance() {
        let dir = tempfile::tempdir().unwrap();
        let code = read_broken_line(&write(dir.path()), [6, 9]).unwrap();
        assert_eq!((code.start, code.end), (6, 8));
        assert_eq!(code.code.lines().count(), 2);
    }

    #[test]
    fn braces_end_a_statement() {
        let dir = tempfile::tempdir().unwrap();
        let code = read_broken_line(&write(dir.path()), [9, 9]).unwrap();
        assert_eq!((code.start, code.end), (9, 9));
    }

    #[test]
    fn idempotent_and_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path());
        assert_eq!(
            read_broken_line(&path, [3, 5]).unwrap(),
            read_broken_line(&path, [3, 5]).unwrap()
        );
        assert!(matches!(
            read_broken_line(&dir.path().join("B.java"), [1, 1]),
            Err(AnalysisError::Io { .. })
        ));
    }

    #[test]
    fn reads_from_the_current_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = bump_core::context::WorkingDirectories::new(dir.path(), "p");
        dirs.create_all().unwrap();
        let mut ctx = Context::new("p", "abc", dirs);
        fs::write(ctx.broken_class_path("A.java"), SOURCE).unwrap();
        assert_eq!(read_broken_line_in(&ctx, "A.java", [1, 1]).unwrap().code, "class A {");

        let fixed = ctx.fixed_class_path(0, "A.java");
        fs::create_dir_all(fixed.parent().unwrap()).unwrap();
        fs::write(&fixed, "final class A {\n}\n").unwrap();
        ctx.next_iteration();
        assert_eq!(read_broken_line_in(&ctx, "A.java", [1, 1]).unwrap().code, "final class A {");
    }
}
