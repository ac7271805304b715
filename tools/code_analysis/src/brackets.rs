//! Index-based scanning of parentheses and top-level separators.
//!
//! All indices are byte offsets. The scanners only look at ASCII delimiters, so they are safe on
//! UTF-8 text. String and character literals are skipped.

/// Returns the index just past the string or char literal starting at `start` (which must be a
/// quote), or the end of the text for an unterminated literal.
fn skip_literal(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Finds the `)` closing the `(` at `open`: the first position where the running count of `(`
/// equals the running count of `)` and is non-zero.
pub fn find_matching(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (mut opened, mut closed) = (0usize, 0usize);
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' => opened += 1,
            b')' => closed += 1,
            _ => {}
        }
        if opened != 0 && opened == closed {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Counts `(` and `)` outside literals.
pub fn paren_counts(text: &str) -> (usize, usize) {
    let bytes = text.as_bytes();
    let (mut opened, mut closed) = (0, 0);
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' => opened += 1,
            b')' => closed += 1,
            _ => {}
        }
        i += 1;
    }
    (opened, closed)
}

/// Whether the `<` at `i` opens a type argument list (`List<String>`, `Map<K, ?>`, `new Foo<>`)
/// rather than being a comparison.
fn opens_type_arguments(bytes: &[u8], i: usize) -> bool {
    let before = i.checked_sub(1).map(|j| bytes[j]);
    let after = bytes.get(i + 1).copied();
    let ident_before = before.is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.');
    let type_after = after.is_some_and(|c| c.is_ascii_uppercase() || c == b'?' || c == b'>');
    ident_before && type_after
}

/// Splits `text` at every `separator` not nested in parentheses, brackets, braces, type argument
/// lists or literals. Returns each piece with its start offset; pieces are not trimmed.
pub fn split_top_level(text: &str, separator: u8) -> Vec<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut angle = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'<' if opens_type_arguments(bytes, i) => angle += 1,
            b'>' if angle > 0 => angle -= 1,
            c if c == separator && depth == 0 && angle == 0 => {
                pieces.push((start, &text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    pieces.push((start, &text[start..]));
    pieces
}

/// Splits a call's argument list on top-level commas. An empty or blank list has no arguments.
pub fn split_arguments(arguments: &str) -> Vec<&str> {
    if arguments.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(arguments, b',')
        .into_iter()
        .map(|(_, arg)| arg.trim())
        .collect()
}

/// Index of the first `(` at or after `from` that is outside any literal.
pub fn find_open_paren(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the last `=` at nesting depth zero that is an assignment (not part of `==`, `!=`,
/// `<=`, `>=`, or a compound operator's comparison).
pub fn last_top_level_assignment(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let prev = i.checked_sub(1).map(|j| bytes[j]);
                let next = bytes.get(i + 1).copied();
                let comparison = matches!(prev, Some(b'=' | b'!' | b'<' | b'>')) || next == Some(b'=');
                if !comparison {
                    found = Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    found
}

/// Binary and ternary operators as they appear in formatted code, surrounded by spaces. Requiring
/// the spaces keeps unary minus and type argument lists out.
const SPACED_OPERATORS: [&str; 15] = [
    " && ", " || ", " == ", " != ", " <= ", " >= ", " < ", " > ", " + ", " - ", " * ", " / ",
    " % ", " ? ", " : ",
];

/// The byte range of the top-level operand of `text` that contains `column`. Text without
/// top-level operators is a single operand.
pub fn operand_at(text: &str, column: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 => {
                if let Some(op) = SPACED_OPERATORS.iter().find(|op| text[i..].starts_with(**op)) {
                    if column < i {
                        return (start, i);
                    }
                    start = i + op.len();
                    i = start;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    (start, text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_paren_returns_first_balanced_position() {
        let text = "foo(a(b), c).bar()";
        assert_eq!(find_matching(text, 3), Some(11));
        assert_eq!(find_matching(text, 5), Some(7));
        assert_eq!(find_matching("foo(a, b", 3), None);
        assert_eq!(find_matching("f(\")\")", 1), Some(5));
    }

    #[test]
    fn split_respects_nesting_and_generics() {
        let args = split_arguments("a, foo(b, c), new HashMap<String, Integer>(), \"x,y\"");
        assert_eq!(
            args,
            ["a", "foo(b, c)", "new HashMap<String, Integer>()", "\"x,y\""]
        );
        assert!(split_arguments("  ").is_empty());
        assert_eq!(split_arguments("i < n, j > 2"), ["i < n", "j > 2"]);
    }

    #[test]
    fn assignment_ignores_comparisons() {
        assert_eq!(last_top_level_assignment("int x = a == b ? 1 : 2"), Some(6));
        assert_eq!(last_top_level_assignment("a >= b"), None);
        assert_eq!(last_top_level_assignment("foo(x = 1)"), None);
        assert_eq!(last_top_level_assignment("a = b = c"), Some(6));
    }

    #[test]
    fn operand_containing_column() {
        let text = "a.size() + b.get(x - 1) * 2";
        assert_eq!(operand_at(text, 3), (0, 8));
        assert_eq!(&text[operand_at(text, 13).0..operand_at(text, 13).1], "b.get(x - 1)");
        assert_eq!(operand_at("foo.bar(-1)", 4), (0, 11));
        assert_eq!(operand_at("\" + \" + s", 9), (8, 9));
    }

    #[test]
    fn counts_skip_literals() {
        assert_eq!(paren_counts("foo(\"(\", bar("), (2, 0));
    }
}
