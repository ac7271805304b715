//! Comment removal that keeps a line index valid.

/// Output of [`clean_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedSource {
    /// Lines with comments removed. Lines that held nothing but comments are dropped.
    pub lines: Vec<String>,
    /// The caller's 0-based line index, moved up by the number of dropped lines before it.
    pub index: usize,
}

/// Strips `//` and `/* */` comments from `lines`, tracking block comments across line boundaries
/// and ignoring comment markers inside string and char literals.
///
/// `index` is a 0-based index into `lines`; the returned index addresses the same code line in the
/// cleaned text. It never grows.
pub fn clean_lines<S: AsRef<str>>(lines: &[S], index: usize) -> CleanedSource {
    let mut cleaned = Vec::with_capacity(lines.len());
    let mut new_index = index;
    let mut in_block = false;

    for (i, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let (stripped, still_in_block) = strip_line(line, in_block);
        in_block = still_in_block;
        let comment_only = stripped.trim().is_empty() && !line.trim().is_empty();
        if comment_only {
            if i < index {
                new_index -= 1;
            }
            continue;
        }
        cleaned.push(stripped);
    }

    CleanedSource {
        lines: cleaned,
        index: new_index,
    }
}

/// Removes comments from one line. Returns the remaining code and whether a block comment is
/// still open at the end of the line.
fn strip_line(line: &str, mut in_block: bool) -> (String, bool) {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if in_block {
            if c == '*' && next == Some('/') {
                in_block = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(n) = next {
                    out.push(n);
                }
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (c, next) {
            ('/', Some('/')) => break,
            ('/', Some('*')) => {
                in_block = true;
                i += 2;
            }
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    (out, in_block)
}
