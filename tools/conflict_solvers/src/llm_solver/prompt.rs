//! Assembly of the text-completion prompt for one error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

const TYPE: &str = r"[\w$.]+(?:<[^()]*>)?(?:\[\])*";

/// A declaration starting with modifiers: `public Foo(`, `private static int size(`.
static WITH_MODIFIERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|protected|private|static|final|synchronized|abstract|native|default|strictfp)\s+)+(?:<[^>]*>\s+)?(?:({TYPE})\s+)?([\w$]+)\s*\("
    ))
    .unwrap()
});
/// A package-private declaration: `void run(`, `List<String> names(`.
static WITH_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\s*(?:<[^>]*>\s+)?({TYPE})\s+([\w$]+)\s*\(")).unwrap()
});

const STATEMENT_KEYWORDS: [&str; 14] = [
    "if", "else", "for", "while", "do", "switch", "catch", "try", "return", "throw", "new", "case",
    "synchronized", "yield",
];

fn is_method_declaration(line: &str) -> bool {
    if line.trim_end().ends_with(';') {
        return false;
    }
    let captures = WITH_MODIFIERS
        .captures(line)
        .or_else(|| WITH_TYPE.captures(line));
    let Some(c) = captures else {
        return false;
    };
    let keyword = |m: Option<regex::Match>| m.is_some_and(|m| STATEMENT_KEYWORDS.contains(&m.as_str()));
    !keyword(c.get(1)) && !keyword(c.get(2))
}

/// Net `{` minus `}` of a line, ignoring string and char literals.
fn brace_balance(line: &str) -> isize {
    let mut balance = 0;
    let mut quote = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' => balance += 1,
                '}' => balance -= 1,
                _ => {}
            },
        }
    }
    balance
}

/// The method or constructor around the 1-based `line` of `source`: the nearest declaration at
/// or above the line, through the brace that closes it. `None` if the line is not inside one.
pub fn enclosing_scope(source: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let target = line.checked_sub(1).filter(|&i| i < lines.len())?;
    let start = (0..=target).rev().find(|&i| is_method_declaration(lines[i]))?;
    let mut depth = 0isize;
    let mut opened = false;
    for (i, text) in lines.iter().enumerate().skip(start) {
        depth += brace_balance(text);
        opened |= text.contains('{');
        if opened && depth <= 0 {
            return (i >= target).then(|| lines[start..=i].join("\n"));
        }
    }
    None
}

/// The sections of a prompt, rendered in order as Markdown.
#[derive(Debug, Default)]
pub struct Prompt {
    sections: Vec<(String, String)>,
}

impl Prompt {
    pub fn section(&mut self, title: impl Into<String>, body: impl Into<String>) -> &mut Prompt {
        self.sections.push((title.into(), body.into()));
        self
    }

    pub fn code_section(&mut self, title: impl Into<String>, code: &str) -> &mut Prompt {
        self.section(title, format!("```java\n{}\n```", code.trim_end()))
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (title, body)) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "## {title}")?;
            writeln!(f, "{}", body.trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"package com.app;

public class Main {
    private Client client;

    public Main(Client client) {
        this.client = client;
    }

    @Deprecated
    void run(String name) {
        if (name.isEmpty()) {
            return;
        }
        String brace = "}";
        client.fetch(name).body();
    }
}
"#;

    #[test]
    fn declarations_are_recognized() {
        assert!(is_method_declaration("    public Main(Client client) {"));
        assert!(is_method_declaration("    void run(String name) {"));
        assert!(is_method_declaration("  public static <T> List<T> of(T item)"));
        assert!(!is_method_declaration("        if (name.isEmpty()) {"));
        assert!(!is_method_declaration("        client.fetch(name).body();"));
        assert!(!is_method_declaration("    abstract void close();"));
        assert!(!is_method_declaration("        return compute(a);"));
        assert!(!is_method_declaration("        } else if (x) {"));
    }

    #[test]
    fn scope_runs_to_the_closing_brace() {
        let scope = enclosing_scope(SOURCE, 16).unwrap();
        assert!(scope.starts_with("    void run(String name) {"));
        assert!(scope.ends_with("    }"));
        assert_eq!(scope.lines().count(), 7);

        let constructor = enclosing_scope(SOURCE, 7).unwrap();
        assert_eq!(constructor.lines().count(), 3);
        assert_eq!(enclosing_scope(SOURCE, 4), None);
        assert_eq!(enclosing_scope(SOURCE, 99), None);
    }

    #[test]
    fn sections_render_in_order() {
        let mut prompt = Prompt::default();
        prompt.section("Compiler error", "cannot find symbol").code_section("Broken code", "x();\n");
        assert_eq!(
            prompt.to_string(),
            "## Compiler error\ncannot find symbol\n\n## Broken code\n```java\nx();\n```\n"
        );
    }
}
