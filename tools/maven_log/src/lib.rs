//! Reads the compiler diagnostics out of a Maven build log.
//!
//! javac errors appear as `[ERROR] <file>:[<line>,<column>] <message>`, followed by indented
//! detail lines such as `  symbol:   method foo(int)`. Every other `[ERROR]` line (plugin
//! failures, the summary at the end of the build) is kept as [`LogRecord::Other`] and ignored
//! by the repair loop.

mod priority;

pub use priority::{prioritize, prioritize_with};

use bump_core::{CompileError, Details};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

static ANSI: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());
static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[ERROR\]\s+(\S+\.java):\[(\d+),(\d+)\]\s*(.*)$").unwrap());
static DETAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[ERROR\])?\s+(symbol|location|required|found|reason)\s*:\s*(.*)$").unwrap()
});
static MISSING_PACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^package \S+ does not exist").unwrap());
/// javac tags lint diagnostics promoted to errors, e.g. `[deprecation] `.
static LINT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[[a-z-]+\]\s*").unwrap());

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read build log {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Compile(CompileError),
    /// Any other `[ERROR]` line, verbatim.
    Other(String),
}

/// Whether a build log reports a failure. Successful builds print no `[ERROR]` line.
pub fn build_failed(log: &str) -> bool {
    log.lines().any(|l| strip_ansi(l).starts_with("[ERROR]"))
}

pub fn parse_file(path: &Path) -> Result<Vec<LogRecord>, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&text))
}

pub fn parse(log: &str) -> Vec<LogRecord> {
    let mut records = Vec::new();
    let mut current: Option<CompileError> = None;
    for raw in log.lines() {
        let line = strip_ansi(raw);
        let line = line.trim_end();
        if let Some(error) = current.as_mut()
            && let Some(c) = DETAIL.captures(line)
        {
            error.details.insert(&c[1], c[2].trim());
            continue;
        }
        if let Some(error) = current.take() {
            records.push(LogRecord::Compile(finish(error)));
        }
        if let Some(c) = HEADER.captures(line) {
            let message = LINT_TAG.replace(c[4].trim(), "").into_owned();
            current = Some(CompileError {
                file: PathBuf::from(&c[1]),
                line: c[2].parse().unwrap_or(0),
                column: c[3].parse().unwrap_or(0),
                message,
                import_related: false,
                details: Details::new(),
            });
        } else if line.starts_with("[ERROR]") {
            let text = line.trim_start_matches("[ERROR]").trim();
            if !text.is_empty() {
                records.push(LogRecord::Other(text.to_string()));
            }
        }
    }
    if let Some(error) = current {
        records.push(LogRecord::Compile(finish(error)));
    }
    debug!(
        "parsed {} compile errors out of {} records",
        records.iter().filter(|r| matches!(r, LogRecord::Compile(_))).count(),
        records.len()
    );
    records
}

/// The compile errors of a parsed log, in log order.
pub fn compile_errors(records: Vec<LogRecord>) -> Vec<CompileError> {
    records
        .into_iter()
        .filter_map(|r| match r {
            LogRecord::Compile(error) => Some(error),
            LogRecord::Other(text) => {
                trace!("ignoring {text}");
                None
            }
        })
        .collect()
}

fn finish(mut error: CompileError) -> CompileError {
    error.import_related = is_import_related(&error);
    error
}

/// A missing package, or a symbol the compiler looked up in a package rather than a class.
pub fn is_import_related(error: &CompileError) -> bool {
    if MISSING_PACKAGE.is_match(&error.message) {
        return true;
    }
    error.message.starts_with("cannot find symbol")
        && error
            .details
            .get("location")
            .is_some_and(|l| l.starts_with("package "))
}

fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI.replace_all(line, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
[INFO] --- maven-compiler-plugin:3.8.1:compile (default-compile) @ app ---
[INFO] Compiling 12 source files to /app/target/classes
[ERROR] COMPILATION ERROR :
[INFO] -------------------------------------------------------------
[ERROR] /app/src/main/java/com/app/Main.java:[5,20] package com.old.pkg does not exist
[ERROR] /app/src/main/java/com/app/Main.java:[14,17] cannot find symbol
  symbol:   method foo(int,java.lang.String)
  location: class Bar
[ERROR] /app/src/main/java/com/app/Util.java:[7,9] \x1b[1m[deprecation] run() in com.lib.Task has been deprecated\x1b[m
[INFO] 3 errors
[ERROR] Failed to execute goal org.apache.maven.plugins:maven-compiler-plugin:3.8.1:compile
";

    #[test]
    fn reads_headers_and_details() {
        let records = parse(LOG);
        let others: Vec<&str> = records
            .iter()
            .filter_map(|r| match r {
                LogRecord::Other(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(others.len(), 2);
        assert!(others[1].starts_with("Failed to execute goal"));

        let errors = compile_errors(records);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].import_related);
        assert_eq!(errors[0].message, "package com.old.pkg does not exist");

        let symbol = &errors[1];
        assert_eq!((symbol.line, symbol.column), (14, 17));
        assert_eq!(symbol.class_name(), "Main");
        assert_eq!(symbol.details.get("symbol"), Some("method foo(int,java.lang.String)"));
        assert_eq!(symbol.details.get("location"), Some("class Bar"));
        assert!(!symbol.import_related);

        assert_eq!(errors[2].message, "run() in com.lib.Task has been deprecated");
    }

    #[test]
    fn package_locations_are_import_related() {
        let log = "[ERROR] /a/B.java:[3,15] cannot find symbol\n  symbol:   class Widget\n  location: package com.old\n";
        let errors = compile_errors(parse(log));
        assert!(errors[0].import_related);
    }

    #[test]
    fn success_has_no_error_marker() {
        assert!(build_failed(LOG));
        assert!(!build_failed("[INFO] BUILD SUCCESS\n"));
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            parse_file(&dir.path().join("absent.log")),
            Err(ParseError::Io { .. })
        ));
        let path = dir.path().join("build.log");
        std::fs::write(&path, LOG).unwrap();
        assert_eq!(compile_errors(parse_file(&path).unwrap()).len(), 3);
    }
}
