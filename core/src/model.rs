//! Records passed between the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Ordered detail lines attached to a diagnostic, e.g. `symbol -> method foo(int)`.
///
/// Insertion order is kept so prompts and reports list the details the way the compiler
/// printed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details(Vec<(String, String)>);

impl Details {
    pub fn new() -> Details {
        Details::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key` to `value`, replacing an earlier value in place.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let (key, value) = (key.into(), value.into());
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Adds every entry of `other` whose key is not present yet. Existing values win.
    pub fn merge(&mut self, other: &Details) {
        for (k, v) in &other.0 {
            if self.get(k).is_none() {
                self.0.push((k.clone(), v.clone()));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Details {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut details = Details::new();
        for (k, v) in iter {
            details.insert(k, v);
        }
        details
    }
}

/// One compiler diagnostic, as produced by the log parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    /// Source file as reported by the compiler (a path inside the build sandbox).
    pub file: PathBuf,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
    pub message: String,
    pub import_related: bool,
    pub details: Details,
}

impl CompileError {
    /// File name of the reported source, e.g. `Foo.java`. This is what the working directories
    /// key corrected classes by.
    pub fn class_file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `class_file_name` without the `.java` extension.
    pub fn class_name(&self) -> String {
        let file_name = self.class_file_name();
        file_name
            .strip_suffix(".java")
            .unwrap_or(&file_name)
            .to_string()
    }

    /// Renders the diagnostic the way javac prints it, detail lines included.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}:[{},{}] {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        );
        for (k, v) in self.details.iter() {
            out.push_str(&format!("\n  {k}: {v}"));
        }
        out
    }
}

/// The source snippet a diagnostic points at.
///
/// Lines `start..end` (1-based, `end` exclusive) belong to the snippet. When the snippet fits on
/// its start line `end == start`, so applying a fix replaces only the start line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenCode {
    pub code: String,
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl BrokenCode {
    pub fn new(code: impl Into<String>, start: usize, end: usize) -> BrokenCode {
        debug_assert!(start <= end);
        BrokenCode {
            code: code.into(),
            start,
            end,
            label: String::new(),
        }
    }

    pub fn trimmed(&self) -> &str {
        self.code.trim()
    }
}

/// What a diagnostic is about: the class, optionally a method on it, and the argument types the
/// broken code passes. Entries of `parameter_types` are `None` where the type could not be
/// inferred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub class_name: String,
    pub method_name: Option<String>,
    pub parameter_types: Vec<Option<String>>,
}

impl ErrorLocation {
    pub fn new(
        class_name: impl Into<String>,
        method_name: Option<String>,
        parameter_types: Vec<Option<String>>,
    ) -> ErrorLocation {
        ErrorLocation {
            class_name: class_name.into(),
            method_name,
            parameter_types,
        }
    }

    pub fn class_only(class_name: impl Into<String>) -> ErrorLocation {
        ErrorLocation::new(class_name, None, vec![])
    }

    /// The location used when no provider claims a diagnostic.
    pub fn unresolved() -> ErrorLocation {
        ErrorLocation::default()
    }

    pub fn method(&self) -> Option<&str> {
        self.method_name.as_deref().filter(|m| !m.is_empty())
    }

    pub fn has_class(&self) -> bool {
        !self.class_name.is_empty()
    }

    pub fn is_unresolved(&self) -> bool {
        !self.has_class() && self.method().is_none()
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class_name)?;
        if let Some(method) = self.method() {
            let params: Vec<&str> = self
                .parameter_types
                .iter()
                .map(|p| p.as_deref().unwrap_or("?"))
                .collect();
            write!(f, "#{method}({})", params.join(", "))?;
        }
        Ok(())
    }
}

/// What changed in the dependency API for the symbol behind an error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    ClassRemoved,
    ClassMoved,
    ClassVisibilityChanged,
    ClassNowAbstract,
    ClassNowFinal,
    ClassDeprecated,
    ClassSuperclassChanged,
    ClassInterfacesChanged,
    MethodRemoved,
    MethodParametersAdded,
    MethodParametersRemoved,
    MethodParameterTypesChanged,
    MethodVisibilityChanged,
    MethodChangedStaticToNonStatic,
    MethodChangedNonStaticToStatic,
    MethodChangedToVoid,
    MethodChangedFromVoid,
    MethodReturnTypeChanged,
    MethodNowAbstract,
    MethodNowFinal,
    MethodDeprecated,
    MethodExceptionsChanged,
    MethodNoLongerOverrides,
    ParentClassSealed,
    Unknown,
    UnknownClass,
    UnknownMethod,
}

impl ConflictType {
    pub fn is_parameter_change(self) -> bool {
        matches!(
            self,
            ConflictType::MethodParametersAdded
                | ConflictType::MethodParametersRemoved
                | ConflictType::MethodParameterTypesChanged
        )
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialized form is the canonical name.
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// A replacement for the lines of one [`BrokenCode`] span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    /// File name of the class being edited, e.g. `Foo.java`.
    pub class_name: String,
    pub code: String,
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
}

impl ProposedChange {
    /// Returns a copy moved by `delta` lines. Used when a cached fix is reused for the same broken
    /// text at another line.
    pub fn shifted(&self, delta: isize) -> ProposedChange {
        let shift = |line: usize| line.saturating_add_signed(delta).max(1);
        ProposedChange {
            start: shift(self.start),
            end: shift(self.end),
            ..self.clone()
        }
    }
}
