//! The result of comparing two versions of a library.

use code_analysis::bytecode::{ClassFile, MethodInfo};
use std::fmt;
use std::sync::Arc;

/// How an element differs between the old and the new jar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    New,
    Removed,
    Unchanged,
    Modified,
}

/// A change that can break clients compiled against the old version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompatibilityChange {
    ClassRemoved,
    ClassLessAccessible,
    ClassNowAbstract,
    ClassNowFinal,
    ClassNowDeprecated,
    SuperclassRemoved,
    SuperclassChanged,
    InterfaceAdded,
    InterfaceRemoved,
    MethodRemoved,
    MethodLessAccessible,
    MethodNowStatic,
    MethodNoLongerStatic,
    MethodNowAbstract,
    MethodNowFinal,
    MethodNowDeprecated,
    MethodNowVoid,
    MethodNoLongerVoid,
    MethodReturnTypeChanged,
    MethodExceptionsChanged,
}

impl fmt::Display for CompatibilityChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CompatibilityChange::ClassRemoved => "class removed",
            CompatibilityChange::ClassLessAccessible => "class less accessible",
            CompatibilityChange::ClassNowAbstract => "class now abstract",
            CompatibilityChange::ClassNowFinal => "class now final",
            CompatibilityChange::ClassNowDeprecated => "class now deprecated",
            CompatibilityChange::SuperclassRemoved => "superclass removed",
            CompatibilityChange::SuperclassChanged => "superclass changed",
            CompatibilityChange::InterfaceAdded => "interface added",
            CompatibilityChange::InterfaceRemoved => "interface removed",
            CompatibilityChange::MethodRemoved => "method removed",
            CompatibilityChange::MethodLessAccessible => "method less accessible",
            CompatibilityChange::MethodNowStatic => "method now static",
            CompatibilityChange::MethodNoLongerStatic => "method no longer static",
            CompatibilityChange::MethodNowAbstract => "method now abstract",
            CompatibilityChange::MethodNowFinal => "method now final",
            CompatibilityChange::MethodNowDeprecated => "method now deprecated",
            CompatibilityChange::MethodNowVoid => "method now returns void",
            CompatibilityChange::MethodNoLongerVoid => "method no longer returns void",
            CompatibilityChange::MethodReturnTypeChanged => "return type changed",
            CompatibilityChange::MethodExceptionsChanged => "thrown exceptions changed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterChange {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// One parameter position of a method present in both versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDiff {
    pub change: ParameterChange,
    pub old_type: Option<String>,
    pub new_type: Option<String>,
}

/// A method or constructor. Old and new members with the same name but different parameters
/// are paired into one `Modified` diff.
#[derive(Debug, Clone)]
pub struct MethodDiff {
    /// `<init>` for constructors.
    pub name: String,
    pub status: ChangeStatus,
    pub old: Option<MethodInfo>,
    pub new: Option<MethodInfo>,
    pub changes: Vec<CompatibilityChange>,
    pub parameters: Vec<ParameterDiff>,
}

impl MethodDiff {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Parameter types the client was compiled against.
    pub fn old_parameters(&self) -> Vec<String> {
        self.old.as_ref().map(MethodInfo::parameter_types).unwrap_or_default()
    }

    pub fn new_parameters(&self) -> Vec<String> {
        self.new.as_ref().map(MethodInfo::parameter_types).unwrap_or_default()
    }

    pub fn has_parameter_changes(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| p.change != ParameterChange::Unchanged)
    }

    /// The member as it appears in the old version, or in the new one if it is new.
    fn member(&self) -> Option<&MethodInfo> {
        self.old.as_ref().or(self.new.as_ref())
    }
}

/// A member as Java would declare it, e.g. `public static int size(java.lang.String)`.
pub fn render_member(class: &str, method: &MethodInfo) -> String {
    let name = if method.is_constructor() {
        code_analysis::types::simple_name(class)
    } else {
        &method.name
    };
    let mut out = String::new();
    if method.visibility() != code_analysis::bytecode::Visibility::PackagePrivate {
        out.push_str(method.visibility().keyword());
        out.push(' ');
    }
    if method.is_static() {
        out.push_str("static ");
    }
    if !method.is_constructor()
        && let Some(ret) = method.return_type()
    {
        out.push_str(&ret);
        out.push(' ');
    }
    out.push_str(&format!("{name}({})", method.parameter_types().join(", ")));
    if !method.exceptions.is_empty() {
        out.push_str(&format!(" throws {}", method.exceptions.join(", ")));
    }
    out
}

/// Renders a human readable report of one member, as given to the text-completion service.
pub struct MethodReport<'a> {
    pub class: &'a str,
    pub method: &'a MethodDiff,
}

impl fmt::Display for MethodReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.method.is_constructor() { "Constructor" } else { "Method" };
        let status = match self.method.status {
            ChangeStatus::New => "added",
            ChangeStatus::Removed => "removed",
            ChangeStatus::Unchanged => "unchanged",
            ChangeStatus::Modified => "modified",
        };
        let signature = self
            .method
            .member()
            .map(|m| render_member(self.class, m))
            .unwrap_or_default();
        writeln!(f, "{kind} {status} in {}: {signature}", self.class)?;
        if let (Some(old), Some(new)) = (&self.method.old, &self.method.new)
            && old != new
        {
            writeln!(f, "  old: {}", render_member(self.class, old))?;
            writeln!(f, "  new: {}", render_member(self.class, new))?;
        }
        for (position, p) in self.method.parameters.iter().enumerate() {
            match p.change {
                ParameterChange::Unchanged => {}
                ParameterChange::Added => writeln!(
                    f,
                    "  parameter {position} added: {}",
                    p.new_type.as_deref().unwrap_or("?")
                )?,
                ParameterChange::Removed => writeln!(
                    f,
                    "  parameter {position} removed: {}",
                    p.old_type.as_deref().unwrap_or("?")
                )?,
                ParameterChange::Modified => writeln!(
                    f,
                    "  parameter {position} changed: {} -> {}",
                    p.old_type.as_deref().unwrap_or("?"),
                    p.new_type.as_deref().unwrap_or("?")
                )?,
            }
        }
        for change in &self.method.changes {
            writeln!(f, "  {change}")?;
        }
        Ok(())
    }
}

/// A class of either version.
#[derive(Debug, Clone)]
pub struct ClassDiff {
    pub name: String,
    pub status: ChangeStatus,
    pub old: Option<Arc<ClassFile>>,
    pub new: Option<Arc<ClassFile>>,
    pub changes: Vec<CompatibilityChange>,
    /// Methods and constructors; synthetic members are left out.
    pub methods: Vec<MethodDiff>,
}

impl ClassDiff {
    /// Every method diff named `name`; `<init>` selects constructors.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDiff> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Old superclass, where inherited members are looked up.
    pub fn old_superclass(&self) -> Option<&str> {
        self.old.as_ref().and_then(|c| c.super_name.as_deref())
    }
}
