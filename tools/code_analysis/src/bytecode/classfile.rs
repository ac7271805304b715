//! The parts of a class file the analysis needs: names, access flags, field and method tables,
//! and the attributes that carry deprecation, thrown exceptions and permitted subclasses.
//! Parsing, including the constant pool's modified UTF-8, is done by `cafebabe`.

use super::descriptor::{self, internal_to_java};
use crate::AnalysisError;
use cafebabe::attributes::{AttributeData, AttributeInfo};

pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const BRIDGE: u16 = 0x0040;
    pub const VARARGS: u16 = 0x0080;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ENUM: u16 = 0x4000;
}

const DEPRECATED_ANNOTATION: &str = "Ljava/lang/Deprecated;";

/// Member visibility, ordered from least to most accessible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Private,
    PackagePrivate,
    Protected,
    Public,
}

impl Visibility {
    pub fn from_flags(flags: u16) -> Visibility {
        if flags & access::PUBLIC != 0 {
            Visibility::Public
        } else if flags & access::PROTECTED != 0 {
            Visibility::Protected
        } else if flags & access::PRIVATE != 0 {
            Visibility::Private
        } else {
            Visibility::PackagePrivate
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::PackagePrivate => "",
            Visibility::Protected => "protected",
            Visibility::Public => "public",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Java type name of the field, e.g. `java.lang.String`.
    pub java_type: String,
    pub deprecated: bool,
}

impl FieldInfo {
    pub fn type_name(&self) -> Option<String> {
        Some(self.java_type.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    /// JVM form, e.g. `(ILjava/lang/String;)V`. Two overloads never share one.
    pub descriptor: String,
    /// Parameter types as Java names.
    pub parameters: Vec<String>,
    /// `void` for methods without a result.
    pub result: String,
    /// Checked exceptions from the `Exceptions` attribute, as Java names.
    pub exceptions: Vec<String>,
    pub deprecated: bool,
}

impl MethodInfo {
    pub fn parameter_types(&self) -> Vec<String> {
        self.parameters.clone()
    }

    pub fn return_type(&self) -> Option<String> {
        Some(self.result.clone())
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_varargs(&self) -> bool {
        self.access_flags & access::VARARGS != 0
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & access::STATIC != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ABSTRACT != 0
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & access::FINAL != 0
    }

    /// Compiler-generated members (bridges, lambdas, accessors) are not part of the API.
    pub fn is_synthetic(&self) -> bool {
        self.access_flags & (access::SYNTHETIC | access::BRIDGE) != 0 || self.name == "<clinit>"
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_flags(self.access_flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub access_flags: u16,
    /// Java name with `.` separators; nested classes use `.` as well (`java.util.Map.Entry`).
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub deprecated: bool,
    /// Non-empty for sealed classes.
    pub permitted_subclasses: Vec<String>,
}

impl ClassFile {
    pub fn simple_name(&self) -> &str {
        crate::types::simple_name(&self.name)
    }

    pub fn package(&self) -> &str {
        crate::types::package_of(&self.name)
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_flags(self.access_flags)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ABSTRACT != 0 && !self.is_interface()
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & access::FINAL != 0
    }

    pub fn is_sealed(&self) -> bool {
        !self.permitted_subclasses.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Non-synthetic methods named `name`; `<init>` selects constructors.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodInfo> + 'a {
        self.methods
            .iter()
            .filter(move |m| m.name == name && !m.is_synthetic())
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods_named("<init>")
    }

    /// Parses a class file. `origin` only names the class in error messages.
    pub fn parse(bytes: &[u8], origin: &str) -> Result<ClassFile, AnalysisError> {
        let class = cafebabe::parse_class(bytes).map_err(|e| AnalysisError::ClassFormat {
            name: origin.to_string(),
            reason: e.to_string(),
        })?;

        let fields = class
            .fields
            .iter()
            .map(|f| FieldInfo {
                access_flags: f.access_flags.bits(),
                name: f.name.to_string(),
                descriptor: descriptor::field_descriptor(&f.descriptor),
                java_type: descriptor::java_type(&f.descriptor),
                deprecated: Attributes::read(&f.attributes).deprecated,
            })
            .collect();
        let methods = class
            .methods
            .iter()
            .map(|m| {
                let attributes = Attributes::read(&m.attributes);
                MethodInfo {
                    access_flags: m.access_flags.bits(),
                    name: m.name.to_string(),
                    descriptor: descriptor::method_descriptor(&m.descriptor),
                    parameters: m.descriptor.parameters.iter().map(descriptor::java_type).collect(),
                    result: descriptor::java_result(&m.descriptor.return_type),
                    exceptions: attributes.exceptions,
                    deprecated: attributes.deprecated,
                }
            })
            .collect();
        let attributes = Attributes::read(&class.attributes);

        Ok(ClassFile {
            access_flags: class.access_flags.bits(),
            name: internal_to_java(&class.this_class.to_string()),
            super_name: class.super_class.as_ref().map(|s| internal_to_java(&s.to_string())),
            interfaces: class.interfaces.iter().map(|i| internal_to_java(&i.to_string())).collect(),
            fields,
            methods,
            deprecated: attributes.deprecated,
            permitted_subclasses: attributes.permitted_subclasses,
        })
    }
}

/// What the analysis reads from an attribute table. Other attributes are ignored.
#[derive(Default)]
struct Attributes {
    deprecated: bool,
    exceptions: Vec<String>,
    permitted_subclasses: Vec<String>,
}

impl Attributes {
    fn read(table: &[AttributeInfo]) -> Attributes {
        let mut attributes = Attributes::default();
        for attribute in table {
            match &attribute.data {
                AttributeData::Deprecated => attributes.deprecated = true,
                AttributeData::RuntimeVisibleAnnotations(annotations) => {
                    if annotations
                        .iter()
                        .any(|a| descriptor::field_descriptor(&a.type_descriptor) == DEPRECATED_ANNOTATION)
                    {
                        attributes.deprecated = true;
                    }
                }
                AttributeData::Exceptions(classes) => {
                    attributes.exceptions = classes.iter().map(|c| internal_to_java(&c.to_string())).collect();
                }
                AttributeData::PermittedSubclasses(classes) => {
                    attributes.permitted_subclasses =
                        classes.iter().map(|c| internal_to_java(&c.to_string())).collect();
                }
                _ => {}
            }
        }
        attributes
    }
}
