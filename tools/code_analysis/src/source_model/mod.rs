//! An index of the classes declared in a Java source tree.
//!
//! Built with tree-sitter, which recovers from syntax errors, so a tree that does not compile
//! still yields every declaration the parser could make sense of.

mod cache;

pub use cache::SourceModelCache;

use crate::AnalysisError;
use crate::types;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};
use walkdir::WalkDir;

/// Superclass hops followed when a member is not declared on the class itself.
const MAX_HIERARCHY_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    /// `None` for constructors.
    pub return_type: Option<String>,
    pub parameter_types: Vec<String>,
    pub is_varargs: bool,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub qualified_name: String,
    pub simple_name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub constructors: Vec<MethodDecl>,
    pub file: PathBuf,
}

impl ClassDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDecl> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }
}

#[derive(Debug, Default)]
pub struct SourceModel {
    classes: Vec<ClassDecl>,
}

impl SourceModel {
    /// Parses every `*.java` file below `dir`. Files that cannot be read are skipped with a
    /// warning; a missing directory gives an empty model.
    pub fn build(dir: &Path) -> Result<SourceModel, AnalysisError> {
        let mut parser = java_parser()?;
        let mut classes = Vec::new();
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "java"))
            .collect();
        files.sort();
        for file in &files {
            match fs::read_to_string(file) {
                Ok(source) => classes.extend(parse_file(&mut parser, &source, file)),
                Err(e) => warn!("skipping {}: {e}", file.display()),
            }
        }
        debug!(
            "indexed {} classes from {} files under {}",
            classes.len(),
            files.len(),
            dir.display()
        );
        Ok(SourceModel { classes })
    }

    /// Builds a model from in-memory sources.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a Path, &'a str)>,
    ) -> Result<SourceModel, AnalysisError> {
        let mut parser = java_parser()?;
        let classes = sources
            .into_iter()
            .flat_map(|(file, source)| parse_file(&mut parser, source, file))
            .collect();
        Ok(SourceModel { classes })
    }

    pub fn classes(&self) -> &[ClassDecl] {
        &self.classes
    }

    /// Finds a class by qualified name, by a dotted suffix of it, or by simple name, in that order.
    pub fn find_class(&self, name: &str) -> Option<&ClassDecl> {
        let name = types::erase_generics(name);
        if name.is_empty() {
            return None;
        }
        let suffix = format!(".{name}");
        let simple = types::simple_name(&name);
        self.classes
            .iter()
            .find(|c| c.qualified_name == name)
            .or_else(|| self.classes.iter().find(|c| c.qualified_name.ends_with(&suffix)))
            .or_else(|| self.classes.iter().find(|c| c.simple_name == simple))
    }

    /// `class` followed by its source-declared superclasses.
    fn hierarchy<'a>(&'a self, class: &str) -> impl Iterator<Item = &'a ClassDecl> + 'a {
        let mut next = self.find_class(class);
        std::iter::from_fn(move || {
            let current = next?;
            next = current
                .superclass
                .as_deref()
                .and_then(|s| self.find_class(s))
                .filter(|s| s.qualified_name != current.qualified_name);
            Some(current)
        })
        .take(MAX_HIERARCHY_DEPTH)
    }

    /// Declared type (simple name, type arguments dropped) of `field` in `class` or one of its
    /// source-declared superclasses.
    pub fn field_type(&self, class: &str, field: &str) -> Option<String> {
        self.hierarchy(class)
            .find_map(|c| c.field(field))
            .map(|f| types::simple_name(&types::erase_generics(&f.type_name)).to_string())
    }

    /// Return type of the first method named `method` in `class` or its source-declared
    /// superclasses. Overloads are not told apart.
    pub fn method_return_type(&self, class: &str, method: &str) -> Option<String> {
        self.hierarchy(class)
            .find_map(|c| c.methods_named(method).next())
            .and_then(|m| m.return_type.clone())
    }

    /// The outermost class declared in `file`.
    pub fn class_in_file(&self, file: &Path) -> Option<&ClassDecl> {
        self.classes
            .iter()
            .filter(|c| c.file == file)
            .min_by_key(|c| c.qualified_name.matches('.').count())
    }
}

fn java_parser() -> Result<Parser, AnalysisError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::language())
        .map_err(|e| AnalysisError::Parse(e.to_string()))?;
    Ok(parser)
}

fn parse_file(parser: &mut Parser, source: &str, file: &Path) -> Vec<ClassDecl> {
    let Some(tree) = parser.parse(source, None) else {
        warn!("tree-sitter gave up on {}", file.display());
        return Vec::new();
    };
    let mut walker = Walker {
        source: source.as_bytes(),
        file,
        classes: Vec::new(),
    };
    let root = tree.root_node();
    let package = walker.package(root);
    walker.declarations(root, package.as_deref());
    walker.classes
}

const TYPE_DECLARATIONS: [&str; 4] = [
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

struct Walker<'a> {
    source: &'a [u8],
    file: &'a Path,
    classes: Vec<ClassDecl>,
}

impl Walker<'_> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().trim().to_string()
    }

    fn package(&self, root: Node) -> Option<String> {
        let mut cursor = root.walk();
        let declaration = root
            .children(&mut cursor)
            .find(|c| c.kind() == "package_declaration")?;
        let mut cursor = declaration.walk();
        let name = declaration
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))?;
        Some(self.text(name))
    }

    /// Collects type declarations directly below `node`, recursing into their bodies.
    fn declarations(&mut self, node: Node, prefix: Option<&str>) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            if TYPE_DECLARATIONS.contains(&child.kind()) {
                self.type_declaration(child, prefix);
            } else if child.kind() == "enum_body_declarations" {
                self.declarations(child, prefix);
            }
        }
    }

    fn type_declaration(&mut self, node: Node, prefix: Option<&str>) {
        let Some(simple_name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return;
        };
        let qualified_name = match prefix {
            Some(p) if !p.is_empty() => format!("{p}.{simple_name}"),
            _ => simple_name.clone(),
        };
        let superclass = node
            .child_by_field_name("superclass")
            .and_then(|s| s.named_child(0))
            .map(|t| self.text(t));
        let interfaces = node
            .child_by_field_name("interfaces")
            .map(|i| self.type_list(i))
            .unwrap_or_default();

        let mut class = ClassDecl {
            qualified_name: qualified_name.clone(),
            simple_name,
            superclass,
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            file: self.file.to_path_buf(),
        };

        if let Some(body) = node.child_by_field_name("body") {
            let mut members: Vec<Node> = Vec::new();
            let mut cursor = body.walk();
            for child in body.named_children(&mut cursor) {
                if child.kind() == "enum_body_declarations" {
                    let mut inner = child.walk();
                    members.extend(child.named_children(&mut inner));
                } else {
                    members.push(child);
                }
            }
            for member in members {
                match member.kind() {
                    "field_declaration" | "constant_declaration" => self.fields(member, &mut class),
                    "method_declaration" => {
                        if let Some(method) = self.method(member) {
                            class.methods.push(method);
                        }
                    }
                    "constructor_declaration" | "compact_constructor_declaration" => {
                        if let Some(constructor) = self.method(member) {
                            class.constructors.push(constructor);
                        }
                    }
                    kind if TYPE_DECLARATIONS.contains(&kind) => {
                        self.type_declaration(member, Some(&qualified_name));
                    }
                    _ => {}
                }
            }
        }
        self.classes.push(class);
    }

    /// Type names of an `extends`/`implements` clause.
    fn type_list(&self, clause: Node) -> Vec<String> {
        let mut cursor = clause.walk();
        let mut names = Vec::new();
        for child in clause.named_children(&mut cursor) {
            if child.kind() == "type_list" {
                let mut inner = child.walk();
                names.extend(child.named_children(&mut inner).map(|t| self.text(t)));
            } else {
                names.push(self.text(child));
            }
        }
        names
    }

    fn fields(&self, node: Node, class: &mut ClassDecl) {
        let Some(type_name) = node.child_by_field_name("type").map(|t| self.text(t)) else {
            return;
        };
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            if let Some(name) = declarator.child_by_field_name("name") {
                // `int[] a, b[];` puts extra dimensions on the declarator.
                let dims = declarator
                    .child_by_field_name("dimensions")
                    .map(|d| self.text(d))
                    .unwrap_or_default();
                class.fields.push(FieldDecl {
                    name: self.text(name),
                    type_name: format!("{type_name}{dims}"),
                });
            }
        }
    }

    fn method(&self, node: Node) -> Option<MethodDecl> {
        let name = self.text(node.child_by_field_name("name")?);
        let return_type = node.child_by_field_name("type").map(|t| self.text(t));
        let mut parameter_types = Vec::new();
        let mut is_varargs = false;
        if let Some(parameters) = node.child_by_field_name("parameters") {
            let mut cursor = parameters.walk();
            for parameter in parameters.named_children(&mut cursor) {
                match parameter.kind() {
                    "formal_parameter" => {
                        if let Some(t) = parameter.child_by_field_name("type") {
                            let dims = parameter
                                .child_by_field_name("dimensions")
                                .map(|d| self.text(d))
                                .unwrap_or_default();
                            parameter_types.push(format!("{}{dims}", self.text(t)));
                        }
                    }
                    "spread_parameter" => {
                        is_varargs = true;
                        let text = self.text(parameter);
                        let declared = text.split("...").next().unwrap_or_default();
                        // Drop annotations and `final`.
                        let type_name = declared
                            .split_whitespace()
                            .filter(|w| !w.starts_with('@') && *w != "final")
                            .collect::<Vec<_>>()
                            .join(" ");
                        parameter_types.push(format!("{type_name}[]"));
                    }
                    _ => {}
                }
            }
        }
        Some(MethodDecl {
            name,
            return_type,
            parameter_types,
            is_varargs,
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGET: &str = r#"
package com.example;

import java.util.List;

public class Widget extends Base implements Comparable<Widget>, java.io.Serializable {
    private final List<String> names;
    int count, total[];
    public static final String LABEL = "w";

    public Widget(String name, int... sizes) {
        this.names = List.of(name);
    }

    public Helper helper() { return new Helper(); }

    public int size(int extra) {
        return count + extra;
    }

    static class Helper {
        String describe() { return "h"; }
    }
}
"#;

    const BASE: &str = r#"
package com.example;

abstract class Base {
    protected Registry registry;
    public Registry registry() { return registry; }
}
"#;

    fn model() -> SourceModel {
        SourceModel::from_sources([
            (Path::new("src/com/example/Widget.java"), WIDGET),
            (Path::new("src/com/example/Base.java"), BASE),
        ])
        .unwrap()
    }

    #[test]
    fn indexes_classes_and_members() {
        let model = model();
        let widget = model.find_class("com.example.Widget").unwrap();
        assert_eq!(widget.superclass.as_deref(), Some("Base"));
        assert_eq!(widget.interfaces, ["Comparable<Widget>", "java.io.Serializable"]);
        assert_eq!(widget.field("total").unwrap().type_name, "int[]");
        assert_eq!(widget.constructors.len(), 1);
        assert!(widget.constructors[0].is_varargs);
        assert_eq!(widget.constructors[0].parameter_types, ["String", "int[]"]);

        let size = widget.methods_named("size").next().unwrap();
        assert_eq!(size.parameter_types, ["int"]);
        assert_eq!((size.start_line, size.end_line), (17, 19));

        let helper = model.find_class("Widget.Helper").unwrap();
        assert_eq!(helper.qualified_name, "com.example.Widget.Helper");
        assert!(model.find_class("Helper").is_some());
    }

    #[test]
    fn looks_up_members_through_source_hierarchy() {
        let model = model();
        assert_eq!(model.field_type("Widget", "names").as_deref(), Some("List"));
        assert_eq!(model.field_type("Widget", "registry").as_deref(), Some("Registry"));
        assert_eq!(model.method_return_type("Widget", "helper").as_deref(), Some("Helper"));
        assert_eq!(model.method_return_type("com.example.Widget", "registry").as_deref(), Some("Registry"));
        assert_eq!(model.method_return_type("Widget", "missing"), None);
        assert_eq!(model.field_type("Unknown", "names"), None);
    }

    #[test]
    fn builds_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("com/example");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("Widget.java"), WIDGET).unwrap();
        fs::write(pkg.join("notes.txt"), "not java").unwrap();
        let model = SourceModel::build(dir.path()).unwrap();
        assert_eq!(model.classes().len(), 2);
        assert!(model.class_in_file(&pkg.join("Widget.java")).is_some());
        assert!(SourceModel::build(&dir.path().join("missing")).unwrap().classes().is_empty());
    }
}
