use super::*;
use bump_core::Details;
use code_analysis::bytecode::ClassPath;
use code_analysis::source_model::SourceModel;
use code_analysis::types::{INTEGER, STRING};
use providers::imported_class;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const WIDGET: &str = "package app;

import com.lib.Client;

public class Widget extends Base {
    private Client client;

    Widget(String name) {
        super(name, 3);
        client.fetch(name).body();
    }

    @Override
    public String render(final List<String> items, int depth) {
        return name;
    }
}
";

fn resolver() -> TypeResolver {
    TypeResolver::new(
        Arc::new(SourceModel::default()),
        Arc::new(ClassPath::empty()),
        Arc::new(ClassPath::empty()),
    )
}

fn source(dir: &Path) -> PathBuf {
    let path = dir.join("Widget.java");
    fs::write(&path, WIDGET).unwrap();
    path
}

fn error(message: &str, line: usize, column: usize, details: &[(&str, &str)]) -> CompileError {
    CompileError {
        file: "/project/src/main/java/app/Widget.java".into(),
        line,
        column,
        message: message.into(),
        import_related: false,
        details: details.iter().copied().collect::<Details>(),
    }
}

fn locate(error: &CompileError, code: &str) -> Option<Located> {
    let dir = tempfile::tempdir().unwrap();
    let class_file = source(dir.path());
    let resolver = resolver();
    let site = Site {
        resolver: &resolver,
        class_file: &class_file,
        class_name: "Widget",
    };
    let broken = BrokenCode::new(code, error.line, error.line);
    ErrorLocator::default().locate(error, &broken, &site).unwrap()
}

#[test]
fn missing_method_from_symbol_details() {
    let e = error(
        "cannot find symbol",
        10,
        15,
        &[("symbol", "method foo(int,java.lang.String)"), ("location", "class Bar")],
    );
    let located = locate(&e, "        bar.foo(1, \"s\");").unwrap();
    assert_eq!(located.provider, "cannot_find_symbol");
    assert_eq!(
        located.location,
        ErrorLocation::new(
            "Bar",
            Some("foo".into()),
            vec![Some(INTEGER.into()), Some(STRING.into())]
        )
    );
}

#[test]
fn missing_symbol_kinds() {
    let e = error(
        "cannot find symbol",
        3,
        17,
        &[("symbol", "class Client"), ("location", "package com.lib")],
    );
    assert_eq!(locate(&e, "import com.lib.Client;").unwrap().location, ErrorLocation::class_only("Client"));

    let e = error(
        "cannot find symbol",
        10,
        15,
        &[("symbol", "method body()"), ("location", "variable response of type com.lib.Response<String>")],
    );
    let location = locate(&e, "x").unwrap().location;
    assert_eq!(location.class_name, "com.lib.Response");
    assert_eq!(location.method(), Some("body"));

    // A declared variable resolves to its type, an undeclared one is taken as a class name.
    let e = error("cannot find symbol", 10, 9, &[("symbol", "variable client")]);
    assert_eq!(locate(&e, "x").unwrap().location, ErrorLocation::class_only("Client"));
    let e = error("cannot find symbol", 10, 9, &[("symbol", "variable Constants")]);
    assert_eq!(locate(&e, "x").unwrap().location, ErrorLocation::class_only("Constants"));
}

#[test]
fn constructor_mismatch_uses_found_types() {
    let e = error(
        "constructor Baz(String) in class com.example.Baz cannot be applied to given types;",
        10,
        20,
        &[("required", "java.lang.String"), ("found", "java.lang.Integer")],
    );
    let located = locate(&e, "        Baz b = new Baz(5);").unwrap();
    assert_eq!(located.provider, "constructor_type");
    assert_eq!(
        located.location,
        ErrorLocation::new("com.example.Baz", Some("Baz".into()), vec![Some(INTEGER.into())])
    );
}

#[test]
fn final_class_messages_locate_the_class() {
    let e = error("Class Widget should be declared as final", 5, 8, &[]);
    let located = locate(&e, "public class Widget extends Base {").unwrap();
    assert_eq!(located.provider, "declaration");
    assert_eq!(located.location, ErrorLocation::class_only("Widget"));

    // Without a class in the message, the broken class is meant.
    let e = error("sealed, non-sealed or final modifiers expected", 5, 8, &[]);
    assert_eq!(
        locate(&e, "public class Widget extends Base {").unwrap().location,
        ErrorLocation::class_only("Widget")
    );
}

#[test]
fn stale_override_locates_the_annotated_method() {
    let e = error("method does not override or implement a method from a supertype", 13, 5, &[]);
    let located = locate(&e, "    @Override").unwrap();
    assert_eq!(located.provider, "declaration");
    assert_eq!(
        located.location,
        ErrorLocation::new(
            "Widget",
            Some("render".into()),
            vec![Some("List<String>".into()), Some("int".into())]
        )
    );
}

#[test]
fn deprecated_member() {
    let e = error("[deprecation] close(int) in com.lib.Client has been deprecated", 10, 9, &[]);
    let located = locate(&e, "        client.close(1);").unwrap();
    assert_eq!(located.provider, "deprecation");
    assert_eq!(
        located.location,
        ErrorLocation::new("com.lib.Client", Some("close".into()), vec![Some(INTEGER.into())])
    );
}

#[test]
fn calls_fall_through_to_the_chain_analyzer() {
    let code = "        client.fetch(name).body();";
    let column = code.find(".body").unwrap() + 1;
    let e = error("method body in class Response cannot be applied", 10, column, &[]);
    let located = locate(&e, code).unwrap();
    assert_eq!(located.provider, "method_chain");
    // `Client.fetch` is not on the class path, so the chain stops there. `name` keeps the type
    // name as written in its declaration.
    assert_eq!(
        located.location,
        ErrorLocation::new("Client", Some("fetch".into()), vec![Some("String".into())])
    );
}

#[test]
fn super_calls_target_the_parent_constructor() {
    let e = error("no suitable constructor found for Base(String,int)", 9, 9, &[]);
    let located = locate(&e, "        super(name, 3);").unwrap();
    assert_eq!(located.provider, "super");
    assert_eq!(
        located.location,
        ErrorLocation::new("Base", Some("Base".into()), vec![Some("String".into()), Some(INTEGER.into())])
    );
}

#[test]
fn incompatible_types_keep_only_the_required_type() {
    let e = error("incompatible types: java.lang.String cannot be converted to int", 10, 9, &[]);
    let located = locate(&e, "        int x = label;").unwrap();
    assert_eq!(located.provider, "type_cast");
    assert_eq!(located.location, ErrorLocation::new("", None, vec![Some("int".into())]));
}

#[test]
fn imports_and_uncategorized_errors() {
    let e = error("package com.lib does not exist", 3, 15, &[]);
    let located = locate(&e, "import com.lib.Client;").unwrap();
    assert_eq!(located.provider, "import");
    assert_eq!(located.location, ErrorLocation::class_only("Client"));

    assert!(locate(&e, "import com.lib.*;").is_none());
    assert!(locate(&error("unreachable statement", 10, 9, &[]), "        break;").is_none());

    assert_eq!(imported_class("import static com.lib.Util.make;").as_deref(), Some("com.lib.Util"));
    assert_eq!(imported_class("important();"), None);
}

#[test]
fn providers_are_asked_in_order() {
    // Both a deprecation message and a call: the deprecation provider comes first.
    let e = error("get() in com.lib.Client has been deprecated", 10, 9, &[]);
    assert_eq!(locate(&e, "        client.get();").unwrap().provider, "deprecation");

    let only_chain = ErrorLocator::new(vec![Box::new(MethodChain)]);
    let dir = tempfile::tempdir().unwrap();
    let class_file = source(dir.path());
    let resolver = resolver();
    let site = Site {
        resolver: &resolver,
        class_file: &class_file,
        class_name: "Widget",
    };
    let broken = BrokenCode::new("        client.get();", 10, 10);
    assert_eq!(only_chain.locate(&e, &broken, &site).unwrap().unwrap().provider, "method_chain");
}
