//! Helpers for Java type names as they appear in source, diagnostics and descriptors.

/// Type reported for lambda expressions. Any parameter declared in this package accepts it.
pub const FUNCTIONAL_INTERFACE_MARKER: &str = "java.util.function";

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";
pub const BOOLEAN: &str = "java.lang.Boolean";
pub const CHARACTER: &str = "java.lang.Character";
pub const BYTE: &str = "java.lang.Byte";
pub const SHORT: &str = "java.lang.Short";
pub const INTEGER: &str = "java.lang.Integer";
pub const LONG: &str = "java.lang.Long";
pub const FLOAT: &str = "java.lang.Float";
pub const DOUBLE: &str = "java.lang.Double";

const PRIMITIVES: [(&str, &str); 8] = [
    ("boolean", BOOLEAN),
    ("char", CHARACTER),
    ("byte", BYTE),
    ("short", SHORT),
    ("int", INTEGER),
    ("long", LONG),
    ("float", FLOAT),
    ("double", DOUBLE),
];

/// Maps a primitive name to its wrapper class; any other name is returned unchanged.
pub fn boxed(name: &str) -> String {
    let name = name.trim();
    PRIMITIVES
        .iter()
        .find(|(primitive, _)| *primitive == name)
        .map(|(_, wrapper)| wrapper.to_string())
        .unwrap_or_else(|| name.to_string())
}

pub fn is_primitive(name: &str) -> bool {
    PRIMITIVES.iter().any(|(p, _)| *p == name.trim()) || name.trim() == "void"
}

/// Whether `name` is a numeric primitive or its wrapper, in simple or qualified form.
pub fn is_numeric(name: &str) -> bool {
    let name = name.trim();
    matches!(
        simple_name(&boxed(name)),
        "Byte" | "Short" | "Integer" | "Long" | "Float" | "Double"
    )
}

/// Drops type arguments: `java.util.List<String>` becomes `java.util.List`. Array suffixes stay.
pub fn erase_generics(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// The part after the last `.` (or `$` for nested binary names).
pub fn simple_name(name: &str) -> &str {
    name.rsplit(['.', '$']).next().unwrap_or(name)
}

/// The package of a qualified name, or an empty string.
pub fn package_of(name: &str) -> &str {
    name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

/// Whether `formal` (a declared parameter type) accepts an argument of type `actual`.
///
/// An unknown actual type is accepted. Otherwise the formal type must end with the actual type
/// name, be `Object`, or be a functional interface receiving a lambda. Primitive names are boxed
/// before comparing, and type arguments are ignored.
pub fn parameter_compatible(formal: &str, actual: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return true;
    };
    let formal = boxed(&erase_generics(formal));
    let actual = boxed(&erase_generics(actual));
    if formal == OBJECT || formal == "Object" {
        return true;
    }
    if actual == FUNCTIONAL_INTERFACE_MARKER {
        return formal == FUNCTIONAL_INTERFACE_MARKER
            || formal.starts_with(&format!("{FUNCTIONAL_INTERFACE_MARKER}."));
    }
    formal.ends_with(&actual)
}

/// Parses the comma separated parameter list of a diagnostic, e.g. `int,java.lang.String`, into
/// boxed type names. `no arguments` yields an empty list.
pub fn parse_parameter_list(list: &str) -> Vec<Option<String>> {
    let list = list.trim();
    if list.is_empty() || list == "no arguments" {
        return Vec::new();
    }
    crate::brackets::split_top_level(list, b',')
        .into_iter()
        .map(|(_, p)| p.trim())
        .map(|p| if p.is_empty() { None } else { Some(boxed(p)) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxing_and_erasure() {
        assert_eq!(boxed("int"), INTEGER);
        assert_eq!(boxed("com.x.Foo"), "com.x.Foo");
        assert_eq!(erase_generics("Map<String, List<Integer>>[]"), "Map[]");
        assert_eq!(simple_name("com.x.Outer$Inner"), "Inner");
        assert_eq!(package_of("com.x.Foo"), "com.x");
        assert!(is_numeric("long") && is_numeric("java.lang.Double") && !is_numeric("String"));
    }

    #[test]
    fn compatibility_rules() {
        assert!(parameter_compatible("java.lang.String", Some("String")));
        assert!(parameter_compatible("int", Some(INTEGER)));
        assert!(parameter_compatible("java.lang.Object", Some("com.x.Foo")));
        assert!(parameter_compatible("java.util.function.Function", Some(FUNCTIONAL_INTERFACE_MARKER)));
        assert!(parameter_compatible("com.x.Foo", None));
        assert!(!parameter_compatible("java.lang.String", Some(INTEGER)));
        assert!(!parameter_compatible("java.lang.Runnable", Some(FUNCTIONAL_INTERFACE_MARKER)));
    }

    #[test]
    fn diagnostic_parameter_lists() {
        assert_eq!(
            parse_parameter_list("int,java.lang.String"),
            [Some(INTEGER.to_string()), Some(STRING.to_string())]
        );
        assert!(parse_parameter_list("no arguments").is_empty());
        assert_eq!(
            parse_parameter_list("java.util.Map<K,V>,long"),
            [Some("java.util.Map<K,V>".to_string()), Some(LONG.to_string())]
        );
    }
}
