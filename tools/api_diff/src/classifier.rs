//! Decides what changed about the symbol behind an error.

use crate::model::{ClassDiff, CompatibilityChange, MethodDiff, ParameterChange};
use crate::{ApiDiff, DiffCache, DiffError};
use bump_core::{CompileError, ConflictType, ErrorLocation};
use code_analysis::bytecode::ClassPath;
use code_analysis::resolver::arguments_match;
use code_analysis::types;
use std::collections::BTreeSet;
use tracing::{debug, trace};

const MAX_SUPERCLASS_DEPTH: usize = 8;

impl CompatibilityChange {
    pub fn conflict_type(self) -> ConflictType {
        match self {
            CompatibilityChange::ClassRemoved => ConflictType::ClassRemoved,
            CompatibilityChange::ClassLessAccessible => ConflictType::ClassVisibilityChanged,
            CompatibilityChange::ClassNowAbstract => ConflictType::ClassNowAbstract,
            CompatibilityChange::ClassNowFinal => ConflictType::ClassNowFinal,
            CompatibilityChange::ClassNowDeprecated => ConflictType::ClassDeprecated,
            CompatibilityChange::SuperclassRemoved | CompatibilityChange::SuperclassChanged => {
                ConflictType::ClassSuperclassChanged
            }
            CompatibilityChange::InterfaceAdded | CompatibilityChange::InterfaceRemoved => {
                ConflictType::ClassInterfacesChanged
            }
            CompatibilityChange::MethodRemoved => ConflictType::MethodRemoved,
            CompatibilityChange::MethodLessAccessible => ConflictType::MethodVisibilityChanged,
            CompatibilityChange::MethodNowStatic => ConflictType::MethodChangedNonStaticToStatic,
            CompatibilityChange::MethodNoLongerStatic => ConflictType::MethodChangedStaticToNonStatic,
            CompatibilityChange::MethodNowAbstract => ConflictType::MethodNowAbstract,
            CompatibilityChange::MethodNowFinal => ConflictType::MethodNowFinal,
            CompatibilityChange::MethodNowDeprecated => ConflictType::MethodDeprecated,
            CompatibilityChange::MethodNowVoid => ConflictType::MethodChangedToVoid,
            CompatibilityChange::MethodNoLongerVoid => ConflictType::MethodChangedFromVoid,
            CompatibilityChange::MethodReturnTypeChanged => ConflictType::MethodReturnTypeChanged,
            CompatibilityChange::MethodExceptionsChanged => ConflictType::MethodExceptionsChanged,
        }
    }
}

pub fn is_override_message(message: &str) -> bool {
    message.contains("does not override or implement a method from a supertype")
}

pub fn is_final_class_message(message: &str) -> bool {
    message.contains("should be declared as final")
        || message.contains("should be declared final")
        || message.contains("sealed, non-sealed or final modifiers expected")
}

/// What the classifier found out about an error.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub conflicts: BTreeSet<ConflictType>,
    /// The class as found in a diff.
    pub class: Option<ClassDiff>,
    /// The member the error is about, when one was identified.
    pub method: Option<MethodDiff>,
    /// New qualified name of a moved class.
    pub alternative: Option<String>,
}

impl Classification {
    fn only(conflict: ConflictType) -> Classification {
        Classification {
            conflicts: BTreeSet::from([conflict]),
            ..Classification::default()
        }
    }

    pub fn has(&self, conflict: ConflictType) -> bool {
        self.conflicts.contains(&conflict)
    }
}

/// Among same-named members, the one a call with `actuals` most likely targets: members with the
/// call's arity, then the single one whose parameter types accept the arguments. With several
/// candidates of the right arity the first is taken; with none there is no answer.
pub fn infer_member<'a>(candidates: &[&'a MethodDiff], actuals: &[Option<String>]) -> Option<&'a MethodDiff> {
    let same_arity: Vec<&MethodDiff> = candidates
        .iter()
        .copied()
        .filter(|m| m.old.as_ref().or(m.new.as_ref()).is_some_and(|info| info.parameter_types().len() == actuals.len()))
        .collect();
    let compatible: Vec<&MethodDiff> = same_arity
        .iter()
        .copied()
        .filter(|m| {
            let formals = m.old_parameters();
            formals
                .iter()
                .zip(actuals)
                .all(|(f, a)| types::parameter_compatible(f, a.as_deref()))
        })
        .collect();
    match compatible.as_slice() {
        [only] => Some(*only),
        _ => same_arity.first().copied(),
    }
}

/// The member name a location refers to; constructors are `<init>`.
fn member_name<'a>(location: &'a ErrorLocation, class: &str) -> Option<&'a str> {
    let method = location.method()?;
    let is_constructor = method == types::simple_name(class)
        || method == types::simple_name(&location.class_name)
        || method == "<init>";
    Some(if is_constructor { "<init>" } else { method })
}

pub struct Classifier<'a> {
    diff: &'a ApiDiff,
    /// All dependency jars of the project, for classes outside the upgraded library.
    dependency_classes: &'a ClassPath,
    cache: &'a DiffCache,
}

impl<'a> Classifier<'a> {
    pub fn new(diff: &'a ApiDiff, dependency_classes: &'a ClassPath, cache: &'a DiffCache) -> Classifier<'a> {
        Classifier {
            diff,
            dependency_classes,
            cache,
        }
    }

    pub fn classify(&self, error: &CompileError, location: &ErrorLocation) -> Result<Classification, DiffError> {
        if is_override_message(&error.message) {
            return Ok(Classification::only(ConflictType::MethodNoLongerOverrides));
        }
        if is_final_class_message(&error.message) {
            return Ok(Classification::only(ConflictType::ParentClassSealed));
        }
        if location.has_class() && location.method().is_none() {
            let alternative = self.diff.find_alternative(&location.class_name);
            trace!("alternative for {}: {alternative:?}", location.class_name);
            let conflict = if alternative.is_some() {
                ConflictType::ClassMoved
            } else {
                ConflictType::ClassRemoved
            };
            return Ok(Classification {
                alternative,
                ..Classification::only(conflict)
            });
        }
        if location.is_unresolved() {
            return Ok(Classification::only(ConflictType::Unknown));
        }
        self.classify_member(error, location)
    }

    fn classify_member(&self, error: &CompileError, location: &ErrorLocation) -> Result<Classification, DiffError> {
        let fallback;
        let (diff, class) = match self.diff.class(&location.class_name) {
            Some(class) => (self.diff, class),
            None => {
                let Some(jar) = self.dependency_classes.jar_of(&location.class_name) else {
                    debug!("{} is in none of the jars", location.class_name);
                    return Ok(Classification::only(ConflictType::UnknownClass));
                };
                fallback = self.cache.self_diff(jar)?;
                match fallback.class(&location.class_name) {
                    Some(class) => (fallback.as_ref(), class),
                    None => return Ok(Classification::only(ConflictType::UnknownClass)),
                }
            }
        };
        let Some(name) = member_name(location, &class.name) else {
            return Ok(Classification::only(ConflictType::Unknown));
        };
        let Some(method) = find_member(diff, class, name, &location.parameter_types) else {
            debug!("no {name} on {} accepting {:?}", class.name, location.parameter_types);
            return Ok(Classification {
                class: Some(class.clone()),
                ..Classification::only(ConflictType::UnknownMethod)
            });
        };

        let mut conflicts: BTreeSet<ConflictType> = class
            .changes
            .iter()
            .chain(&method.changes)
            .map(|c| c.conflict_type())
            .collect();
        conflicts.extend(parameter_conflicts(method, &location.parameter_types));
        if error.message.contains("has been deprecated") && method.new.as_ref().is_some_and(|m| m.deprecated) {
            conflicts.insert(ConflictType::MethodDeprecated);
        }
        if conflicts.is_empty() {
            conflicts.insert(ConflictType::Unknown);
        }
        debug!("{}#{name}: {conflicts:?}", class.name);
        Ok(Classification {
            conflicts,
            class: Some(class.clone()),
            method: Some(method.clone()),
            alternative: None,
        })
    }
}

/// Finds the member `name` accepting `actuals` in `class` or, for inherited members, in its old
/// superclasses.
fn find_member<'d>(
    diff: &'d ApiDiff,
    class: &'d ClassDiff,
    name: &'d str,
    actuals: &[Option<String>],
) -> Option<&'d MethodDiff> {
    let mut current = Some(class);
    for _ in 0..MAX_SUPERCLASS_DEPTH {
        let class = current?;
        let found = class.methods_named(name).find(|m| {
            m.old.as_ref().is_some_and(|old| arguments_match(&old.parameter_types(), actuals, old.is_varargs()))
        });
        if found.is_some() {
            return found;
        }
        if name == "<init>" {
            return None;
        }
        current = class.old_superclass().and_then(|s| diff.class(s));
    }
    None
}

/// Parameter conflicts from the diff's parameter entries, plus those visible only when the
/// call's argument types are compared with the new formal types.
fn parameter_conflicts(method: &MethodDiff, actuals: &[Option<String>]) -> BTreeSet<ConflictType> {
    let mut conflicts: BTreeSet<ConflictType> = method
        .parameters
        .iter()
        .filter_map(|p| match p.change {
            ParameterChange::Added => Some(ConflictType::MethodParametersAdded),
            ParameterChange::Removed => Some(ConflictType::MethodParametersRemoved),
            ParameterChange::Modified => Some(ConflictType::MethodParameterTypesChanged),
            ParameterChange::Unchanged => None,
        })
        .collect();
    let Some(new) = &method.new else {
        return conflicts;
    };
    let formals = new.parameter_types();
    if formals.len() > actuals.len() {
        conflicts.insert(ConflictType::MethodParametersAdded);
    } else if formals.len() < actuals.len() && !new.is_varargs() {
        conflicts.insert(ConflictType::MethodParametersRemoved);
    }
    if formals
        .iter()
        .zip(actuals)
        .any(|(f, a)| !types::parameter_compatible(f, a.as_deref()))
    {
        conflicts.insert(ConflictType::MethodParameterTypesChanged);
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_analysis::bytecode::classfile::access;
    use code_analysis::bytecode::test_support::{ClassBuilder, write_jar};
    use std::path::Path;

    struct Fixture {
        _dir: tempfile::TempDir,
        diff: ApiDiff,
        dependencies: ClassPath,
        cache: DiffCache,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("lib-1.0.jar");
        let new = dir.path().join("lib-2.0.jar");
        write_jar(
            &old,
            vec![
                ClassBuilder::new("com/lib/Client")
                    .method(access::PUBLIC, "<init>", "()V")
                    .method(access::PUBLIC, "fetch", "(Ljava/lang/String;)Lcom/lib/Response;")
                    .method(access::PUBLIC, "close", "()V")
                    .method(access::PUBLIC, "size", "()I"),
                ClassBuilder::new("com/lib/Response"),
                ClassBuilder::new("com/lib/util/Helper"),
            ],
        );
        write_jar(
            &new,
            vec![
                ClassBuilder::new("com/lib/Client")
                    .method(access::PUBLIC, "<init>", "()V")
                    .method(access::PUBLIC, "fetch", "(Ljava/lang/String;I)Lcom/lib/Response;")
                    .method(access::PUBLIC | access::STATIC, "size", "()I"),
                ClassBuilder::new("com/lib/Response"),
                ClassBuilder::new("com/lib/tools/Helper"),
            ],
        );
        write_jar(
            &dir.path().join("deps/tool-1.0.jar"),
            vec![ClassBuilder::new("org/dep/Tool").method(access::PUBLIC, "run", "()V")],
        );
        let diff = ApiDiff::compute(&old, &new).unwrap();
        let dependencies = ClassPath::from_dir(&dir.path().join("deps")).unwrap();
        Fixture {
            _dir: dir,
            diff,
            dependencies,
            cache: DiffCache::new(),
        }
    }

    fn error(message: &str) -> CompileError {
        CompileError {
            file: Path::new("/project/src/Main.java").to_path_buf(),
            line: 3,
            column: 9,
            message: message.to_string(),
            import_related: false,
            details: Default::default(),
        }
    }

    fn call(class: &str, method: &str, parameters: &[&str]) -> ErrorLocation {
        ErrorLocation::new(
            class,
            Some(method.to_string()),
            parameters.iter().map(|p| Some(p.to_string())).collect(),
        )
    }

    fn classify(f: &Fixture, message: &str, location: &ErrorLocation) -> Classification {
        Classifier::new(&f.diff, &f.dependencies, &f.cache)
            .classify(&error(message), location)
            .unwrap()
    }

    #[test]
    fn added_parameter() {
        let f = fixture();
        let found = classify(&f, "method fetch in class Client cannot be applied", &call("com.lib.Client", "fetch", &["String"]));
        assert_eq!(found.conflicts, BTreeSet::from([ConflictType::MethodParametersAdded]));
        let method = found.method.unwrap();
        assert_eq!(method.new_parameters(), ["java.lang.String", "int"]);
    }

    #[test]
    fn removed_and_static_members() {
        let f = fixture();
        let removed = classify(&f, "cannot find symbol", &call("Client", "close", &[]));
        assert!(removed.has(ConflictType::MethodRemoved));
        let now_static = classify(&f, "cannot find symbol", &call("com.lib.Client", "size", &[]));
        assert_eq!(
            now_static.conflicts,
            BTreeSet::from([ConflictType::MethodChangedNonStaticToStatic])
        );
    }

    #[test]
    fn classes_moved_or_removed() {
        let f = fixture();
        let moved = classify(&f, "cannot find symbol", &ErrorLocation::class_only("com.lib.util.Helper"));
        assert_eq!(moved.conflicts, BTreeSet::from([ConflictType::ClassMoved]));
        assert_eq!(moved.alternative.as_deref(), Some("com.lib.tools.Helper"));
        let removed = classify(&f, "cannot find symbol", &ErrorLocation::class_only("com.lib.Gone"));
        assert_eq!(removed.conflicts, BTreeSet::from([ConflictType::ClassRemoved]));
    }

    #[test]
    fn messages_decide_before_locations() {
        let f = fixture();
        let location = call("com.lib.Client", "close", &[]);
        let overrides = classify(&f, "method does not override or implement a method from a supertype", &location);
        assert_eq!(overrides.conflicts, BTreeSet::from([ConflictType::MethodNoLongerOverrides]));
        let sealed = classify(&f, "Class Foo should be declared as final", &location);
        assert_eq!(sealed.conflicts, BTreeSet::from([ConflictType::ParentClassSealed]));
        let unknown = classify(&f, "illegal start of expression", &ErrorLocation::unresolved());
        assert_eq!(unknown.conflicts, BTreeSet::from([ConflictType::Unknown]));
    }

    #[test]
    fn unknown_class_and_method() {
        let f = fixture();
        let class = classify(&f, "cannot find symbol", &call("org.nowhere.Thing", "go", &[]));
        assert_eq!(class.conflicts, BTreeSet::from([ConflictType::UnknownClass]));
        let method = classify(&f, "cannot find symbol", &call("com.lib.Client", "missing", &[]));
        assert_eq!(method.conflicts, BTreeSet::from([ConflictType::UnknownMethod]));
        let arity = classify(&f, "cannot find symbol", &call("com.lib.Client", "close", &["int"]));
        assert_eq!(arity.conflicts, BTreeSet::from([ConflictType::UnknownMethod]));
    }

    #[test]
    fn other_dependencies_are_self_diffed() {
        let f = fixture();
        let found = classify(&f, "cannot find symbol", &call("org.dep.Tool", "run", &[]));
        assert_eq!(found.conflicts, BTreeSet::from([ConflictType::Unknown]));
        assert_eq!(found.class.map(|c| c.name).as_deref(), Some("org.dep.Tool"));
        assert_eq!(f.cache.len(), 1);
    }

    #[test]
    fn constructors_are_matched_by_class_name() {
        let f = fixture();
        let found = classify(&f, "cannot find symbol", &call("com.lib.Client", "Client", &[]));
        assert!(found.method.is_some_and(|m| m.is_constructor()));
    }

    #[test]
    fn inferred_member_prefers_matching_types() {
        let f = fixture();
        let client = f.diff.class("com.lib.Client").unwrap();
        let candidates: Vec<&MethodDiff> = client.methods_named("fetch").collect();
        let picked = infer_member(&candidates, &[Some("String".into())]).unwrap();
        assert_eq!(picked.name, "fetch");
        assert!(infer_member(&candidates, &[]).is_none());
    }
}
