//! Structural comparison of the classes in two jars.

use crate::DiffError;
use crate::model::{
    ChangeStatus, ClassDiff, CompatibilityChange, MethodDiff, ParameterChange, ParameterDiff,
};
use code_analysis::bytecode::{ClassFile, ClassPath, MethodInfo, Visibility};
use code_analysis::types;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// All classes of one jar, parsed.
#[derive(Debug, Default)]
pub struct JarApi {
    pub path: PathBuf,
    pub classes: BTreeMap<String, Arc<ClassFile>>,
}

impl JarApi {
    /// Reads every class of `jar`. Class files that cannot be parsed are skipped.
    pub fn load(jar: &Path) -> Result<JarApi, DiffError> {
        if !jar.is_file() {
            return Err(DiffError::MissingJar(jar.to_path_buf()));
        }
        let class_path = ClassPath::from_jars(vec![jar.to_path_buf()])?;
        let classes = class_path
            .class_names()
            .filter_map(|name| class_path.find(name).map(|c| (name.to_string(), c)))
            .collect();
        Ok(JarApi {
            path: jar.to_path_buf(),
            classes,
        })
    }
}

/// Every class of two library versions and how it changed.
#[derive(Debug, Default)]
pub struct ApiDiff {
    pub old_jar: PathBuf,
    pub new_jar: PathBuf,
    classes: BTreeMap<String, ClassDiff>,
}

impl ApiDiff {
    /// Compares the jars at `old` and `new`.
    pub fn compute(old: &Path, new: &Path) -> Result<ApiDiff, DiffError> {
        let old = JarApi::load(old)?;
        let new = JarApi::load(new)?;
        Ok(ApiDiff::between(&old, &new))
    }

    /// Compares `jar` with itself: every class is unchanged. Used to look up the structure of a
    /// class that is not part of the upgraded library.
    pub fn self_diff(jar: &Path) -> Result<ApiDiff, DiffError> {
        let api = JarApi::load(jar)?;
        Ok(ApiDiff::between(&api, &api))
    }

    pub fn between(old: &JarApi, new: &JarApi) -> ApiDiff {
        let names: BTreeSet<&String> = old.classes.keys().chain(new.classes.keys()).collect();
        let classes: BTreeMap<String, ClassDiff> = names
            .into_iter()
            .map(|name| {
                let diff = diff_class(name, old.classes.get(name), new.classes.get(name));
                (name.clone(), diff)
            })
            .collect();
        debug!(
            "diffed {} classes of {} and {}",
            classes.len(),
            old.path.display(),
            new.path.display()
        );
        ApiDiff {
            old_jar: old.path.clone(),
            new_jar: new.path.clone(),
            classes,
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDiff> {
        self.classes.values()
    }

    /// The class `name` refers to in the old version: an exact name, or the first class whose
    /// name ends with `.name`.
    pub fn class(&self, name: &str) -> Option<&ClassDiff> {
        let name = types::erase_generics(name);
        if let Some(class) = self.classes.get(&name).filter(|c| c.old.is_some()) {
            return Some(class);
        }
        let suffix = format!(".{name}");
        self.classes
            .values()
            .find(|c| c.old.is_some() && c.name.ends_with(&suffix))
    }

    /// Where a class the new version no longer has under its old name went: a class of the new
    /// version with the same simple name in another package. Among several, the one sharing the
    /// longest package prefix with the old name wins, then the alphabetically first.
    pub fn find_alternative(&self, name: &str) -> Option<String> {
        let name = types::erase_generics(name);
        let old_package = self
            .class(&name)
            .map(|c| types::package_of(&c.name).to_string())
            .or_else(|| name.contains('.').then(|| types::package_of(&name).to_string()));
        let simple = types::simple_name(&name);
        self.classes
            .values()
            .filter(|c| c.new.is_some() && types::simple_name(&c.name) == simple)
            .filter(|c| old_package.as_deref() != Some(types::package_of(&c.name)))
            .map(|c| {
                let shared = common_prefix_segments(
                    old_package.as_deref().unwrap_or(""),
                    types::package_of(&c.name),
                );
                (shared, &c.name)
            })
            // Longest shared prefix first, then by name.
            .min_by(|(a, a_name), (b, b_name)| b.cmp(a).then_with(|| a_name.cmp(b_name)))
            .map(|(_, name)| name.clone())
    }
}

fn common_prefix_segments(a: &str, b: &str) -> usize {
    a.split('.')
        .zip(b.split('.'))
        .take_while(|(x, y)| !x.is_empty() && x == y)
        .count()
}

fn diff_class(name: &str, old: Option<&Arc<ClassFile>>, new: Option<&Arc<ClassFile>>) -> ClassDiff {
    let mut changes = Vec::new();
    let status = match (old, new) {
        (Some(_), None) => {
            changes.push(CompatibilityChange::ClassRemoved);
            ChangeStatus::Removed
        }
        (None, _) => ChangeStatus::New,
        (Some(old), Some(new)) => {
            class_changes(old, new, &mut changes);
            ChangeStatus::Unchanged
        }
    };
    let methods = diff_methods(
        old.map(|c| c.methods.as_slice()).unwrap_or_default(),
        new.map(|c| c.methods.as_slice()).unwrap_or_default(),
    );
    let status = if status == ChangeStatus::Unchanged
        && (!changes.is_empty() || methods.iter().any(|m| m.status != ChangeStatus::Unchanged))
    {
        ChangeStatus::Modified
    } else {
        status
    };
    ClassDiff {
        name: name.to_string(),
        status,
        old: old.cloned(),
        new: new.cloned(),
        changes,
        methods,
    }
}

fn class_changes(old: &ClassFile, new: &ClassFile, changes: &mut Vec<CompatibilityChange>) {
    if new.visibility() < old.visibility() {
        changes.push(CompatibilityChange::ClassLessAccessible);
    }
    if new.is_abstract() && !old.is_abstract() {
        changes.push(CompatibilityChange::ClassNowAbstract);
    }
    if new.is_final() && !old.is_final() {
        changes.push(CompatibilityChange::ClassNowFinal);
    }
    if new.deprecated && !old.deprecated {
        changes.push(CompatibilityChange::ClassNowDeprecated);
    }
    match (&old.super_name, &new.super_name) {
        (Some(_), None) => changes.push(CompatibilityChange::SuperclassRemoved),
        (Some(a), Some(b)) if a != b => changes.push(CompatibilityChange::SuperclassChanged),
        _ => {}
    }
    if old.interfaces.iter().any(|i| !new.interfaces.contains(i)) {
        changes.push(CompatibilityChange::InterfaceRemoved);
    }
    if new.interfaces.iter().any(|i| !old.interfaces.contains(i)) {
        changes.push(CompatibilityChange::InterfaceAdded);
    }
}

/// Pairs the methods of both versions: same name and descriptor first, then remaining members
/// of the same name, closest arity first.
fn diff_methods(old: &[MethodInfo], new: &[MethodInfo]) -> Vec<MethodDiff> {
    let old: Vec<&MethodInfo> = old.iter().filter(|m| !m.is_synthetic()).collect();
    let new: Vec<&MethodInfo> = new.iter().filter(|m| !m.is_synthetic()).collect();
    let mut new_taken = vec![false; new.len()];
    let mut pairs: Vec<(Option<&MethodInfo>, Option<&MethodInfo>)> = Vec::new();
    let mut unmatched_old = Vec::new();

    for m in &old {
        let same = new
            .iter()
            .enumerate()
            .position(|(i, n)| !new_taken[i] && n.name == m.name && n.descriptor == m.descriptor);
        match same {
            Some(i) => {
                new_taken[i] = true;
                pairs.push((Some(*m), Some(new[i])));
            }
            None => unmatched_old.push(*m),
        }
    }
    for m in unmatched_old {
        let arity = m.parameter_types().len();
        let closest = new
            .iter()
            .enumerate()
            .filter(|(i, n)| !new_taken[*i] && n.name == m.name)
            .min_by_key(|(_, n)| n.parameter_types().len().abs_diff(arity))
            .map(|(i, _)| i);
        match closest {
            Some(i) => {
                new_taken[i] = true;
                pairs.push((Some(m), Some(new[i])));
            }
            None => pairs.push((Some(m), None)),
        }
    }
    for (i, n) in new.iter().enumerate() {
        if !new_taken[i] {
            pairs.push((None, Some(*n)));
        }
    }
    pairs
        .into_iter()
        .map(|(old, new)| diff_method(old, new))
        .collect()
}

fn diff_method(old: Option<&MethodInfo>, new: Option<&MethodInfo>) -> MethodDiff {
    let mut changes = Vec::new();
    let mut parameters = Vec::new();
    let status = match (old, new) {
        (Some(old), None) => {
            if old.visibility() != Visibility::Private {
                changes.push(CompatibilityChange::MethodRemoved);
            }
            ChangeStatus::Removed
        }
        (None, _) => ChangeStatus::New,
        (Some(old), Some(new)) => {
            method_changes(old, new, &mut changes);
            parameters = diff_parameters(&old.parameter_types(), &new.parameter_types());
            let parameters_changed = parameters.iter().any(|p| p.change != ParameterChange::Unchanged);
            if changes.is_empty() && !parameters_changed {
                ChangeStatus::Unchanged
            } else {
                ChangeStatus::Modified
            }
        }
    };
    let name = old.or(new).map(|m| m.name.clone()).unwrap_or_default();
    MethodDiff {
        name,
        status,
        old: old.cloned(),
        new: new.cloned(),
        changes,
        parameters,
    }
}

fn method_changes(old: &MethodInfo, new: &MethodInfo, changes: &mut Vec<CompatibilityChange>) {
    if new.visibility() < old.visibility() {
        changes.push(CompatibilityChange::MethodLessAccessible);
    }
    if new.is_static() && !old.is_static() {
        changes.push(CompatibilityChange::MethodNowStatic);
    }
    if old.is_static() && !new.is_static() {
        changes.push(CompatibilityChange::MethodNoLongerStatic);
    }
    if new.is_abstract() && !old.is_abstract() {
        changes.push(CompatibilityChange::MethodNowAbstract);
    }
    if new.is_final() && !old.is_final() {
        changes.push(CompatibilityChange::MethodNowFinal);
    }
    if new.deprecated && !old.deprecated {
        changes.push(CompatibilityChange::MethodNowDeprecated);
    }
    let (old_ret, new_ret) = (old.return_type(), new.return_type());
    if old_ret != new_ret {
        changes.push(match (old_ret.as_deref(), new_ret.as_deref()) {
            (_, Some("void")) => CompatibilityChange::MethodNowVoid,
            (Some("void"), _) => CompatibilityChange::MethodNoLongerVoid,
            _ => CompatibilityChange::MethodReturnTypeChanged,
        });
    }
    let old_exceptions: BTreeSet<&String> = old.exceptions.iter().collect();
    let new_exceptions: BTreeSet<&String> = new.exceptions.iter().collect();
    if old_exceptions != new_exceptions {
        changes.push(CompatibilityChange::MethodExceptionsChanged);
    }
    // A member only visible to the library itself cannot break clients.
    if old.visibility() == Visibility::Private {
        changes.clear();
    }
}

/// Aligns two parameter lists on their longest common subsequence. Unaligned old and new types
/// at the same position become a modification; the rest are removals and additions.
fn diff_parameters(old: &[String], new: &[String]) -> Vec<ParameterDiff> {
    let (n, m) = (old.len(), new.len());
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    let mut removed: Vec<&String> = Vec::new();
    let mut added: Vec<&String> = Vec::new();
    let flush = |removed: &mut Vec<&String>, added: &mut Vec<&String>, out: &mut Vec<ParameterDiff>| {
        let paired = removed.len().min(added.len());
        for k in 0..paired {
            out.push(ParameterDiff {
                change: ParameterChange::Modified,
                old_type: Some(removed[k].clone()),
                new_type: Some(added[k].clone()),
            });
        }
        for r in &removed[paired..] {
            out.push(ParameterDiff {
                change: ParameterChange::Removed,
                old_type: Some((*r).clone()),
                new_type: None,
            });
        }
        for a in &added[paired..] {
            out.push(ParameterDiff {
                change: ParameterChange::Added,
                old_type: None,
                new_type: Some((*a).clone()),
            });
        }
        removed.clear();
        added.clear();
    };
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            flush(&mut removed, &mut added, &mut out);
            out.push(ParameterDiff {
                change: ParameterChange::Unchanged,
                old_type: Some(old[i].clone()),
                new_type: Some(new[j].clone()),
            });
            i += 1;
            j += 1;
        } else if j < m && (i == n || lcs[i][j + 1] >= lcs[i + 1][j]) {
            added.push(&new[j]);
            j += 1;
        } else {
            removed.push(&old[i]);
            i += 1;
        }
    }
    flush(&mut removed, &mut added, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn changes(diffs: &[ParameterDiff]) -> Vec<ParameterChange> {
        diffs.iter().map(|p| p.change).collect()
    }

    #[test]
    fn parameter_alignment() {
        use ParameterChange::*;
        let added = diff_parameters(&strings(&["java.lang.String"]), &strings(&["int", "java.lang.String"]));
        assert_eq!(changes(&added), [Added, Unchanged]);
        assert_eq!(added[0].new_type.as_deref(), Some("int"));

        let removed = diff_parameters(&strings(&["int", "long"]), &strings(&["int"]));
        assert_eq!(changes(&removed), [Unchanged, Removed]);

        let modified = diff_parameters(&strings(&["int", "long"]), &strings(&["int", "java.time.Duration"]));
        assert_eq!(changes(&modified), [Unchanged, Modified]);
        assert_eq!(modified[1].old_type.as_deref(), Some("long"));

        assert!(diff_parameters(&[], &[]).is_empty());
    }

    #[test]
    fn shared_package_prefix() {
        assert_eq!(common_prefix_segments("com.lib.http", "com.lib.net"), 2);
        assert_eq!(common_prefix_segments("", "com.lib"), 0);
        assert_eq!(common_prefix_segments("org.a", "com.a"), 0);
    }

    #[test]
    fn jar_versions_are_compared_member_by_member() {
        use code_analysis::bytecode::classfile::access;
        use code_analysis::bytecode::test_support::{ClassBuilder, write_jar};

        let dir = tempfile::tempdir().unwrap();
        let (old, new) = (dir.path().join("a-1.jar"), dir.path().join("a-2.jar"));
        write_jar(
            &old,
            vec![
                ClassBuilder::new("org/a/Parser")
                    .method(access::PUBLIC, "parse", "(Ljava/lang/String;)Lorg/a/Node;")
                    .method(access::PRIVATE, "helper", "()V")
                    .method(access::PUBLIC, "reset", "()V"),
                ClassBuilder::new("org/a/Node"),
            ],
        );
        write_jar(
            &new,
            vec![
                ClassBuilder::new("org/a/Parser")
                    .access(access::PUBLIC | access::FINAL)
                    .method(access::PUBLIC, "parse", "(Ljava/lang/String;)Ljava/util/Optional;")
                    .method(access::PUBLIC, "reset", "()V"),
                ClassBuilder::new("org/a/tree/Node"),
            ],
        );
        let diff = ApiDiff::compute(&old, &new).unwrap();

        let parser = diff.class("Parser").unwrap();
        assert_eq!(parser.status, ChangeStatus::Modified);
        assert_eq!(parser.changes, [CompatibilityChange::ClassNowFinal]);
        let parse = parser.methods_named("parse").next().unwrap();
        assert_eq!(parse.changes, [CompatibilityChange::MethodReturnTypeChanged]);
        let report = crate::MethodReport { class: &parser.name, method: parse }.to_string();
        assert!(report.starts_with("Method modified in org.a.Parser"), "{report}");
        assert!(report.contains("return type changed"), "{report}");
        assert!(parser.methods_named("helper").next().unwrap().changes.is_empty());
        assert_eq!(parser.methods_named("reset").next().unwrap().status, ChangeStatus::Unchanged);

        assert_eq!(diff.class("org.a.Node").unwrap().status, ChangeStatus::Removed);
        assert!(diff.class("org.a.tree.Node").is_none());
        assert_eq!(diff.find_alternative("org.a.Node").as_deref(), Some("org.a.tree.Node"));
        assert_eq!(diff.find_alternative("org.a.Parser"), None);

        let missing = ApiDiff::compute(&dir.path().join("absent.jar"), &new);
        assert!(matches!(missing, Err(DiffError::MissingJar(_))));
    }

    #[test]
    fn cache_shares_computed_diffs() {
        use code_analysis::bytecode::test_support::{ClassBuilder, write_jar};

        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("b-1.jar");
        write_jar(&jar, vec![ClassBuilder::new("org/b/Thing")]);
        let cache = crate::DiffCache::new();
        let first = cache.self_diff(&jar).unwrap();
        let second = cache.get_or_compute(&jar, &jar).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.class("Thing").unwrap().status, ChangeStatus::Unchanged);
    }
}
