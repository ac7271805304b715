//! Per-attempt mutable state of a fix run.

use crate::model::{CompileError, ProposedChange};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory layout of one project. Every path is below `root`, which is unique per project, so
/// concurrent projects never write to the same place.
#[derive(Debug, Clone)]
pub struct WorkingDirectories {
    pub root: PathBuf,
    /// Sources of the broken classes as extracted from the sandbox.
    pub broken_classes_dir: PathBuf,
    /// The project's source tree as extracted from the sandbox, indexed into the source model.
    pub sources_dir: PathBuf,
    /// `iteration_<n>/<stripped>_<Class>.java` for every class corrected in iteration `n`.
    pub fixed_classes_dir: PathBuf,
    /// `iteration_<n>.log` for every build.
    pub logs_dir: PathBuf,
    /// Old and new version of the upgraded dependency.
    pub jars_dir: PathBuf,
    /// All jars of the project's (transitive) dependencies.
    pub dependency_jars_dir: PathBuf,
    /// Cached text-completion responses.
    pub prompts_dir: PathBuf,
    /// Where the corrected classes of a fixed project end up.
    pub results_dir: PathBuf,
}

impl WorkingDirectories {
    /// Lays out the directories for `project_id` below `output`. Nothing is created on disk.
    pub fn new(output: &Path, project_id: &str) -> WorkingDirectories {
        let root = output.join("projects").join(project_id);
        WorkingDirectories {
            broken_classes_dir: root.join("broken_classes"),
            sources_dir: root.join("sources"),
            fixed_classes_dir: root.join("fixed_classes"),
            logs_dir: root.join("logs"),
            jars_dir: root.join("jars"),
            dependency_jars_dir: root.join("dependency_jars"),
            prompts_dir: root.join("prompts"),
            results_dir: output.join("results").join(project_id),
            root,
        }
    }

    /// Creates every directory except the results directory, which only exists for fixed projects.
    pub fn create_all(&self) -> io::Result<()> {
        for dir in [
            &self.root,
            &self.broken_classes_dir,
            &self.sources_dir,
            &self.fixed_classes_dir,
            &self.logs_dir,
            &self.jars_dir,
            &self.dependency_jars_dir,
            &self.prompts_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn iteration_dir(&self, iteration: usize) -> PathBuf {
        self.fixed_classes_dir.join(format!("iteration_{iteration}"))
    }

    pub fn log_path(&self, iteration: usize) -> PathBuf {
        self.logs_dir.join(format!("iteration_{iteration}.log"))
    }
}

/// A fix produced for some broken text, with the line it was produced for.
#[derive(Debug, Clone)]
struct CachedFix {
    change: ProposedChange,
    line: usize,
}

/// State of one fix attempt of one project.
///
/// A new `Context` is created for every retry. Within an attempt the iteration counter advances
/// once per recompile; the proposed changes and the broken-text cache only live for one
/// iteration because line numbers move once fixes are applied.
#[derive(Debug)]
pub struct Context {
    pub project: String,
    /// Prefix of every corrected class file name, unique per project.
    pub stripped_file_name: String,
    pub dirs: WorkingDirectories,
    pub iteration: usize,
    pub current_error: Option<CompileError>,
    /// File name (`Foo.java`) of the class the current error is in.
    pub current_class: Option<String>,
    pub proposed_changes: Vec<ProposedChange>,
    /// Class file names corrected at least once during this attempt.
    pub fixed_classes: BTreeSet<String>,
    memo: HashMap<String, CachedFix>,
}

impl Context {
    pub fn new(
        project: impl Into<String>,
        stripped_file_name: impl Into<String>,
        dirs: WorkingDirectories,
    ) -> Context {
        Context {
            project: project.into(),
            stripped_file_name: stripped_file_name.into(),
            dirs,
            iteration: 0,
            current_error: None,
            current_class: None,
            proposed_changes: Vec::new(),
            fixed_classes: BTreeSet::new(),
            memo: HashMap::new(),
        }
    }

    /// Sets the error being worked on.
    pub fn focus(&mut self, error: &CompileError) {
        self.current_class = Some(error.class_file_name());
        self.current_error = Some(error.clone());
    }

    fn stored_name(&self, class_file_name: &str) -> String {
        format!("{}_{}", self.stripped_file_name, class_file_name)
    }

    /// Where the sandbox copy of a broken class is stored.
    pub fn broken_class_path(&self, class_file_name: &str) -> PathBuf {
        self.dirs
            .broken_classes_dir
            .join(self.stored_name(class_file_name))
    }

    /// Where iteration `iteration` writes its corrected copy of a class.
    pub fn fixed_class_path(&self, iteration: usize, class_file_name: &str) -> PathBuf {
        self.dirs
            .iteration_dir(iteration)
            .join(self.stored_name(class_file_name))
    }

    /// The newest version of a class as seen by iteration `iteration`: the correction written by
    /// the closest earlier iteration, or the broken original if no iteration touched it yet.
    pub fn class_source_for(&self, iteration: usize, class_file_name: &str) -> PathBuf {
        (0..iteration)
            .rev()
            .map(|i| self.fixed_class_path(i, class_file_name))
            .find(|p| p.exists())
            .unwrap_or_else(|| self.broken_class_path(class_file_name))
    }

    /// The version of a class the current iteration reads its broken lines from.
    pub fn current_class_source(&self, class_file_name: &str) -> PathBuf {
        self.class_source_for(self.iteration, class_file_name)
    }

    /// Looks up a fix produced earlier in this iteration for the same trimmed broken text, moved
    /// to `line`.
    pub fn cached_fix(&self, broken_text: &str, line: usize) -> Option<ProposedChange> {
        let cached = self.memo.get(broken_text.trim())?;
        let delta = line as isize - cached.line as isize;
        Some(cached.change.shifted(delta))
    }

    /// Remembers `change` as the fix for `broken_text`, produced for an error at `line`.
    pub fn remember(&mut self, broken_text: &str, line: usize, change: &ProposedChange) {
        self.memo.insert(
            broken_text.trim().to_string(),
            CachedFix {
                change: change.clone(),
                line,
            },
        );
    }

    pub fn record(&mut self, change: ProposedChange) {
        self.proposed_changes.push(change);
    }

    /// Moves to the next iteration after a recompile, dropping per-iteration state.
    pub fn next_iteration(&mut self) {
        self.iteration += 1;
        self.proposed_changes.clear();
        self.memo.clear();
        self.current_error = None;
        self.current_class = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::tempdir;

    fn change(code: &str, start: usize, end: usize) -> ProposedChange {
        ProposedChange {
            class_name: "Foo.java".into(),
            code: code.into(),
            file: "Foo.java".into(),
            start,
            end,
        }
    }

    #[test]
    fn cached_fix_is_reused_at_new_line() {
        let dir = tempdir().unwrap();
        let mut ctx = Context::new("p", "abc", WorkingDirectories::new(dir.path(), "p"));
        ctx.remember("  obj.oldMethod();", 10, &change("obj.newMethod();", 10, 11));

        let reused = ctx.cached_fix("obj.oldMethod();   ", 42).unwrap();
        assert_eq!(reused.code, "obj.newMethod();");
        assert_eq!((reused.start, reused.end), (42, 43));
        assert!(ctx.cached_fix("obj.other();", 42).is_none());

        ctx.next_iteration();
        assert!(ctx.cached_fix("obj.oldMethod();", 42).is_none());
    }

    #[test]
    fn class_source_walks_back_through_iterations() {
        let dir = tempdir().unwrap();
        let dirs = WorkingDirectories::new(dir.path(), "p");
        dirs.create_all().unwrap();
        let mut ctx = Context::new("p", "abc", dirs);

        let broken = ctx.broken_class_path("Foo.java");
        assert_eq!(ctx.current_class_source("Foo.java"), broken);
        assert!(broken.ends_with("abc_Foo.java"));

        let first_fix = ctx.fixed_class_path(0, "Foo.java");
        fs::create_dir_all(first_fix.parent().unwrap()).unwrap();
        fs::write(&first_fix, "class Foo {}").unwrap();

        ctx.next_iteration();
        ctx.next_iteration();
        // Iteration 1 did not touch Foo, so iteration 2 reads iteration 0's output.
        assert_eq!(ctx.current_class_source("Foo.java"), first_fix);
        assert!(first_fix.to_string_lossy().contains("iteration_0"));
    }
}
