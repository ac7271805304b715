//! A class path made of jar files, indexed by class name and parsed lazily.

use super::classfile::ClassFile;
use super::descriptor::internal_to_java;
use crate::AnalysisError;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// All `*.jar` files under `dir`, sorted by path. A missing directory has no jars.
pub fn jar_files(dir: &Path) -> Vec<PathBuf> {
    let mut jars: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jar"))
        .collect();
    jars.sort();
    jars
}

#[derive(Debug, Clone)]
struct Entry {
    jar: usize,
    path: String,
}

#[derive(Debug, Default)]
pub struct ClassPath {
    jars: Vec<PathBuf>,
    /// Java class name (`com.x.Outer.Inner`) to its jar entry. The first jar wins on duplicates.
    entries: BTreeMap<String, Entry>,
    parsed: DashMap<String, Arc<ClassFile>>,
}

impl ClassPath {
    pub fn empty() -> ClassPath {
        ClassPath::default()
    }

    /// Indexes every jar under `dir`.
    pub fn from_dir(dir: &Path) -> Result<ClassPath, AnalysisError> {
        ClassPath::from_jars(jar_files(dir))
    }

    pub fn from_jars(jars: Vec<PathBuf>) -> Result<ClassPath, AnalysisError> {
        let mut entries = BTreeMap::new();
        for (index, jar) in jars.iter().enumerate() {
            let archive = open(jar)?;
            for name in archive.file_names() {
                let Some(internal) = name.strip_suffix(".class") else {
                    continue;
                };
                if internal.ends_with("module-info") || internal.ends_with("package-info") {
                    continue;
                }
                // Multi-release jars repeat classes under META-INF/versions; the base entry is used.
                if internal.starts_with("META-INF/") {
                    continue;
                }
                entries
                    .entry(internal_to_java(internal))
                    .or_insert_with(|| Entry {
                        jar: index,
                        path: name.to_string(),
                    });
            }
        }
        debug!("indexed {} classes from {} jars", entries.len(), jars.len());
        Ok(ClassPath {
            jars,
            entries,
            parsed: DashMap::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn jars(&self) -> &[PathBuf] {
        &self.jars
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The qualified name of the class `name` refers to. An exact match wins; otherwise the first
    /// class whose name ends with `.name`, so `Widget` and `example.Widget` both find
    /// `com.example.Widget` but `idget` does not.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        let name = name.trim().trim_start_matches('.');
        if name.is_empty() {
            return None;
        }
        if let Some((key, _)) = self.entries.get_key_value(name) {
            return Some(key);
        }
        let suffix = format!(".{name}");
        self.entries
            .keys()
            .find(|k| k.ends_with(&suffix))
            .map(String::as_str)
    }

    /// The jar the class `name` refers to is read from.
    pub fn jar_of(&self, name: &str) -> Option<&Path> {
        let qualified = self.resolve_name(name)?;
        Some(&self.jars[self.entries[qualified].jar])
    }

    /// Every class whose simple name is `simple`.
    pub fn classes_named<'a>(&'a self, simple: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .keys()
            .filter(move |k| crate::types::simple_name(k) == simple)
            .map(String::as_str)
    }

    /// Loads and parses the class `name` refers to (see [`ClassPath::resolve_name`]). Unreadable
    /// classes are logged and treated as absent.
    pub fn find(&self, name: &str) -> Option<Arc<ClassFile>> {
        let qualified = self.resolve_name(name)?;
        if let Some(class) = self.parsed.get(qualified) {
            return Some(Arc::clone(&class));
        }
        match self.read(qualified) {
            Ok(class) => {
                let class = Arc::new(class);
                self.parsed
                    .insert(qualified.to_string(), Arc::clone(&class));
                Some(class)
            }
            Err(e) => {
                warn!("skipping {qualified}: {e}");
                None
            }
        }
    }

    fn read(&self, qualified: &str) -> Result<ClassFile, AnalysisError> {
        let entry = &self.entries[qualified];
        let jar = &self.jars[entry.jar];
        let mut archive = open(jar)?;
        let mut file = archive
            .by_name(&entry.path)
            .map_err(|source| AnalysisError::Jar {
                path: jar.clone(),
                source,
            })?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)
            .map_err(|e| AnalysisError::io(jar, e))?;
        ClassFile::parse(&bytes, qualified)
    }
}

fn open(jar: &Path) -> Result<zip::ZipArchive<File>, AnalysisError> {
    let file = File::open(jar).map_err(|e| AnalysisError::io(jar, e))?;
    zip::ZipArchive::new(file).map_err(|source| AnalysisError::Jar {
        path: jar.to_path_buf(),
        source,
    })
}
