//! An in-memory [`BuildSandbox`] for tests.
//!
//! Every container starts with the same image files. A build is a function from the
//! container's files to the log it prints, so a test can decide whether a repaired source
//! compiles.

use crate::{BuildSandbox, Container, SandboxError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub type Files = BTreeMap<String, Vec<u8>>;
type Build = dyn Fn(&Files) -> String + Send + Sync;

pub const SUCCESS_LOG: &str = "[INFO] BUILD SUCCESS\n";

struct MockContainer {
    image: String,
    files: Files,
    log: String,
}

pub struct MockSandbox {
    image_files: Files,
    build: Box<Build>,
    containers: Mutex<HashMap<String, MockContainer>>,
    next_id: AtomicUsize,
    /// Every build run, as (image, files at start).
    history: Mutex<Vec<(String, Files)>>,
}

impl MockSandbox {
    /// A sandbox whose builds always succeed.
    pub fn new(image_files: Files) -> MockSandbox {
        MockSandbox::with_build(image_files, |_| SUCCESS_LOG.to_string())
    }

    pub fn with_build(image_files: Files, build: impl Fn(&Files) -> String + Send + Sync + 'static) -> MockSandbox {
        MockSandbox {
            image_files,
            build: Box::new(build),
            containers: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Number of builds run so far.
    pub fn builds(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Files of the `n`th build.
    pub fn build_files(&self, n: usize) -> Option<Files> {
        self.history.lock().ok()?.get(n).map(|(_, files)| files.clone())
    }

    pub fn live_containers(&self) -> usize {
        self.containers.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn with_container<T>(
        &self,
        container: &Container,
        f: impl FnOnce(&mut MockContainer) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        let mut containers = self
            .containers
            .lock()
            .map_err(|_| SandboxError::UnknownContainer(container.id.clone()))?;
        let entry = containers
            .get_mut(&container.id)
            .ok_or_else(|| SandboxError::UnknownContainer(container.id.clone()))?;
        f(entry)
    }
}

impl BuildSandbox for MockSandbox {
    fn create(&self, image: &str) -> Result<Container, SandboxError> {
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let container = MockContainer {
            image: image.to_string(),
            files: self.image_files.clone(),
            log: String::new(),
        };
        if let Ok(mut containers) = self.containers.lock() {
            containers.insert(id.clone(), container);
        }
        Ok(Container { id })
    }

    fn start(&self, container: &Container) -> Result<(), SandboxError> {
        let (image, files) = self.with_container(container, |c| {
            let log = (self.build)(&c.files);
            c.log.push_str(&log);
            Ok((c.image.clone(), c.files.clone()))
        })?;
        if let Ok(mut history) = self.history.lock() {
            history.push((image, files));
        }
        Ok(())
    }

    fn stream_logs(&self, container: &Container) -> Result<String, SandboxError> {
        self.with_container(container, |c| Ok(c.log.clone()))
    }

    fn replace_file(&self, container: &Container, local: &Path, remote: &str) -> Result<(), SandboxError> {
        let bytes = std::fs::read(local).map_err(|source| SandboxError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        self.with_container(container, |c| {
            c.files.insert(remote.to_string(), bytes);
            Ok(())
        })
    }

    fn extract_file(&self, container: &Container, remote: &str) -> Result<Vec<u8>, SandboxError> {
        self.with_container(container, |c| {
            c.files
                .get(remote)
                .cloned()
                .ok_or_else(|| SandboxError::MissingFile {
                    container: container.id.clone(),
                    path: remote.to_string(),
                })
        })
    }

    fn remove(&self, container: &Container) -> Result<(), SandboxError> {
        self.containers
            .lock()
            .map_err(|_| SandboxError::UnknownContainer(container.id.clone()))?
            .remove(&container.id)
            .map(|_| ())
            .ok_or_else(|| SandboxError::UnknownContainer(container.id.clone()))
    }
}
