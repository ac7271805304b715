//! Builds projects inside containers.
//!
//! A breaking update ships as a container image whose default command builds the project. The
//! repair loop creates a container from it, copies corrected sources in, runs the build, and
//! reads the log back. Files (sources, dependency jars) are copied out of a container the same
//! way.

pub mod docker;
pub mod mock;

pub use docker::DockerSandbox;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no such container: {0}")]
    UnknownContainer(String),
    #[error("{path} not found in container {container}")]
    MissingFile { container: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Container {
    pub id: String,
}

pub trait BuildSandbox: Send + Sync {
    /// Creates a container from `image` without starting it.
    fn create(&self, image: &str) -> Result<Container, SandboxError>;

    /// Runs the container's build to completion.
    fn start(&self, container: &Container) -> Result<(), SandboxError>;

    fn create_and_run(&self, image: &str) -> Result<Container, SandboxError> {
        let container = self.create(image)?;
        self.start(&container)?;
        Ok(container)
    }

    /// Everything the container printed so far.
    fn stream_logs(&self, container: &Container) -> Result<String, SandboxError>;

    /// Copies `local` over the file at `remote`, an absolute path inside the container.
    fn replace_file(&self, container: &Container, local: &Path, remote: &str) -> Result<(), SandboxError>;

    /// Reads the file at `remote`, an absolute path inside the container.
    fn extract_file(&self, container: &Container, remote: &str) -> Result<Vec<u8>, SandboxError>;

    fn remove(&self, container: &Container) -> Result<(), SandboxError>;
}
