//! [`BuildSandbox`] on top of the `docker` command line client.

use crate::{BuildSandbox, Container, SandboxError};
use bump_core::config::SandboxConfig;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, trace};
use wait_timeout::ChildExt;

/// Timeout for the short bookkeeping commands (`create`, `cp`, `rm`).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

pub struct DockerSandbox {
    docker: String,
    /// Upper bound for one build.
    build_timeout: Duration,
}

struct Finished {
    success: bool,
    stdout: String,
    stderr: String,
}

impl DockerSandbox {
    pub fn new(config: &SandboxConfig) -> DockerSandbox {
        DockerSandbox {
            docker: config.docker.clone(),
            build_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Runs `docker <args>`, killing it after `timeout`. Output goes to temporary files so a
    /// chatty build cannot fill a pipe and stall.
    fn run(&self, args: &[OsString], timeout: Duration) -> Result<Finished, SandboxError> {
        let command = format!(
            "{} {}",
            self.docker,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        trace!("running {command}");
        let spawn_error = |source| SandboxError::Spawn {
            program: self.docker.clone(),
            source,
        };
        let mut stdout = tempfile::tempfile().map_err(spawn_error)?;
        let mut stderr = tempfile::tempfile().map_err(spawn_error)?;
        let mut child = Command::new(&self.docker)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout.try_clone().map_err(spawn_error)?)
            .stderr(stderr.try_clone().map_err(spawn_error)?)
            .spawn()
            .map_err(spawn_error)?;

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SandboxError::Timeout {
                    command,
                    secs: timeout.as_secs(),
                });
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_error(e));
            }
        };
        Ok(Finished {
            success: status.success(),
            stdout: read_all(&mut stdout).map_err(spawn_error)?,
            stderr: read_all(&mut stderr).map_err(spawn_error)?,
        })
    }

    /// Like [`DockerSandbox::run`], but a non-zero exit status is an error.
    fn checked(&self, args: &[OsString]) -> Result<String, SandboxError> {
        let finished = self.run(args, COMMAND_TIMEOUT)?;
        if !finished.success {
            return Err(SandboxError::Command {
                command: format!("{} {}", self.docker, args[0].to_string_lossy()),
                stderr: finished.stderr.trim().to_string(),
            });
        }
        Ok(finished.stdout)
    }
}

fn read_all(file: &mut File) -> std::io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn args<const N: usize>(items: [&str; N]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}

impl BuildSandbox for DockerSandbox {
    fn create(&self, image: &str) -> Result<Container, SandboxError> {
        let id = self.checked(&args(["create", image]))?.trim().to_string();
        debug!("created container {id} from {image}");
        Ok(Container { id })
    }

    fn start(&self, container: &Container) -> Result<(), SandboxError> {
        info!("building in container {}", container.id);
        // A failing build exits non-zero; the log tells what went wrong.
        let finished = self.run(&args(["start", "--attach", &container.id]), self.build_timeout)?;
        debug!(
            "container {} finished, success: {}",
            container.id, finished.success
        );
        Ok(())
    }

    fn stream_logs(&self, container: &Container) -> Result<String, SandboxError> {
        let finished = self.run(&args(["logs", &container.id]), COMMAND_TIMEOUT)?;
        if !finished.success {
            return Err(SandboxError::UnknownContainer(container.id.clone()));
        }
        // Maven prints to stdout; the JVM may add warnings on stderr.
        Ok(finished.stdout + &finished.stderr)
    }

    fn replace_file(&self, container: &Container, local: &Path, remote: &str) -> Result<(), SandboxError> {
        let mut cp = args(["cp"]);
        cp.push(local.as_os_str().to_owned());
        cp.push(format!("{}:{remote}", container.id).into());
        self.checked(&cp)?;
        trace!("copied {} to {}:{remote}", local.display(), container.id);
        Ok(())
    }

    fn extract_file(&self, container: &Container, remote: &str) -> Result<Vec<u8>, SandboxError> {
        let dir = tempfile::tempdir().map_err(|source| SandboxError::Spawn {
            program: self.docker.clone(),
            source,
        })?;
        let target = dir.path().join("extracted");
        let mut cp = args(["cp", &format!("{}:{remote}", container.id)]);
        cp.push(target.as_os_str().to_owned());
        let finished = self.run(&cp, COMMAND_TIMEOUT)?;
        if !finished.success {
            return Err(SandboxError::MissingFile {
                container: container.id.clone(),
                path: remote.to_string(),
            });
        }
        std::fs::read(&target).map_err(|source| SandboxError::Io {
            path: target.clone(),
            source,
        })
    }

    fn remove(&self, container: &Container) -> Result<(), SandboxError> {
        self.checked(&args(["rm", "--force", &container.id]))?;
        debug!("removed container {}", container.id);
        Ok(())
    }
}
