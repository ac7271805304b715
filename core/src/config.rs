//! Run configuration. Loading (file layering and command-line overrides) lives in the `fix`
//! binary; this module only defines the shape and its validation.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration of a fix run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Dataset of breaking updates: a JSON file, or a directory of JSON files.
    pub input: PathBuf,

    /// Directory receiving working directories, results and summaries.
    pub output: PathBuf,

    /// Erase the output directory if it is not empty.
    #[serde(default)]
    pub force: bool,

    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,

    /// Recompile rounds per attempt.
    pub max_iterations: usize,

    /// Fresh restarts of a project's attempt after the iterations are exhausted.
    pub max_retries: usize,

    /// Projects processed at the same time.
    pub concurrency: usize,

    /// Directory of jars holding the Java platform classes (`java.lang.String` and friends).
    #[serde(default)]
    pub platform_jars_dir: Option<PathBuf>,

    /// Local directory searched for `<artifact>-<version>.jar` before asking the sandbox.
    #[serde(default)]
    pub jar_cache_dir: Option<PathBuf>,

    pub sandbox: SandboxConfig,

    /// Per-tool sub-configuration, deserialized by the tool that owns it.
    #[serde(default)]
    pub tools: HashMap<String, Value>,

    #[serde(flatten)]
    pub unknown: HashMap<String, Value>,
}

/// Settings of the container-based build sandbox.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Name or path of the docker binary.
    pub docker: String,
    /// Image to build a breaking update in; `{commit}` is replaced by the breaking commit.
    pub image_template: String,
    /// Upper bound for one build, in seconds.
    pub timeout_secs: u64,
    /// Local maven repository inside the image.
    pub m2_repository: String,

    #[serde(flatten)]
    pub unknown: HashMap<String, Value>,
}

impl SandboxConfig {
    pub fn image_for(&self, commit: &str) -> String {
        self.image_template.replace("{commit}", commit)
    }
}

impl Config {
    /// Warns about every key nobody reads.
    pub fn validate(&self) {
        unknown_field_warning("", &self.unknown);
        unknown_field_warning("sandbox", &self.sandbox.unknown);
    }

    pub fn platform_jars_dir(&self) -> Option<&Path> {
        self.platform_jars_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn jar_cache_dir(&self) -> Option<&Path> {
        self.jar_cache_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// A configuration for tests, with no LLM tools configured.
    pub fn mock() -> Config {
        Config {
            input: PathBuf::from("dataset.json"),
            output: PathBuf::from("out"),
            force: false,
            log_filter: "off".into(),
            max_iterations: 3,
            max_retries: 1,
            concurrency: 1,
            platform_jars_dir: None,
            jar_cache_dir: None,
            sandbox: SandboxConfig {
                docker: "docker".into(),
                image_template: "breaking-updates:{commit}-breaking".into(),
                timeout_secs: 60,
                m2_repository: "/root/.m2/repository".into(),
                unknown: HashMap::new(),
            },
            tools: HashMap::new(),
            unknown: HashMap::new(),
        }
    }
}

/// Prints out a warning message for every field in `unknown`.
///
/// `prefix` is the path to the table being validated (e.g. `tools.llm_solver`), or empty for the
/// top level.
pub fn unknown_field_warning(prefix: &str, unknown: &HashMap<String, Value>) {
    let mut entries: Vec<_> = unknown.keys().collect();
    entries.sort_unstable();
    entries.into_iter().for_each(|name| match prefix {
        "" => tracing::warn!("unknown config key {name}"),
        p => tracing::warn!("unknown config key {p}.{name}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_template_substitutes_commit() {
        let config = Config::mock();
        assert_eq!(
            config.sandbox.image_for("0a1b2c"),
            "breaking-updates:0a1b2c-breaking"
        );
    }

    #[test]
    fn empty_paths_count_as_unset() {
        let mut config = Config::mock();
        config.platform_jars_dir = Some(PathBuf::new());
        assert!(config.platform_jars_dir().is_none());
        config.platform_jars_dir = Some(PathBuf::from("/opt/jdk/jars"));
        assert_eq!(
            config.platform_jars_dir(),
            Some(Path::new("/opt/jdk/jars"))
        );
    }

    #[test]
    fn deserializes_with_unknown_keys() {
        let value = serde_json::json!({
            "input": "in.json",
            "output": "out",
            "log_filter": "info",
            "max_iterations": 3,
            "max_retries": 2,
            "concurrency": 4,
            "surprise": true,
            "sandbox": {
                "docker": "docker",
                "image_template": "img:{commit}",
                "timeout_secs": 10,
                "m2_repository": "/root/.m2/repository"
            },
            "tools": { "llm_solver": { "model": "m" } }
        });
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(config.unknown.contains_key("surprise"));
        assert!(config.tools.contains_key("llm_solver"));
        assert_eq!(config.max_retries, 2);
    }
}
