//! The breaking-update dataset: one JSON record per project whose build broke after a dependency
//! upgrade.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakingUpdate {
    /// Commit of the client that upgrades the dependency; names the breaking image.
    pub breaking_commit: String,
    pub project: String,
    pub updated_dependency: UpdatedDependency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedDependency {
    #[serde(rename = "dependencyGroupID")]
    pub group_id: String,
    #[serde(rename = "dependencyArtifactID")]
    pub artifact_id: String,
    pub previous_version: String,
    pub new_version: String,
}

impl UpdatedDependency {
    pub fn jar_name(&self, version: &str) -> String {
        format!("{}-{version}.jar", self.artifact_id)
    }

    /// Where Maven keeps the jar of `version` below the repository root `m2`.
    pub fn repository_path(&self, m2: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/{version}/{}",
            m2.trim_end_matches('/'),
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.jar_name(version)
        )
    }
}

impl BreakingUpdate {
    /// Names the project's working directories.
    pub fn id(&self) -> &str {
        &self.breaking_commit
    }
}

fn records(path: &Path) -> Result<Vec<BreakingUpdate>, Box<dyn Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    let records = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>(),
        single => serde_json::from_value(single).map(|r| vec![r]),
    };
    records.map_err(|e| format!("{}: {e}", path.display()).into())
}

/// Loads the dataset at `input`: a JSON file holding one record or an array of them, or a
/// directory of such files, read in path order.
pub fn load(input: &Path) -> Result<Vec<BreakingUpdate>, Box<dyn Error>> {
    if !input.is_dir() {
        return records(input);
    }
    let mut updates = Vec::new();
    let files = WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.map_err(|e| warn!("skipping dataset entry: {e}")).ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"));
    for entry in files {
        updates.extend(records(entry.path())?);
    }
    debug!("loaded {} breaking updates from {}", updates.len(), input.display());
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bump_core::test_util::tempdir;

    const RECORD: &str = r#"{
        "breakingCommit": "0a1b2c3d",
        "project": "client-app",
        "url": "https://example.org/client-app/pull/1",
        "updatedDependency": {
            "dependencyGroupID": "com.lib",
            "dependencyArtifactID": "lib-core",
            "previousVersion": "1.0",
            "newVersion": "2.0"
        }
    }"#;

    #[test]
    fn single_records_and_arrays() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.json"), RECORD).unwrap();
        fs::write(
            dir.path().join("nested/b.json"),
            format!("[{}, {}]", RECORD, RECORD.replace("0a1b2c3d", "ffff")),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a record").unwrap();

        let updates = load(dir.path()).unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].id(), "0a1b2c3d");
        assert_eq!(updates[2].id(), "ffff");
        assert_eq!(updates[0].updated_dependency.artifact_id, "lib-core");

        let file = load(&dir.path().join("a.json")).unwrap();
        assert_eq!(file, updates[..1]);
    }

    #[test]
    fn jar_paths() {
        let update: BreakingUpdate = serde_json::from_str(RECORD).unwrap();
        let dependency = &update.updated_dependency;
        assert_eq!(dependency.jar_name("2.0"), "lib-core-2.0.jar");
        assert_eq!(
            dependency.repository_path("/root/.m2/repository/", "1.0"),
            "/root/.m2/repository/com/lib/lib-core/1.0/lib-core-1.0.jar"
        );
    }

    #[test]
    fn malformed_records_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"project": "x"}"#).unwrap();
        let error = load(&path).unwrap_err().to_string();
        assert!(error.contains("bad.json"), "{error}");
    }
}
