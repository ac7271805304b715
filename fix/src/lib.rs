//! Repairs Java projects whose build broke after a dependency upgrade. This is normally used
//! through the `bump-fix` binary, but is exposed as a library crate as well.

pub mod apply;
pub mod cli;
pub mod dataset;
mod pipeline;
mod runner;

pub use pipeline::{ErrorAnalysis, FixRecord, Outcome, ProjectReport, Services};
pub use runner::Summary;

use bump_core::config::Config;
use std::error::Error;
use tracing::info;

/// Repairs every breaking update of the dataset at `config.input`.
pub fn fix(config: &Config) -> Result<Summary, Box<dyn Error>> {
    let updates = dataset::load(&config.input)?;
    info!("{} breaking updates in {}", updates.len(), config.input.display());
    let services = Services::from_config(config)?;
    runner::run(config, &services, &updates)
}

/// Locates and classifies the compile errors of every breaking update without repairing them.
pub fn analyze(config: &Config) -> Result<(), Box<dyn Error>> {
    let updates = dataset::load(&config.input)?;
    let services = Services::from_config(config)?;
    runner::analyze(config, &services, &updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_diff::DiffCache;
    use build_sandbox::mock::{Files, MockSandbox, SUCCESS_LOG};
    use bump_core::test_util::{MockCompletion, tempdir};
    use code_analysis::bytecode::ClassPath;
    use code_analysis::bytecode::classfile::access;
    use code_analysis::bytecode::test_support::{ClassBuilder, write_jar};
    use code_analysis::source_model::SourceModelCache;
    use conflict_solvers::llm_solver::Ranker;
    use dataset::{BreakingUpdate, UpdatedDependency};
    use error_location::ErrorLocator;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    const MAIN_PATH: &str = "/app/src/main/java/com/app/Main.java";
    const BROKEN_CALL: &str = "client.fetch(name);";
    const MAIN: &str = "package com.app;

import com.lib.Client;

public class Main {
    void run(Client client, String name) {
        client.fetch(name);
    }
}
";
    const FAILURE_LOG: &str = "[INFO] Compiling 1 source file
[ERROR] /app/src/main/java/com/app/Main.java:[7,15] cannot find symbol
[ERROR]   symbol:   method fetch(java.lang.String)
[ERROR]   location: variable client of type com.lib.Client
[INFO] BUILD FAILURE
";

    fn update() -> BreakingUpdate {
        BreakingUpdate {
            breaking_commit: "0a1b2c3d".into(),
            project: "client-app".into(),
            updated_dependency: UpdatedDependency {
                group_id: "com.lib".into(),
                artifact_id: "lib".into(),
                previous_version: "1.0".into(),
                new_version: "2.0".into(),
            },
        }
    }

    /// The image's files: the broken client and both jars in the Maven repository.
    fn image(dir: &Path) -> Files {
        let old = dir.join("lib-1.0.jar");
        let new = dir.join("lib-2.0.jar");
        write_jar(
            &old,
            vec![
                ClassBuilder::new("com/lib/Client")
                    .method(access::PUBLIC, "<init>", "()V")
                    .method(access::PUBLIC, "fetch", "(Ljava/lang/String;)V"),
            ],
        );
        write_jar(
            &new,
            vec![
                ClassBuilder::new("com/lib/Client")
                    .method(access::PUBLIC, "<init>", "()V")
                    .method(access::PUBLIC, "fetch", "(Ljava/lang/String;I)V"),
            ],
        );
        let mut files = Files::new();
        files.insert(MAIN_PATH.into(), MAIN.as_bytes().to_vec());
        files.insert(
            "/root/.m2/repository/com/lib/lib/1.0/lib-1.0.jar".into(),
            fs::read(old).unwrap(),
        );
        files.insert(
            "/root/.m2/repository/com/lib/lib/2.0/lib-2.0.jar".into(),
            fs::read(new).unwrap(),
        );
        files
    }

    /// Builds pass once the broken call is gone.
    fn compiles_without_broken_call(files: &Files) -> String {
        let main = String::from_utf8_lossy(&files[MAIN_PATH]).into_owned();
        if main.contains(BROKEN_CALL) {
            FAILURE_LOG.into()
        } else {
            SUCCESS_LOG.into()
        }
    }

    fn services(sandbox: Arc<MockSandbox>, completion: Arc<MockCompletion>) -> Services {
        Services {
            sandbox,
            completion,
            ranker: Ranker::Levenshtein,
            similar_methods: 5,
            cache_responses: true,
            locator: ErrorLocator::default(),
            diffs: DiffCache::new(),
            models: SourceModelCache::new(),
            platform: Arc::new(ClassPath::empty()),
        }
    }

    fn config(output: &Path) -> Config {
        let mut config = Config::mock();
        config.output = output.to_path_buf();
        config.max_iterations = 2;
        config.max_retries = 0;
        config
    }

    fn reply() -> Arc<MockCompletion> {
        Arc::new(MockCompletion::replying("```java\n        client.fetch(name, 0);\n```"))
    }

    #[cfg(not(miri))]
    #[test]
    fn broken_call_is_repaired() {
        let dir = tempdir().unwrap();
        let sandbox = Arc::new(MockSandbox::with_build(image(dir.path()), compiles_without_broken_call));
        let services = services(sandbox.clone(), reply());
        let config = config(&dir.path().join("out"));

        let summary = runner::run(&config, &services, &[update()]).unwrap();
        assert_eq!(summary, Summary { fixed: 1, ..Summary::default() });
        // The breaking build and one rebuild.
        assert_eq!(sandbox.builds(), 2);
        assert_eq!(sandbox.live_containers(), 0);

        let rebuilt = sandbox.build_files(1).unwrap();
        let rebuilt = String::from_utf8_lossy(&rebuilt[MAIN_PATH]).into_owned();
        assert!(!rebuilt.contains(BROKEN_CALL), "{rebuilt}");
        assert!(rebuilt.contains("client.fetch(name, "), "{rebuilt}");

        let out = dir.path().join("out");
        let result = fs::read_to_string(out.join("results/0a1b2c3d/Main.java")).unwrap();
        assert_eq!(result, rebuilt);
        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("projects/0a1b2c3d/summary.json")).unwrap()).unwrap();
        assert_eq!(report["outcome"], "fixed");
        assert_eq!(report["initial_errors"], 1);
        assert_eq!(report["remaining_errors"], 0);
        assert!(out.join("projects/0a1b2c3d/logs/breaking.log").is_file());
        assert!(out.join("projects/0a1b2c3d/logs/iteration_0.log").is_file());
        assert!(out.join("projects/0a1b2c3d/dependency_jars/lib-2.0.jar").is_file());
    }

    #[cfg(not(miri))]
    #[test]
    fn persistent_failures_exhaust_the_iterations() {
        let dir = tempdir().unwrap();
        let sandbox = Arc::new(MockSandbox::with_build(image(dir.path()), |_| FAILURE_LOG.to_string()));
        let services = services(sandbox.clone(), reply());
        let config = config(&dir.path().join("out"));

        let summary = runner::run(&config, &services, &[update()]).unwrap();
        assert_eq!(summary, Summary { not_fixed: 1, ..Summary::default() });
        assert_eq!(sandbox.builds(), 1 + config.max_iterations);
        assert!(!dir.path().join("out/results/0a1b2c3d").exists());
    }

    #[cfg(not(miri))]
    #[test]
    fn passing_breaking_builds_are_unbuildable_and_not_rerun() {
        let dir = tempdir().unwrap();
        let sandbox = Arc::new(MockSandbox::new(image(dir.path())));
        let completion = reply();
        let services = services(sandbox.clone(), completion.clone());
        let config = config(&dir.path().join("out"));

        let summary = runner::run(&config, &services, &[update()]).unwrap();
        assert_eq!(summary, Summary { unbuildable: 1, ..Summary::default() });
        assert_eq!(sandbox.builds(), 1);
        assert!(completion.prompts().is_empty());

        // processed.json makes the next run skip the project.
        let summary = runner::run(&config, &services, &[update()]).unwrap();
        assert_eq!(summary, Summary::default());
        assert_eq!(sandbox.builds(), 1);
    }

    #[cfg(not(miri))]
    #[test]
    fn missing_jars_fail_the_project() {
        let dir = tempdir().unwrap();
        let mut files = image(dir.path());
        files.retain(|path, _| path == MAIN_PATH);
        let sandbox = Arc::new(MockSandbox::with_build(files, compiles_without_broken_call));
        let services = services(sandbox.clone(), reply());
        let mut config = config(&dir.path().join("out"));

        let summary = runner::run(&config, &services, &[update()]).unwrap();
        assert_eq!(summary, Summary { failed: 1, ..Summary::default() });
        assert_eq!(sandbox.live_containers(), 0);
        let report = fs::read_to_string(dir.path().join("out/projects/0a1b2c3d/summary.json")).unwrap();
        assert!(report.contains("lib-1.0.jar"), "{report}");

        // Failed projects are retried; --force starts over.
        config.force = true;
        runner::run(&config, &services, &[update()]).unwrap();
        assert_eq!(sandbox.builds(), 2);
    }

    /// Runs one update whose `Main.java` is `main`, failing with `log` until `fixed` accepts the
    /// class. Returns the summary and the repaired class.
    fn repair_main(main: &'static str, log: &'static str, fixed: fn(&str) -> bool) -> (Summary, String) {
        let dir = tempdir().unwrap();
        let mut files = image(dir.path());
        files.insert(MAIN_PATH.into(), main.as_bytes().to_vec());
        let sandbox = Arc::new(MockSandbox::with_build(files, move |files| {
            if fixed(&String::from_utf8_lossy(&files[MAIN_PATH])) {
                SUCCESS_LOG.into()
            } else {
                log.into()
            }
        }));
        let completion = reply();
        let services = services(sandbox, completion.clone());
        let config = config(&dir.path().join("out"));

        let summary = runner::run(&config, &services, &[update()]).unwrap();
        assert!(completion.prompts().is_empty());
        let result = fs::read_to_string(dir.path().join("out/results/0a1b2c3d/Main.java")).unwrap_or_default();
        (summary, result)
    }

    #[cfg(not(miri))]
    #[test]
    fn subclass_of_sealed_class_is_made_final() {
        const SEALED_MAIN: &str = "package com.app;

import com.lib.Client;

public class Main extends Client {
    void run(String name) {
    }
}
";
        const SEALED_LOG: &str = "[ERROR] /app/src/main/java/com/app/Main.java:[5,8] Class Main should be declared as final
[INFO] BUILD FAILURE
";
        let (summary, result) = repair_main(SEALED_MAIN, SEALED_LOG, |main| main.contains("public final class Main"));
        assert_eq!(summary, Summary { fixed: 1, ..Summary::default() });
        assert!(result.contains("public final class Main extends Client {"), "{result}");
    }

    #[cfg(not(miri))]
    #[test]
    fn stale_override_annotation_is_dropped() {
        const OVERRIDE_MAIN: &str = "package com.app;

import com.lib.Client;

public class Main extends Client {
    @Override
    public void close() {
    }
}
";
        const OVERRIDE_LOG: &str = "[ERROR] /app/src/main/java/com/app/Main.java:[6,5] method does not override or implement a method from a supertype
[INFO] BUILD FAILURE
";
        let (summary, result) = repair_main(OVERRIDE_MAIN, OVERRIDE_LOG, |main| !main.contains("@Override"));
        assert_eq!(summary, Summary { fixed: 1, ..Summary::default() });
        assert!(!result.contains("@Override"), "{result}");
        assert!(result.contains("    public void close() {"), "{result}");
    }

    #[cfg(not(miri))]
    #[test]
    fn analysis_reports_location_and_conflicts() {
        let dir = tempdir().unwrap();
        let sandbox = Arc::new(MockSandbox::with_build(image(dir.path()), compiles_without_broken_call));
        let completion = reply();
        let services = services(sandbox.clone(), completion.clone());
        let config = config(&dir.path().join("out"));

        runner::analyze(&config, &services, &[update()]).unwrap();
        let analysis: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("out/projects/0a1b2c3d/analysis.json")).unwrap())
                .unwrap();
        assert_eq!(analysis[0]["line"], 7);
        assert_eq!(analysis[0]["provider"], "cannot_find_symbol");
        assert_eq!(analysis[0]["location"]["class_name"], "com.lib.Client");
        assert!(!analysis[0]["conflicts"].as_array().unwrap().is_empty());
        assert_eq!(sandbox.builds(), 1);
        assert!(completion.prompts().is_empty());
    }
}
