//! Repair of one breaking update: build, locate, classify, solve, apply, rebuild.

use crate::apply::write_fixed_classes;
use crate::dataset::BreakingUpdate;
use api_diff::{ApiDiff, Classifier, DiffCache};
use build_sandbox::{BuildSandbox, Container, DockerSandbox};
use bump_core::config::Config;
use bump_core::context::{Context, WorkingDirectories};
use bump_core::llm::{LLMConfig, LlmCompletion, LlmEmbedding, TextCompletion};
use bump_core::{CompileError, ConflictType, ErrorLocation};
use code_analysis::bytecode::ClassPath;
use code_analysis::source_model::SourceModelCache;
use code_analysis::{TypeResolver, read_broken_line};
use conflict_solvers::llm_solver::{self, Ranker, ResponseCache};
use conflict_solvers::{Attempt, LlmSolver, Problem, Solvers};
use error_location::{ErrorLocator, Site};
use maven_log::{build_failed, compile_errors, parse, prioritize_with};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the runs of all projects share.
pub struct Services {
    pub sandbox: Arc<dyn BuildSandbox>,
    pub completion: Arc<dyn TextCompletion>,
    pub ranker: Ranker,
    pub similar_methods: usize,
    pub cache_responses: bool,
    pub locator: ErrorLocator,
    pub diffs: DiffCache,
    pub models: SourceModelCache,
    /// Java platform classes.
    pub platform: Arc<ClassPath>,
}

impl Services {
    /// Connects to the LLM services and the container runtime named by `config`.
    pub fn from_config(config: &Config) -> Result<Services, Box<dyn Error>> {
        let solver_config = config
            .tools
            .get("llm_solver")
            .ok_or("missing [tools.llm_solver] configuration")?;
        let solver_config = llm_solver::Config::deserialize(solver_config)?;
        solver_config.validate();
        let ranker = match config.tools.get("embedding") {
            Some(value) => {
                let embedding = LLMConfig::deserialize(value)?;
                Ranker::Embedding(Arc::new(LlmEmbedding::new(Arc::new(embedding))))
            }
            None => Ranker::Levenshtein,
        };
        let platform = match config.platform_jars_dir() {
            Some(dir) => ClassPath::from_dir(dir)?,
            None => ClassPath::empty(),
        };
        Ok(Services {
            sandbox: Arc::new(DockerSandbox::new(&config.sandbox)),
            completion: Arc::new(LlmCompletion::new(Arc::new(solver_config.llm))),
            ranker,
            similar_methods: solver_config.similar_methods,
            cache_responses: solver_config.cache_responses,
            locator: ErrorLocator::default(),
            diffs: DiffCache::new(),
            models: SourceModelCache::new(),
            platform: Arc::new(platform),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A rebuild passed.
    Fixed,
    /// Iterations and retries ran out.
    NotFixed,
    /// The breaking build reported no compile errors to work on.
    Unbuildable,
    /// An I/O, sandbox or jar failure ended the last attempt.
    Failed,
}

/// One fix a solver produced.
#[derive(Debug, Clone, Serialize)]
pub struct FixRecord {
    pub file: String,
    pub line: usize,
    pub message: String,
    pub provider: &'static str,
    pub solver: &'static str,
    pub conflicts: Vec<ConflictType>,
}

/// The `summary.json` of a project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub breaking_commit: String,
    pub outcome: Outcome,
    pub attempts: usize,
    /// Rebuilds of the last attempt.
    pub iterations: usize,
    pub initial_errors: usize,
    pub remaining_errors: usize,
    pub fixes: Vec<FixRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectReport {
    fn new(update: &BreakingUpdate, outcome: Outcome) -> ProjectReport {
        ProjectReport {
            project: update.project.clone(),
            breaking_commit: update.breaking_commit.clone(),
            outcome,
            attempts: 0,
            iterations: 0,
            initial_errors: 0,
            remaining_errors: 0,
            fixes: Vec::new(),
            error: None,
        }
    }

    pub fn failed(update: &BreakingUpdate, error: String) -> ProjectReport {
        ProjectReport {
            error: Some(error),
            ..ProjectReport::new(update, Outcome::Failed)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .map_err(|e| format!("cannot write {}: {e}", path.display()).into())
    }
}

/// One error of the breaking build, as analyze-only mode reports it.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorAnalysis {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub broken_code: String,
    pub provider: Option<&'static str>,
    pub location: Option<ErrorLocation>,
    pub conflicts: Vec<ConflictType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative: Option<String>,
}

/// The breaking build's errors and the diff of the upgraded dependency.
struct Breakage {
    errors: Vec<CompileError>,
    diff: Arc<ApiDiff>,
    dependency_classes: Arc<ClassPath>,
}

/// The per-iteration analysis state of an attempt.
struct Analysis<'a> {
    resolver: TypeResolver,
    classifier: Classifier<'a>,
    diff: &'a ApiDiff,
}

pub struct ProjectRun<'a> {
    config: &'a Config,
    services: &'a Services,
    update: &'a BreakingUpdate,
    pub dirs: WorkingDirectories,
    worker: usize,
    /// Container path of every class an error was reported in, by class file name.
    remote_paths: BTreeMap<String, String>,
}

impl<'a> ProjectRun<'a> {
    pub fn new(config: &'a Config, services: &'a Services, update: &'a BreakingUpdate, worker: usize) -> ProjectRun<'a> {
        ProjectRun {
            config,
            services,
            update,
            dirs: WorkingDirectories::new(&config.output, update.id()),
            worker,
            remote_paths: BTreeMap::new(),
        }
    }

    fn context(&self) -> Context {
        Context::new(&self.update.project, self.update.id(), self.dirs.clone())
    }

    fn image(&self) -> String {
        self.config.sandbox.image_for(&self.update.breaking_commit)
    }

    fn discard(&self, container: &Container) {
        if let Err(e) = self.services.sandbox.remove(container) {
            warn!("cannot remove container {}: {e}", container.id);
        }
    }

    /// Repairs the project, retrying from scratch until a rebuild passes or the retries run out.
    pub fn repair(&mut self) -> Result<ProjectReport, Box<dyn Error>> {
        let Some(breakage) = self.breaking_build()? else {
            return Ok(ProjectReport::new(self.update, Outcome::Unbuildable));
        };
        let mut report = ProjectReport::new(self.update, Outcome::NotFixed);
        report.initial_errors = breakage.errors.len();
        report.remaining_errors = breakage.errors.len();
        for attempt in 0..=self.config.max_retries {
            report.attempts = attempt + 1;
            report.iterations = 0;
            report.fixes.clear();
            let mut ctx = self.context();
            match self.attempt(&mut ctx, &breakage, &mut report) {
                Ok(true) => {
                    self.collect_results(&ctx)?;
                    report.outcome = Outcome::Fixed;
                    report.remaining_errors = 0;
                    return Ok(report);
                }
                Ok(false) => info!("{}: attempt {} ended unfixed", self.update.project, attempt + 1),
                Err(e) if attempt == self.config.max_retries => return Err(e),
                Err(e) => error!("{}: attempt {} failed: {e}", self.update.project, attempt + 1),
            }
        }
        Ok(report)
    }

    /// Locates and classifies the breaking build's errors without solving them.
    pub fn analyze(&mut self) -> Result<Vec<ErrorAnalysis>, Box<dyn Error>> {
        let Some(breakage) = self.breaking_build()? else {
            return Ok(Vec::new());
        };
        let ctx = self.context();
        let analysis = self.analysis(&breakage)?;
        let mut report = Vec::with_capacity(breakage.errors.len());
        for error in &breakage.errors {
            let source = ctx.current_class_source(&error.class_file_name());
            let broken = read_broken_line(&source, [error.line, error.column])?;
            let class_name = error.class_name();
            let site = Site {
                resolver: &analysis.resolver,
                class_file: &source,
                class_name: &class_name,
            };
            let located = self.services.locator.locate(error, &broken, &site)?;
            let classification = match &located {
                Some(l) => Some(analysis.classifier.classify(error, &l.location)?),
                None => None,
            };
            report.push(ErrorAnalysis {
                file: error.file.clone(),
                line: error.line,
                column: error.column,
                message: error.message.clone(),
                broken_code: broken.code,
                provider: located.as_ref().map(|l| l.provider),
                conflicts: classification
                    .as_ref()
                    .map(|c| c.conflicts.iter().copied().collect())
                    .unwrap_or_default(),
                alternative: classification.and_then(|c| c.alternative),
                location: located.map(|l| l.location),
            });
        }
        let path = self.dirs.root.join("analysis.json");
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        Ok(report)
    }

    /// Builds the breaking image and fetches what the repair needs from it. `None` when the
    /// build reports no compile errors.
    fn breaking_build(&mut self) -> Result<Option<Breakage>, Box<dyn Error>> {
        self.dirs
            .create_all()
            .map_err(|e| format!("cannot create {}: {e}", self.dirs.root.display()))?;
        let image = self.image();
        info!("{}: building {image}", self.update.project);
        let container = self.services.sandbox.create_and_run(&image)?;
        let result = self.inspect_breaking_build(&container);
        self.discard(&container);
        result
    }

    fn inspect_breaking_build(&mut self, container: &Container) -> Result<Option<Breakage>, Box<dyn Error>> {
        let log = self.services.sandbox.stream_logs(container)?;
        write_file(&self.dirs.logs_dir.join("breaking.log"), log.as_bytes())?;
        let errors = if build_failed(&log) {
            compile_errors(parse(&log))
        } else {
            Vec::new()
        };
        if errors.is_empty() {
            warn!("{}: the breaking build reports no compile errors", self.update.project);
            return Ok(None);
        }
        self.fetch_sources(container, &errors)?;
        let ctx = self.context();
        let errors = prioritize_with(errors, |e| source_line(&ctx.broken_class_path(&e.class_file_name()), e.line));
        info!("{}: {} compile errors", self.update.project, errors.len());
        let (old, new) = self.fetch_jars(container)?;
        let diff = self.services.diffs.get_or_compute(&old, &new)?;
        let dependency_classes = Arc::new(ClassPath::from_dir(&self.dirs.dependency_jars_dir)?);
        Ok(Some(Breakage {
            errors,
            diff,
            dependency_classes,
        }))
    }

    /// Copies the classes named by `errors` out of `container`, unless an earlier build already
    /// provided them. Returns how many were new.
    fn fetch_sources(&mut self, container: &Container, errors: &[CompileError]) -> Result<usize, Box<dyn Error>> {
        let ctx = self.context();
        let mut fetched = 0;
        for error in errors {
            let class_file_name = error.class_file_name();
            if self.remote_paths.contains_key(&class_file_name) {
                continue;
            }
            let remote = error.file.to_string_lossy().into_owned();
            let bytes = self.services.sandbox.extract_file(container, &remote)?;
            write_file(&ctx.broken_class_path(&class_file_name), &bytes)?;
            write_file(&self.dirs.sources_dir.join(remote.trim_start_matches('/')), &bytes)?;
            debug!("fetched {remote}");
            self.remote_paths.insert(class_file_name, remote);
            fetched += 1;
        }
        Ok(fetched)
    }

    /// The old and new jar of the upgraded dependency, from the jar cache or the container's
    /// Maven repository. The new jar also joins the dependency jars.
    fn fetch_jars(&self, container: &Container) -> Result<(PathBuf, PathBuf), Box<dyn Error>> {
        let dependency = &self.update.updated_dependency;
        let mut jars = Vec::with_capacity(2);
        for version in [&dependency.previous_version, &dependency.new_version] {
            let name = dependency.jar_name(version);
            let local = self.dirs.jars_dir.join(&name);
            if !local.exists() {
                let cached = self
                    .config
                    .jar_cache_dir()
                    .map(|dir| dir.join(&name))
                    .filter(|path| path.is_file());
                let bytes = match cached {
                    Some(path) => fs::read(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))?,
                    None => {
                        let remote = dependency.repository_path(&self.config.sandbox.m2_repository, version);
                        self.services.sandbox.extract_file(container, &remote)?
                    }
                };
                write_file(&local, &bytes)?;
            }
            jars.push(local);
        }
        let new = jars.pop().ok_or("no new jar")?;
        let old = jars.pop().ok_or("no old jar")?;
        let dependency_jar = self.dirs.dependency_jars_dir.join(dependency.jar_name(&dependency.new_version));
        fs::copy(&new, &dependency_jar).map_err(|e| format!("cannot copy {}: {e}", new.display()))?;
        Ok((old, new))
    }

    fn analysis<'b>(&'b self, breakage: &'b Breakage) -> Result<Analysis<'b>, Box<dyn Error>> {
        let model = self.services.models.get_or_build(self.worker, &self.dirs.sources_dir)?;
        Ok(Analysis {
            resolver: TypeResolver::new(
                model,
                Arc::clone(&breakage.dependency_classes),
                Arc::clone(&self.services.platform),
            ),
            classifier: Classifier::new(&breakage.diff, &breakage.dependency_classes, &self.services.diffs),
            diff: &breakage.diff,
        })
    }

    fn solvers(&self) -> Solvers {
        let mut llm = LlmSolver::new(Arc::clone(&self.services.completion))
            .with_ranker(self.services.ranker.clone())
            .with_similar_methods(self.services.similar_methods);
        if self.services.cache_responses {
            llm = llm.with_cache(ResponseCache::new(&self.dirs.prompts_dir));
        }
        Solvers::standard(llm)
    }

    /// One attempt: solve, apply, rebuild, until a rebuild passes (`true`), an iteration
    /// proposes nothing or the iterations run out.
    fn attempt(
        &mut self,
        ctx: &mut Context,
        breakage: &Breakage,
        report: &mut ProjectReport,
    ) -> Result<bool, Box<dyn Error>> {
        let solvers = self.solvers();
        let mut errors = breakage.errors.clone();
        while ctx.iteration < self.config.max_iterations {
            {
                let analysis = self.analysis(breakage)?;
                for error in &errors {
                    self.solve_error(ctx, error, &analysis, &solvers, report)?;
                }
            }
            if ctx.proposed_changes.is_empty() {
                info!("{}: iteration {} proposed no fixes", self.update.project, ctx.iteration);
                return Ok(false);
            }
            let written = write_fixed_classes(ctx)?;
            info!(
                "{}: iteration {} corrected {}",
                self.update.project,
                ctx.iteration,
                written.join(", ")
            );
            let container = self.services.sandbox.create(&self.image())?;
            let rebuilt = self.rebuild(&container, ctx);
            self.discard(&container);
            report.iterations += 1;
            match rebuilt? {
                None => return Ok(true),
                Some(remaining) => {
                    report.remaining_errors = remaining.len();
                    errors = remaining;
                }
            }
            ctx.next_iteration();
        }
        Ok(false)
    }

    /// Builds the project with every class corrected so far. `None` if the build passes,
    /// otherwise its compile errors.
    fn rebuild(&mut self, container: &Container, ctx: &Context) -> Result<Option<Vec<CompileError>>, Box<dyn Error>> {
        let sandbox = &self.services.sandbox;
        for class in &ctx.fixed_classes {
            let Some(remote) = self.remote_paths.get(class) else {
                warn!("no container path for {class}");
                continue;
            };
            sandbox.replace_file(container, &ctx.class_source_for(ctx.iteration + 1, class), remote)?;
        }
        sandbox.start(container)?;
        let log = sandbox.stream_logs(container)?;
        write_file(&self.dirs.log_path(ctx.iteration), log.as_bytes())?;
        if !build_failed(&log) {
            return Ok(None);
        }
        let errors = compile_errors(parse(&log));
        if self.fetch_sources(container, &errors)? > 0 {
            // The source model was built without the new classes.
            self.services.models.release(self.worker);
        }
        let built = |e: &CompileError| source_line(&ctx.class_source_for(ctx.iteration + 1, &e.class_file_name()), e.line);
        Ok(Some(prioritize_with(errors, built)))
    }

    fn solve_error(
        &self,
        ctx: &mut Context,
        error: &CompileError,
        analysis: &Analysis,
        solvers: &Solvers,
        report: &mut ProjectReport,
    ) -> Result<(), Box<dyn Error>> {
        ctx.focus(error);
        let source = ctx.current_class_source(&error.class_file_name());
        let broken = read_broken_line(&source, [error.line, error.column])?;
        if let Some(change) = ctx.cached_fix(&broken.code, error.line) {
            debug!("reusing the fix of identical code at line {}", error.line);
            ctx.record(change);
            return Ok(());
        }
        let class_name = error.class_name();
        let site = Site {
            resolver: &analysis.resolver,
            class_file: &source,
            class_name: &class_name,
        };
        let Some(located) = self.services.locator.locate(error, &broken, &site)? else {
            return Ok(());
        };
        let classification = analysis.classifier.classify(error, &located.location)?;
        let class_source =
            fs::read_to_string(&source).map_err(|e| format!("cannot read {}: {e}", source.display()))?;
        let problem = Problem {
            error,
            broken: &broken,
            location: &located.location,
            classification: &classification,
            class_source: &class_source,
            diff: analysis.diff,
        };
        match solvers.solve(&problem)? {
            Some(Attempt {
                solver,
                change: Some(change),
            }) => {
                report.fixes.push(FixRecord {
                    file: error.class_file_name(),
                    line: error.line,
                    message: error.message.clone(),
                    provider: located.provider,
                    solver,
                    conflicts: classification.conflicts.iter().copied().collect(),
                });
                ctx.remember(&broken.code, error.line, &change);
                ctx.record(change);
            }
            Some(Attempt { solver, change: None }) => {
                warn!("{solver} produced no fix for {}:{}", error.class_file_name(), error.line)
            }
            None => {}
        }
        Ok(())
    }

    /// Copies the newest version of every corrected class to the results directory.
    fn collect_results(&self, ctx: &Context) -> Result<(), Box<dyn Error>> {
        let results = &self.dirs.results_dir;
        fs::create_dir_all(results).map_err(|e| format!("cannot create {}: {e}", results.display()))?;
        for class in &ctx.fixed_classes {
            let latest = ctx.class_source_for(ctx.iteration + 1, class);
            fs::copy(&latest, results.join(class)).map_err(|e| format!("cannot copy {}: {e}", latest.display()))?;
        }
        Ok(())
    }
}

/// Line `line` (1-based) of `path`, if the file is readable.
fn source_line(path: &Path, line: usize) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    text.lines().nth(line.checked_sub(1)?).map(str::to_string)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
    }
    fs::write(path, bytes).map_err(|e| format!("cannot write {}: {e}", path.display()).into())
}
