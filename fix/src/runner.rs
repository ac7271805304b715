//! Runs the repair of every breaking update on a bounded pool of workers.

use crate::dataset::BreakingUpdate;
use crate::pipeline::{Outcome, ProjectReport, ProjectRun, Services};
use bump_core::config::Config;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

/// Project counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub fixed: usize,
    pub not_fixed: usize,
    pub unbuildable: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Tally {
    fixed: AtomicUsize,
    not_fixed: AtomicUsize,
    unbuildable: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn count(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Fixed => &self.fixed,
            Outcome::NotFixed => &self.not_fixed,
            Outcome::Unbuildable => &self.unbuildable,
            Outcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> Summary {
        Summary {
            fixed: self.fixed.load(Ordering::Relaxed),
            not_fixed: self.not_fixed.load(Ordering::Relaxed),
            unbuildable: self.unbuildable.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Ids of the projects a previous run finished, kept in `processed.json` so a rerun resumes.
struct Processed {
    path: PathBuf,
    ids: Mutex<BTreeSet<String>>,
}

impl Processed {
    fn load(output: &Path) -> Processed {
        let path = output.join("processed.json");
        let ids = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("ignoring unreadable {}: {e}", path.display());
                BTreeSet::new()
            }),
            Err(_) => BTreeSet::new(),
        };
        Processed {
            path,
            ids: Mutex::new(ids),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.lock().map(|ids| ids.contains(id)).unwrap_or(false)
    }

    fn insert(&self, id: &str) {
        let Ok(mut ids) = self.ids.lock() else {
            return;
        };
        ids.insert(id.to_string());
        let written = serde_json::to_string_pretty(&*ids)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&self.path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            warn!("cannot record {id} in {}: {e}", self.path.display());
        }
    }
}

/// Prepares the output directory: erased first under `force`.
fn prepare_output(config: &Config) -> Result<(), Box<dyn Error>> {
    let output = &config.output;
    if config.force && output.exists() {
        info!("erasing {}", output.display());
        fs::remove_dir_all(output).map_err(|e| format!("cannot erase {}: {e}", output.display()))?;
    }
    fs::create_dir_all(output).map_err(|e| format!("cannot create {}: {e}", output.display()).into())
}

fn process(config: &Config, services: &Services, update: &BreakingUpdate, worker: usize) -> ProjectReport {
    info!("{}: repairing {} (worker {worker})", update.project, update.id());
    let mut run = ProjectRun::new(config, services, update, worker);
    let report = match catch_unwind(AssertUnwindSafe(|| run.repair())) {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            error!("{}: {e}", update.project);
            ProjectReport::failed(update, e.to_string())
        }
        Err(panic) => {
            error!("{}: repair panicked: {panic:?}", update.project);
            ProjectReport::failed(update, "repair panicked".into())
        }
    };
    if run.dirs.root.exists()
        && let Err(e) = report.save(&run.dirs.root.join("summary.json"))
    {
        warn!("{e}");
    }
    report
}

/// Repairs every update not processed by an earlier run, `config.concurrency` at a time.
pub fn run(config: &Config, services: &Services, updates: &[BreakingUpdate]) -> Result<Summary, Box<dyn Error>> {
    prepare_output(config)?;
    let processed = Processed::load(&config.output);
    let pending: Vec<&BreakingUpdate> = updates.iter().filter(|u| !processed.contains(u.id())).collect();
    if pending.len() < updates.len() {
        info!("skipping {} projects processed earlier", updates.len() - pending.len());
    }

    let tally = Tally::default();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.concurrency.max(1))
        .build()?;
    pool.install(|| {
        pending.par_iter().for_each(|update| {
            let worker = rayon::current_thread_index().unwrap_or(0);
            let report = process(config, services, update, worker);
            services.models.release(worker);
            info!("{}: {:?}", update.project, report.outcome);
            tally.count(report.outcome);
            // Failures are retried by the next run.
            if report.outcome != Outcome::Failed {
                processed.insert(update.id());
            }
        })
    });

    let summary = tally.summary();
    let path = config.output.join("summary.json");
    fs::write(&path, serde_json::to_string_pretty(&summary)?)
        .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    info!(
        "fixed {}, not fixed {}, unbuildable {}, failed {}",
        summary.fixed, summary.not_fixed, summary.unbuildable, summary.failed
    );
    Ok(summary)
}

/// Analyzes every update in turn; see [`ProjectRun::analyze`].
pub fn analyze(config: &Config, services: &Services, updates: &[BreakingUpdate]) -> Result<(), Box<dyn Error>> {
    prepare_output(config)?;
    for update in updates {
        let mut run = ProjectRun::new(config, services, update, 0);
        match run.analyze() {
            Ok(errors) => {
                println!("{} ({})", update.project, update.id());
                for error in errors {
                    let conflicts: Vec<String> = error.conflicts.iter().map(ToString::to_string).collect();
                    println!(
                        "  {}:{} {} [{}] {}",
                        error.file.display(),
                        error.line,
                        error.location.map(|l| l.to_string()).unwrap_or_else(|| "?".into()),
                        conflicts.join(", "),
                        error.message
                    );
                }
            }
            Err(e) => error!("{}: {e}", update.project),
        }
        services.models.release(0);
    }
    Ok(())
}
