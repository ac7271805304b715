//! Writing proposed changes into corrected copies of the broken classes.

use bump_core::ProposedChange;
use bump_core::context::Context;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use tracing::{debug, warn};

/// Replaces the spans of `changes` in `source`. A change covers lines `[start, end)`, or only
/// `start` when `end == start`. Changes are applied bottom-up so earlier spans keep their line
/// numbers; a change overlapping one applied before it is dropped.
pub fn apply_changes(source: &str, changes: &[&ProposedChange]) -> String {
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    let mut ordered = changes.to_vec();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));
    // First line of the last applied change.
    let mut floor = usize::MAX;
    for change in ordered {
        let end = change.end.max(change.start + 1);
        if change.start == 0 || change.start > lines.len() {
            warn!("change at line {} is outside {} ({} lines)", change.start, change.class_name, lines.len());
            continue;
        }
        if end > floor {
            warn!("dropping change at line {} of {}: overlaps another change", change.start, change.class_name);
            continue;
        }
        let end = end.min(lines.len() + 1);
        let mut replacement: Vec<String> = change.code.lines().map(str::to_string).collect();
        if replacement.is_empty() {
            replacement.push(String::new());
        }
        lines.splice(change.start - 1..end - 1, replacement);
        floor = change.start;
    }
    let mut out = lines.join("\n");
    if source.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Applies the context's proposed changes to the current version of every class they touch and
/// writes the results to the iteration's directory. Returns the file names of the classes
/// written.
pub fn write_fixed_classes(ctx: &mut Context) -> Result<Vec<String>, Box<dyn Error>> {
    let mut by_class: BTreeMap<&str, Vec<&ProposedChange>> = BTreeMap::new();
    for change in &ctx.proposed_changes {
        by_class.entry(&change.class_name).or_default().push(change);
    }
    let dir = ctx.dirs.iteration_dir(ctx.iteration);
    fs::create_dir_all(&dir).map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
    let mut written = Vec::with_capacity(by_class.len());
    for (class, changes) in by_class {
        let source_path = ctx.current_class_source(class);
        let source = fs::read_to_string(&source_path)
            .map_err(|e| format!("cannot read {}: {e}", source_path.display()))?;
        let target = ctx.fixed_class_path(ctx.iteration, class);
        fs::write(&target, apply_changes(&source, &changes))
            .map_err(|e| format!("cannot write {}: {e}", target.display()))?;
        debug!("wrote {} changes to {}", changes.len(), target.display());
        written.push(class.to_string());
    }
    ctx.fixed_classes.extend(written.iter().cloned());
    Ok(written)
}
