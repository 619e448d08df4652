//! The rebuild decision: compare input and output mtimes, augmented by
//! compiler depfiles, and produce a human-readable reason when a task
//! must run.

use crate::depfile::{self, DepFormat};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Everything the decision needs, after inputs and outputs are resolved.
pub struct RebuildCheck<'a> {
    pub force: bool,
    pub in_files: &'a [PathBuf],
    pub out_files: &'a [PathBuf],
    pub depfile: Option<&'a Path>,
    pub depformat: DepFormat,
    /// Depfile contents are relative to the task's working directory.
    pub task_dir: &'a Path,
}

/// Decide whether the task must run. `Some(reason)` means rebuild;
/// `None` means the task can be skipped.
pub fn needs_rebuild(check: &RebuildCheck<'_>) -> Option<String> {
    if check.force {
        return Some("force flag".to_string());
    }

    for file in check.out_files {
        if !file.exists() {
            return Some(format!("{} is missing", file.display()));
        }
    }

    if check.in_files.is_empty() {
        return Some("always rebuild a target with no inputs".to_string());
    }
    if check.out_files.is_empty() {
        return Some("always rebuild a target with no outputs".to_string());
    }

    // Outputs all exist; find the oldest one. Strictly-newer inputs force
    // a rebuild; equal mtimes do not, so same-second rebuilds stay quiet.
    let min_out = check.out_files.iter().filter_map(|f| mtime(f)).min()?;

    for file in check.in_files {
        if newer_than(file, min_out) {
            return Some(format!("{} has changed", file.display()));
        }
    }

    if let Some(depfile) = check.depfile {
        if depfile.exists() {
            match depfile::parse_depfile(depfile, check.depformat) {
                Ok(deps) => {
                    for dep in deps {
                        let dep = check.task_dir.join(dep);
                        if newer_than(&dep, min_out) {
                            return Some(format!(
                                "a dependency in {} has changed",
                                depfile.display()
                            ));
                        }
                    }
                }
                Err(err) => {
                    // A malformed depfile is not fatal; it may simply not
                    // have been written yet.
                    tracing::warn!(
                        depfile = %depfile.display(),
                        %err,
                        "ignoring unreadable depfile"
                    );
                }
            }
        }
    }

    None
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True if `path` is strictly newer than `reference`, or unreadable
/// (a vanished dependency counts as changed).
fn newer_than(path: &Path, reference: SystemTime) -> bool {
    match mtime(path) {
        Some(t) => t > reference,
        None => true,
    }
}
