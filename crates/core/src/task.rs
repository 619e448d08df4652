//! The task model: lifecycle, promise, dependency resolution, and the
//! path bookkeeping that happens between "inputs are ready" and "the
//! rebuild decision runs".

use crate::config::Config;
use crate::depfile::DepFormat;
use crate::expand::{self, ExpandOpts};
use crate::paths;
use crate::value::{BoxFuture, Value};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Task lifecycle states. A task reaches exactly one terminal state
/// (`Succeeded`, `Failed`, `Skipped`, or `Cancelled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    AwaitingInputs,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

/// What a task's promise resolves to. A skipped task fulfills its promise
/// with its output list exactly like a successful one.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Vec<PathBuf>),
    Failed(String),
    Cancelled,
}

/// Signals that an upstream task failed or was cancelled while resolving
/// this task's inputs; the current task cascades to `Cancelled`.
#[derive(Debug)]
pub(crate) struct UpstreamFailed;

/// A unit of work: a command (or callback) plus resolved inputs, outputs,
/// and a promise for the eventual output-file list.
pub struct Task {
    index: usize,
    config: Mutex<Config>,
    state: Mutex<TaskState>,
    queued: AtomicBool,
    in_files: Mutex<Vec<PathBuf>>,
    out_files: Mutex<Vec<PathBuf>>,
    task_dir: Mutex<PathBuf>,
    desc: Mutex<String>,
    command: Mutex<Value>,
    reason: Mutex<Option<String>>,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    returncode: Mutex<Option<i32>>,
    done_tx: watch::Sender<Option<Outcome>>,
}

impl Task {
    pub(crate) fn new(index: usize, config: Config) -> Self {
        let (done_tx, _) = watch::channel(None);
        Self {
            index,
            config: Mutex::new(config),
            state: Mutex::new(TaskState::Pending),
            queued: AtomicBool::new(false),
            in_files: Mutex::new(Vec::new()),
            out_files: Mutex::new(Vec::new()),
            task_dir: Mutex::new(PathBuf::new()),
            desc: Mutex::new(String::new()),
            command: Mutex::new(Value::Null),
            reason: Mutex::new(None),
            stdout: Mutex::new(String::new()),
            stderr: Mutex::new(String::new()),
            returncode: Mutex::new(None),
            done_tx,
        }
    }

    /// Creation order; breaks scheduling ties and numbers log lines.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        *self.state.lock().unwrap() = state;
    }

    pub(crate) fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::SeqCst)
    }

    /// Snapshot of the task's config.
    pub fn config(&self) -> Config {
        self.config.lock().unwrap().clone()
    }

    pub fn in_files(&self) -> Vec<PathBuf> {
        self.in_files.lock().unwrap().clone()
    }

    pub fn out_files(&self) -> Vec<PathBuf> {
        self.out_files.lock().unwrap().clone()
    }

    /// Replace the output list; honored when a callback command rewrites
    /// its own outputs.
    pub fn set_out_files(&self, files: Vec<PathBuf>) {
        *self.out_files.lock().unwrap() = files;
    }

    pub fn task_dir(&self) -> PathBuf {
        self.task_dir.lock().unwrap().clone()
    }

    pub fn desc(&self) -> String {
        self.desc.lock().unwrap().clone()
    }

    pub(crate) fn command(&self) -> Value {
        self.command.lock().unwrap().clone()
    }

    /// Why the task reran ("rebuilding because ...'), if it did.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().unwrap().clone()
    }

    pub(crate) fn set_reason(&self, reason: String) {
        *self.reason.lock().unwrap() = Some(reason);
    }

    pub fn stdout(&self) -> String {
        self.stdout.lock().unwrap().clone()
    }

    pub fn stderr(&self) -> String {
        self.stderr.lock().unwrap().clone()
    }

    pub fn returncode(&self) -> Option<i32> {
        *self.returncode.lock().unwrap()
    }

    pub(crate) fn record_capture(&self, stdout: String, stderr: String, code: i32) {
        *self.stdout.lock().unwrap() = stdout;
        *self.stderr.lock().unwrap() = stderr;
        *self.returncode.lock().unwrap() = Some(code);
    }

    /// Reach the terminal state and fulfill the promise. Called exactly
    /// once per task, by the scheduler.
    pub(crate) fn finish(&self, state: TaskState, outcome: Outcome) {
        self.set_state(state);
        // send_replace stores the value even when nobody subscribed yet;
        // late waiters read it through `borrow`.
        self.done_tx.send_replace(Some(outcome));
    }

    /// Await the task's promise: its resolved output-file list on success
    /// (or skip), or the failure/cancellation sentinel.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.done_tx.subscribe();
        loop {
            {
                let current = rx.borrow();
                if let Some(outcome) = current.as_ref() {
                    return outcome.clone();
                }
            }
            if rx.changed().await.is_err() {
                return Outcome::Cancelled;
            }
        }
    }

    /// Await every task promise reachable from this task's config fields,
    /// substituting resolved output lists in place.
    pub(crate) async fn resolve_inputs(&self) -> std::result::Result<(), UpstreamFailed> {
        let snapshot = self.config();
        let keys: Vec<String> = snapshot.keys().cloned().collect();
        let mut resolved = snapshot;
        for key in keys {
            let value = match resolved.get_own(&key) {
                Some(v) => v.clone(),
                None => continue,
            };
            let value = resolve_value(value).await?;
            resolved.set(key, value);
        }
        *self.config.lock().unwrap() = resolved;
        Ok(())
    }

    /// Expand paths and commands once inputs are resolved.
    ///
    /// Populates the input/output file lists, rebases outputs into
    /// `build_dir`, verifies inputs exist, creates output directories,
    /// and expands `desc` and `command` last so they see final paths.
    pub(crate) fn init(
        &self,
        opts: &ExpandOpts,
        dry_run: bool,
        outputs: &OutputRegistry,
    ) -> Result<()> {
        let mut config = self.config();
        let cwd = std::env::current_dir()?;

        let repo_dir = match config.get_expanded("repo_dir", Value::Null, opts) {
            Value::Str(s) if !s.is_empty() => {
                paths::make_absolute(Path::new(&s), &cwd)
            }
            _ => cwd.clone(),
        };
        let task_dir = expand_dir(&config, "task_dir", &repo_dir, opts)?;
        let build_dir = expand_dir(&config, "build_dir", &repo_dir, opts)?;

        if !task_dir.is_dir() {
            return Err(Error::bad_path(format!(
                "task_dir {} does not exist",
                task_dir.display()
            )));
        }
        // Subrepo builds share the root's build tree, so the containment
        // anchor is root_dir, not the (possibly nested) repo_dir.
        let anchor = match config.get_expanded("root_dir", Value::Null, opts) {
            Value::Str(s) if !s.is_empty() => paths::make_absolute(Path::new(&s), &cwd),
            _ => repo_dir.clone(),
        };
        if !build_dir.starts_with(&anchor) {
            return Err(Error::bad_path(format!(
                "build_dir {} is not under root_dir {}",
                build_dir.display(),
                anchor.display()
            )));
        }
        config.set("task_dir", task_dir.display().to_string());
        config.set("build_dir", build_dir.display().to_string());

        // Expand every in_*/out_* field and the depfile. Expansion must
        // happen before joining: prefix + swap(abs(p)) != abs(prefix + swap(p)).
        let mut in_files = Vec::new();
        let mut out_files = Vec::new();
        let keys: Vec<String> = config.keys().cloned().collect();
        for key in keys {
            let value = match config.get_own(&key) {
                Some(v) => v.clone(),
                None => continue,
            };
            if key.starts_with("in_") {
                let expanded = expand::expand_value(&config, &value, opts)?;
                let joined = map_path_value(&expanded, &mut in_files, &|s| {
                    Ok(paths::make_absolute(Path::new(&paths::normalize(s)), &task_dir))
                })?;
                config.set(key, joined);
            } else if key.starts_with("out_") {
                let expanded = expand::expand_value(&config, &value, opts)?;
                let rebased = map_path_value(&expanded, &mut out_files, &|s| {
                    rebase_output(s, &task_dir, &build_dir)
                })?;
                config.set(key, rebased);
            } else if key == "depfile" {
                let expanded = expand::expand_value(&config, &value, opts)?;
                let mut sink = Vec::new();
                let rebased = map_path_value(&expanded, &mut sink, &|s| {
                    rebase_output(s, &task_dir, &build_dir)
                })?;
                config.set(key, rebased);
            }
        }

        for file in &out_files {
            if let Some(previous) = outputs.claim(file, self.index) {
                tracing::warn!(
                    path = %file.display(),
                    first_task = previous,
                    second_task = self.index,
                    "multiple tasks declare the same output"
                );
            }
        }

        // On a dry run upstream outputs were never written, so the
        // existence check would reject every chained task.
        if !dry_run {
            for file in &in_files {
                if !file.exists() {
                    return Err(Error::MissingInput {
                        path: file.as_path().into(),
                    });
                }
            }
        }

        for file in &out_files {
            if !file.starts_with(&build_dir) {
                return Err(Error::bad_path(format!(
                    "output file {} is not under build_dir {}",
                    file.display(),
                    build_dir.display()
                )));
            }
            if !dry_run {
                if let Some(parent) = file.parent() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let desc = config
            .get_expanded("desc", Value::Null, opts)
            .stringify();
        let command = match config.lookup("command") {
            Some(v) => expand::expand_value(&config, &v.clone(), opts)?,
            None => Value::Null,
        };

        *self.in_files.lock().unwrap() = in_files;
        *self.out_files.lock().unwrap() = out_files;
        *self.task_dir.lock().unwrap() = task_dir;
        *self.desc.lock().unwrap() = desc;
        *self.command.lock().unwrap() = command;
        *self.config.lock().unwrap() = config;
        Ok(())
    }

    /// Force flag, depfile path, depformat, and job count for this task,
    /// all read through the expanded config.
    pub(crate) fn force_flag(&self, opts: &ExpandOpts) -> bool {
        self.config()
            .get_expanded("force", Value::Bool(false), opts)
            .truthy()
    }

    pub(crate) fn depfile(&self, opts: &ExpandOpts) -> Option<PathBuf> {
        match self.config().get_expanded("depfile", Value::Null, opts) {
            Value::Str(s) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    pub(crate) fn depformat(&self, opts: &ExpandOpts) -> Result<DepFormat> {
        match self.config().get_expanded("depformat", Value::Null, opts) {
            Value::Null => Ok(DepFormat::Gcc),
            Value::Str(s) => DepFormat::parse(&s),
            other => Err(Error::validation(format!(
                "invalid depformat {other:?}"
            ))),
        }
    }

    pub(crate) fn job_count(&self, opts: &ExpandOpts) -> usize {
        match self.config().get_expanded("job_count", Value::Int(1), opts) {
            Value::Int(n) if n >= 1 => n as usize,
            _ => 1,
        }
    }

    pub(crate) fn should_fail(&self, opts: &ExpandOpts) -> bool {
        self.config()
            .get_expanded("should_fail", Value::Bool(false), opts)
            .truthy()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("index", &self.index)
            .field("state", &self.state())
            .field("desc", &self.desc())
            .finish()
    }
}

/// Recursively await every task reference in a value, replacing each with
/// its resolved output list. Lists are traversed; other values pass
/// through.
pub(crate) fn resolve_value(
    value: Value,
) -> BoxFuture<std::result::Result<Value, UpstreamFailed>> {
    Box::pin(async move {
        match value {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(resolve_value(item).await?);
                }
                Ok(Value::List(out))
            }
            Value::Task(task) => match task.wait().await {
                Outcome::Success(paths) => Ok(Value::from_paths(&paths)),
                Outcome::Failed(_) | Outcome::Cancelled => Err(UpstreamFailed),
            },
            other => Ok(other),
        }
    })
}

/// Process-wide registry of claimed output paths, for duplicate detection.
#[derive(Default)]
pub(crate) struct OutputRegistry(Mutex<HashMap<PathBuf, usize>>);

impl OutputRegistry {
    /// Claim an output for a task; returns the previous owner on conflict.
    pub(crate) fn claim(&self, path: &Path, task_index: usize) -> Option<usize> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut map = self.0.lock().unwrap();
        match map.get(&canonical) {
            Some(&previous) if previous != task_index => Some(previous),
            Some(_) => None,
            None => {
                map.insert(canonical, task_index);
                None
            }
        }
    }
}

fn expand_dir(
    config: &Config,
    key: &str,
    repo_dir: &Path,
    opts: &ExpandOpts,
) -> Result<PathBuf> {
    match config.get_expanded(key, Value::Null, opts) {
        Value::Str(s) if !s.is_empty() => {
            Ok(paths::make_absolute(Path::new(&s), repo_dir))
        }
        Value::Null => Ok(repo_dir.to_path_buf()),
        other => Err(Error::bad_path(format!("{key} expanded to {other:?}"))),
    }
}

/// Map a path-bearing value (string or nested list) through `f`,
/// collecting the mapped paths and returning the substituted value.
fn map_path_value(
    value: &Value,
    collected: &mut Vec<PathBuf>,
    f: &dyn Fn(&str) -> Result<PathBuf>,
) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::List(items) => {
            let mapped = items
                .iter()
                .map(|v| map_path_value(v, collected, f))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(mapped))
        }
        Value::Str(s) => {
            let path = f(s)?;
            collected.push(path.clone());
            Ok(Value::Str(path.display().to_string()))
        }
        other => Err(Error::validation(format!(
            "expected a file path or list of paths, got {other:?}"
        ))),
    }
}

/// Rebase an output path into the build directory: paths already under
/// `build_dir` stay put, paths under `task_dir` are re-rooted, other
/// absolute paths are errors, relative paths land under `build_dir`.
/// `build_dir` is checked first since it can itself be under `task_dir`.
fn rebase_output(file: &str, task_dir: &Path, build_dir: &Path) -> Result<PathBuf> {
    let norm = paths::normalize(file);
    let p = Path::new(&norm);
    if p.is_absolute() {
        if p.starts_with(build_dir) {
            return Ok(p.to_path_buf());
        }
        if let Ok(rel) = p.strip_prefix(task_dir) {
            return Ok(build_dir.join(rel));
        }
        return Err(Error::bad_path(format!(
            "output file has an absolute path outside task_dir and build_dir: {norm}"
        )));
    }
    Ok(build_dir.join(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_relative_lands_in_build_dir() {
        let out = rebase_output("obj/foo.o", Path::new("/src"), Path::new("/src/build"))
            .unwrap();
        assert_eq!(out, PathBuf::from("/src/build/obj/foo.o"));
    }

    #[test]
    fn test_rebase_task_dir_path_moves_to_build_dir() {
        let out = rebase_output("/src/foo.o", Path::new("/src"), Path::new("/src/build"))
            .unwrap();
        assert_eq!(out, PathBuf::from("/src/build/foo.o"));
    }

    #[test]
    fn test_rebase_build_dir_path_stays() {
        let out =
            rebase_output("/src/build/foo.o", Path::new("/src"), Path::new("/src/build"))
                .unwrap();
        assert_eq!(out, PathBuf::from("/src/build/foo.o"));
    }

    #[test]
    fn test_rebase_foreign_absolute_is_error() {
        assert!(rebase_output("/etc/passwd", Path::new("/src"), Path::new("/src/build"))
            .is_err());
    }

    #[test]
    fn test_output_registry_detects_duplicates() {
        let registry = OutputRegistry::default();
        assert_eq!(registry.claim(Path::new("/tmp/x.o"), 1), None);
        assert_eq!(registry.claim(Path::new("/tmp/x.o"), 2), Some(1));
        assert_eq!(registry.claim(Path::new("/tmp/x.o"), 1), None);
    }

    #[tokio::test]
    async fn test_promise_completes_once_and_is_shared() {
        let task = std::sync::Arc::new(Task::new(0, Config::new()));
        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.wait().await })
        };
        task.finish(
            TaskState::Succeeded,
            Outcome::Success(vec![PathBuf::from("/out/a.o")]),
        );
        let from_spawn = waiter.await.unwrap();
        let direct = task.wait().await;
        assert_eq!(from_spawn, direct);
        assert_eq!(
            direct,
            Outcome::Success(vec![PathBuf::from("/out/a.o")])
        );
    }

    #[tokio::test]
    async fn test_resolve_value_substitutes_outputs() {
        let task = std::sync::Arc::new(Task::new(0, Config::new()));
        task.finish(
            TaskState::Succeeded,
            Outcome::Success(vec![PathBuf::from("/b/x.o"), PathBuf::from("/b/y.o")]),
        );
        let value = Value::List(vec![
            Value::Str("lib.o".into()),
            Value::Task(task),
        ]);
        let resolved = resolve_value(value).await.unwrap();
        assert_eq!(
            resolved.string_list(),
            vec!["lib.o".to_string(), "/b/x.o".to_string(), "/b/y.o".to_string()]
        );
    }

    #[tokio::test]
    async fn test_resolve_value_propagates_failure() {
        let task = std::sync::Arc::new(Task::new(0, Config::new()));
        task.finish(TaskState::Failed, Outcome::Failed("boom".into()));
        let result = resolve_value(Value::Task(task)).await;
        assert!(result.is_err());
    }
}
