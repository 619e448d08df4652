//! The scheduler: owns the global config, the task registry and queue,
//! the job pool, and the drive loop that runs every queued task to a
//! terminal state.
//!
//! Concurrency model: one cooperative coordinator plus one spawned tokio
//! task per build task. Build tasks suspend awaiting upstream promises,
//! job slots, and subprocess completion; everything else is synchronous.
//!
//! Failure propagates along promise edges only: a failed task cancels its
//! direct and transitive dependents, while unrelated tasks keep running
//! and dispatching.

use crate::config::Config;
use crate::expand::ExpandOpts;
use crate::graph;
use crate::output::Reporter;
use crate::paths;
use crate::pool::JobPool;
use crate::rebuild::{self, RebuildCheck};
use crate::runner;
use crate::task::{Outcome, OutputRegistry, Task, TaskState};
use crate::{Error, Limits, Result};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Build-wide options, typically populated from the command line.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Parallel job slots; 0 means unbounded.
    pub jobs: usize,
    pub verbosity: u8,
    pub quiet: bool,
    pub dry_run: bool,
    pub debug: bool,
    /// Rebuild everything regardless of mtimes.
    pub force: bool,
    /// Log every template expansion step.
    pub trace: bool,
    /// Randomize queue order to shake out missing dependency edges.
    pub shuffle: bool,
    pub use_color: bool,
    pub root_dir: PathBuf,
    pub limits: Limits,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            verbosity: 0,
            quiet: false,
            dry_run: false,
            debug: false,
            force: false,
            trace: false,
            shuffle: false,
            use_color: false,
            root_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            limits: Limits::default(),
        }
    }
}

#[derive(Default)]
struct Counters {
    started: AtomicUsize,
    running: AtomicUsize,
    passed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Final counts for one drive of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub started: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl BuildSummary {
    /// Zero failures and zero cancellations.
    pub fn success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            -1
        }
    }
}

/// The build context: global config, task registry, queue, and job pool.
///
/// There is no process-wide state; the entry point owns an
/// `Arc<BuildContext>` and hands it to scripts, callbacks, and the drive
/// loop explicitly.
pub struct BuildContext {
    options: BuildOptions,
    pool: JobPool,
    reporter: Reporter,
    root_config: Mutex<Arc<Config>>,
    tasks: Mutex<Vec<Arc<Task>>>,
    queue: Mutex<VecDeque<Arc<Task>>>,
    outputs: OutputRegistry,
    next_index: AtomicUsize,
    counters: Counters,
    weak_self: std::sync::Weak<BuildContext>,
}

impl BuildContext {
    pub fn new(options: BuildOptions) -> Arc<Self> {
        let reporter = Reporter::new(options.quiet, options.verbosity, options.use_color);
        let pool = JobPool::new(options.jobs);
        let root_config = Arc::new(default_root_config(&options));
        Arc::new_cyclic(|weak| Self {
            options,
            pool,
            reporter,
            root_config: Mutex::new(root_config),
            tasks: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            outputs: OutputRegistry::default(),
            next_index: AtomicUsize::new(0),
            counters: Counters::default(),
            weak_self: weak.clone(),
        })
    }

    /// A strong handle to this context; callbacks hold these to spawn
    /// tasks mid-build. Infallible while any caller holds the context.
    fn shared(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("build context dropped")
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub(crate) fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn expand_opts(&self) -> ExpandOpts {
        ExpandOpts {
            limits: self.options.limits.clone(),
            trace: self.options.trace,
        }
    }

    /// The global config every task config chains to.
    pub fn root_config(&self) -> Arc<Config> {
        self.root_config.lock().unwrap().clone()
    }

    /// Replace the global config (merging CLI `--key=value` extras, or a
    /// script host installing its module config).
    pub fn set_root_config(&self, config: Config) {
        *self.root_config.lock().unwrap() = Arc::new(config);
    }

    /// Construct a task from config layers. The layers are folded left to
    /// right over the global config; the task is registered but not
    /// queued.
    pub fn task<'a>(
        &self,
        layers: impl IntoIterator<Item = &'a Config>,
    ) -> Result<Arc<Task>> {
        self.task_with_parent(self.root_config(), layers)
    }

    /// Like [`BuildContext::task`], but chaining to an explicit parent
    /// (a script host passes its module config here).
    pub fn task_with_parent<'a>(
        &self,
        parent: Arc<Config>,
        layers: impl IntoIterator<Item = &'a Config>,
    ) -> Result<Arc<Task>> {
        let mut config = Config::merged(None, layers);
        config.set_parent(parent, &self.options.limits)?;
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let task = Arc::new(Task::new(index, config));
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    /// Construct, register, and queue a task in one step. This is the
    /// entry scripts and callbacks use.
    pub fn spawn<'a>(
        &self,
        layers: impl IntoIterator<Item = &'a Config>,
    ) -> Result<Arc<Task>> {
        let task = self.task(layers)?;
        self.queue_task(&task);
        Ok(task)
    }

    /// Print the final tally through the build's reporter.
    pub fn report_summary(&self, summary: &BuildSummary) {
        self.reporter.tally(summary);
    }

    /// Queue a task (and, first, every task its config references, so
    /// promise targets are always scheduled).
    pub fn queue_task(&self, task: &Arc<Task>) {
        if !task.mark_queued() {
            return;
        }
        let mut refs = Vec::new();
        graph::collect_task_refs(&task.config(), &mut refs);
        for dep in refs {
            self.queue_task(&dep);
        }
        self.queue.lock().unwrap().push_back(task.clone());
    }

    pub fn queue_all(&self) {
        let tasks: Vec<Arc<Task>> = self.tasks.lock().unwrap().clone();
        for task in tasks {
            self.queue_task(&task);
        }
    }

    /// All registered tasks, in creation order.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            started: self.counters.started.load(Ordering::SeqCst),
            passed: self.counters.passed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
            cancelled: self.counters.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Run every queued task to a terminal state.
    ///
    /// Tasks created while the build runs (by callback commands) join the
    /// end of the queue and are drained by the same loop. Handles are
    /// awaited in creation order, which walks the graph in dependency
    /// order without any extra bookkeeping.
    pub async fn drive(&self) -> Result<BuildSummary> {
        graph::validate(&self.tasks())?;

        let mut pending: VecDeque<(Arc<Task>, JoinHandle<()>)> = VecDeque::new();
        loop {
            let mut batch: Vec<Arc<Task>> = {
                let mut queue = self.queue.lock().unwrap();
                queue.drain(..).collect()
            };
            if self.options.shuffle && batch.len() > 1 {
                tracing::debug!(count = batch.len(), "shuffling task queue");
                batch.shuffle(&mut rand::thread_rng());
            }
            for task in batch {
                self.counters.started.fetch_add(1, Ordering::SeqCst);
                let ctx = self.shared();
                let spawned = task.clone();
                let handle = tokio::spawn(async move {
                    task_main(spawned, ctx).await;
                });
                pending.push_back((task, handle));
            }

            let Some((task, handle)) = pending.pop_front() else {
                if self.queued_count() == 0 {
                    break;
                }
                continue;
            };
            if handle.await.is_err() {
                tracing::error!(task = task.index(), "task panicked");
                if !is_terminal(task.state()) {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    task.finish(
                        TaskState::Failed,
                        Outcome::Failed("task panicked".to_string()),
                    );
                }
            }
        }

        Ok(self.summary())
    }
}

fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Succeeded | TaskState::Failed | TaskState::Skipped | TaskState::Cancelled
    )
}

/// One task's life, from awaiting inputs to its terminal state.
async fn task_main(task: Arc<Task>, ctx: Arc<BuildContext>) {
    let opts = ctx.expand_opts();

    task.set_state(TaskState::AwaitingInputs);
    if task.resolve_inputs().await.is_err() {
        cancel(&task, &ctx);
        return;
    }

    if let Err(err) = task.init(&opts, ctx.options.dry_run, &ctx.outputs) {
        fail(&task, &ctx, err);
        return;
    }
    if ctx.options.debug {
        tracing::debug!(task = ?task, "task initialized");
    }

    // A task with no command is a no-op grouping node.
    if task.command().is_null() {
        ctx.counters.passed.fetch_add(1, Ordering::SeqCst);
        task.finish(TaskState::Succeeded, Outcome::Success(task.out_files()));
        return;
    }

    let depformat = match task.depformat(&opts) {
        Ok(format) => format,
        Err(err) => {
            fail(&task, &ctx, err);
            return;
        }
    };
    let in_files = task.in_files();
    let out_files = task.out_files();
    let depfile = task.depfile(&opts);
    let task_dir = task.task_dir();
    let reason = rebuild::needs_rebuild(&RebuildCheck {
        force: ctx.options.force || task.force_flag(&opts),
        in_files: &in_files,
        out_files: &out_files,
        depfile: depfile.as_deref(),
        depformat,
        task_dir: &task_dir,
    });
    let Some(reason) = reason else {
        ctx.counters.skipped.fetch_add(1, Ordering::SeqCst);
        task.finish(TaskState::Skipped, Outcome::Success(task.out_files()));
        return;
    };
    task.set_reason(reason.clone());

    let permit = ctx.pool.acquire(task.job_count(&opts)).await;
    task.set_state(TaskState::Running);
    let slot = ctx.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
    let total = ctx.counters.started.load(Ordering::SeqCst);
    ctx.reporter().banner(slot, total, &task.desc());
    ctx.reporter().reason(&reason);

    let result = runner::run_commands(&task, &ctx).await;
    drop(permit);

    match result {
        Ok(()) => {
            ctx.counters.passed.fetch_add(1, Ordering::SeqCst);
            task.finish(TaskState::Succeeded, Outcome::Success(task.out_files()));
        }
        Err(err) => fail(&task, &ctx, err),
    }
}

fn cancel(task: &Arc<Task>, ctx: &BuildContext) {
    ctx.counters.cancelled.fetch_add(1, Ordering::SeqCst);
    task.finish(TaskState::Cancelled, Outcome::Cancelled);
}

fn fail(task: &Arc<Task>, ctx: &BuildContext, err: Error) {
    tracing::error!(task = task.index(), %err, "task failed");
    ctx.reporter().failure(&task.desc(), &err.to_string());
    ctx.counters.failed.fetch_add(1, Ordering::SeqCst);
    task.finish(TaskState::Failed, Outcome::Failed(err.to_string()));
}

/// The well-known fields every build starts from; a script host overlays
/// its own module fields on top of these.
fn default_root_config(options: &BuildOptions) -> Config {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let root_dir = paths::make_absolute(&options.root_dir, &cwd);
    let repo_name = root_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root = root_dir.display().to_string();
    Config::new()
        .with("desc", "{command}")
        .with("root_dir", root.clone())
        .with("root_path", format!("{root}/build.hancho"))
        .with("repo_name", repo_name)
        .with("repo_dir", root.clone())
        .with("mod_name", "build")
        .with("mod_dir", root.clone())
        .with("mod_path", format!("{root}/build.hancho"))
        .with("build_root", "{root_dir}/build")
        .with("build_tag", "")
        .with("task_dir", "{mod_dir}")
        .with(
            "build_dir",
            "{build_root}/{build_tag}/{repo_name}/{rel_path(task_dir, repo_dir)}",
        )
}
