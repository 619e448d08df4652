//! Scheduler behavior: job-slot accounting, job hogs, dynamic task
//! graphs, and shuffle mode. Callback commands double as probes here,
//! since they run while the task holds its job slots.

use hancho_core::{
    BuildContext, BuildOptions, Config, TaskCallback, TaskState, Value,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const POOL: usize = 4;

fn options(root: &Path) -> BuildOptions {
    BuildOptions {
        quiet: true,
        jobs: POOL,
        root_dir: root.to_path_buf(),
        ..BuildOptions::default()
    }
}

struct SlotProbe {
    load: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    violated: Arc<AtomicBool>,
}

impl SlotProbe {
    fn new() -> Self {
        Self {
            load: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            violated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A task whose callback records the concurrent slot load while it
    /// holds `slots` job slots. A hog additionally asserts it runs alone.
    fn probe_config(&self, slots: usize, hog: bool) -> Config {
        let load = self.load.clone();
        let peak = self.peak.clone();
        let violated = self.violated.clone();
        let callback = TaskCallback::new(move |_task| {
            let load = load.clone();
            let peak = peak.clone();
            let violated = violated.clone();
            Box::pin(async move {
                let before = load.fetch_add(slots, Ordering::SeqCst);
                if hog && before != 0 {
                    violated.store(true, Ordering::SeqCst);
                }
                let now = before + slots;
                peak.fetch_max(now, Ordering::SeqCst);
                if now > POOL {
                    violated.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                load.fetch_sub(slots, Ordering::SeqCst);
                Ok(Value::Null)
            })
        });
        Config::new()
            .with("job_count", Value::Int(slots as i64))
            .with("command", Value::Callback(callback))
    }
}

#[tokio::test]
async fn test_job_slots_never_oversubscribed() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = BuildContext::new(options(dir.path()));
    let probe = SlotProbe::new();

    for i in 0..30 {
        let config = probe.probe_config(i % POOL + 1, false);
        ctx.spawn([&config]).unwrap();
    }
    // A task that wants the whole pool must run alone.
    let hog = probe.probe_config(POOL, true);
    ctx.spawn([&hog]).unwrap();
    for i in 0..30 {
        let config = probe.probe_config((i + 2) % POOL + 1, false);
        ctx.spawn([&config]).unwrap();
    }

    let summary = ctx.drive().await.unwrap();
    assert_eq!(summary.passed, 61);
    assert!(!probe.violated.load(Ordering::SeqCst));
    assert!(probe.peak.load(Ordering::SeqCst) <= POOL);
}

#[tokio::test]
async fn test_job_count_beyond_pool_reserves_whole_pool() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = BuildContext::new(options(dir.path()));
    let probe = SlotProbe::new();

    // Far more slots than the pool holds; clamped, runs alone.
    let greedy = {
        let mut config = probe.probe_config(POOL, true);
        config.set("job_count", Value::Int(64));
        config
    };
    ctx.spawn([&greedy]).unwrap();
    for _ in 0..8 {
        let config = probe.probe_config(1, false);
        ctx.spawn([&config]).unwrap();
    }

    let summary = ctx.drive().await.unwrap();
    assert_eq!(summary.passed, 9);
    assert!(!probe.violated.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dynamic_task_graph_from_callback() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    std::fs::write(root.join("filelist.txt"), "data.txt\n").unwrap();
    std::fs::write(root.join("data.txt"), "payload\n").unwrap();

    let ctx = BuildContext::new(options(root));
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // Task A reads a generated file list and queues task B for each entry
    // while the build is already running.
    let generator = {
        let ctx = ctx.clone();
        let order = order.clone();
        TaskCallback::new(move |task| {
            let ctx = ctx.clone();
            let order = order.clone();
            Box::pin(async move {
                let listing =
                    std::fs::read_to_string(task.task_dir().join("filelist.txt"))?;
                for line in listing.lines().filter(|l| !l.is_empty()) {
                    let fields = Config::new()
                        .with("command", "cp {in_src} {out_copy}")
                        .with("in_src", line)
                        .with("out_copy", format!("{line}.copy"));
                    ctx.spawn([&fields])?;
                }
                order.lock().unwrap().push("generator");
                Ok(Value::Null)
            })
        })
    };
    let a_config = Config::new().with("command", Value::Callback(generator));
    let a = ctx.spawn([&a_config]).unwrap();

    let summary = ctx.drive().await.unwrap();
    assert_eq!(summary.started, 2);
    assert_eq!(summary.passed, 2);
    assert_eq!(a.state(), TaskState::Succeeded);
    assert_eq!(*order.lock().unwrap(), vec!["generator"]);

    let copied = ctx
        .tasks()
        .iter()
        .find_map(|t| t.out_files().first().cloned())
        .unwrap();
    assert!(copied.ends_with("data.txt.copy"));
    assert_eq!(std::fs::read_to_string(copied).unwrap(), "payload\n");
}

#[tokio::test]
async fn test_promise_chain_orders_execution() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    std::fs::write(root.join("seed.txt"), "0\n").unwrap();

    // A chain a -> b -> c built only from promise edges, driven with
    // shuffle on; the ordering guarantee must hold regardless of queue
    // order.
    let opts = BuildOptions {
        shuffle: true,
        ..options(root)
    };
    let ctx = BuildContext::new(opts);

    let a_fields = Config::new()
        .with("command", "cat {in_src} > {out_txt} && echo a >> {out_txt}")
        .with("in_src", "seed.txt")
        .with("out_txt", "a.txt");
    let a = ctx.spawn([&a_fields]).unwrap();

    let b_fields = Config::new()
        .with("command", "cat {in_prev} > {out_txt} && echo b >> {out_txt}")
        .with("in_prev", Value::Task(a.clone()))
        .with("out_txt", "b.txt");
    let b = ctx.spawn([&b_fields]).unwrap();

    let c_fields = Config::new()
        .with("command", "cat {in_prev} > {out_txt} && echo c >> {out_txt}")
        .with("in_prev", Value::Task(b.clone()))
        .with("out_txt", "c.txt");
    let c = ctx.spawn([&c_fields]).unwrap();

    let summary = ctx.drive().await.unwrap();
    assert_eq!(summary.passed, 3);
    let content = std::fs::read_to_string(&c.out_files()[0]).unwrap();
    assert_eq!(content, "0\na\nb\nc\n");
}

#[tokio::test]
async fn test_callback_failure_fails_task() {
    let dir = tempfile::TempDir::new().unwrap();
    let ctx = BuildContext::new(options(dir.path()));

    let callback = TaskCallback::new(|_task| {
        Box::pin(async {
            Err::<Value, _>(hancho_core::Error::Validation(
                "refusing to cooperate".into(),
            ))
        })
    });
    let fields = Config::new().with("command", Value::Callback(callback));
    let task = ctx.spawn([&fields]).unwrap();
    let summary = ctx.drive().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(task.state(), TaskState::Failed);
}

#[tokio::test]
async fn test_callback_can_rewrite_outputs() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    let ctx = BuildContext::new(options(root));

    // The callback decides its real outputs at run time; downstream tasks
    // see the rewritten list through the promise.
    let callback = TaskCallback::new(|task| {
        Box::pin(async move {
            let out = task.task_dir().join("discovered.txt");
            std::fs::write(&out, "found\n")?;
            task.set_out_files(vec![out]);
            Ok(Value::Null)
        })
    });
    let a_fields = Config::new().with("command", Value::Callback(callback));
    let a = ctx.spawn([&a_fields]).unwrap();

    let b_fields = Config::new()
        .with("command", "cat {in_src} > {out_txt}")
        .with("in_src", Value::Task(a.clone()))
        .with("out_txt", "final.txt");
    let b = ctx.spawn([&b_fields]).unwrap();

    let summary = ctx.drive().await.unwrap();
    assert_eq!(summary.passed, 2);
    assert_eq!(std::fs::read_to_string(&b.out_files()[0]).unwrap(), "found\n");
}
