//! The `.hancho` build manifest loader.
//!
//! A manifest is a JSON document declaring reusable config ("rules"),
//! imports of other manifests, subrepo loads, and tasks. Every string in
//! the document may contain templates; they expand lazily when tasks run,
//! so a rule can reference fields its tasks supply later.
//!
//! ```json
//! {
//!   "rules": {
//!     "compile": {
//!       "desc": "Compiling {in_src}",
//!       "command": "cc -MMD -c {in_src} -o {out_obj}",
//!       "out_obj": "{swap_ext(in_src, '.o')}",
//!       "depfile": "{swap_ext(out_obj, '.d')}"
//!     }
//!   },
//!   "tasks": [
//!     {"rule": "compile", "name": "main_o", "in_src": "main.cpp"},
//!     {"command": "cc {in_objs} -o {out_bin}",
//!      "in_objs": [{"task": "main_o"}], "out_bin": "app"}
//!   ]
//! }
//! ```
//!
//! An `in_*` value of the form `{"task": "<name>"}` is the declarative
//! spelling of a promise edge: it resolves to the named task's eventual
//! output list.

use crate::config::Config;
use crate::scheduler::BuildContext;
use crate::task::Task;
use crate::value::Value;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Deserialize, Default)]
struct Manifest {
    /// Fields merged into the module config.
    #[serde(default)]
    config: serde_json::Map<String, Json>,
    /// name -> path of another manifest whose exports bind under `name`.
    #[serde(default)]
    imports: IndexMap<String, String>,
    /// Like imports, but re-rooted as an isolated subrepo.
    #[serde(default)]
    repos: IndexMap<String, String>,
    /// Reusable config prototypes, referenced by tasks via `"rule"`.
    #[serde(default)]
    rules: IndexMap<String, Json>,
    #[serde(default)]
    tasks: Vec<Json>,
    /// Anything else is exported to importers.
    #[serde(flatten)]
    exports: serde_json::Map<String, Json>,
}

/// Scope a module loads under: which repo owns it.
#[derive(Clone)]
struct RepoScope {
    repo_name: String,
    repo_dir: PathBuf,
}

/// The host surface scripts see: task construction, config prototypes,
/// manifest loading, and subrepo loading.
pub struct ScriptHost {
    ctx: Arc<BuildContext>,
    /// Repo loads dedupe on canonical path.
    repos: Mutex<HashMap<PathBuf, Config>>,
    /// Task names, for `{"task": name}` references and target selection.
    named: Mutex<HashMap<String, Arc<Task>>>,
}

impl ScriptHost {
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        Self {
            ctx,
            repos: Mutex::new(HashMap::new()),
            named: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<BuildContext> {
        &self.ctx
    }

    /// Load the entry manifest. Tasks it declares are registered with the
    /// scheduler; call `queue_all` (or queue a target selection) before
    /// driving.
    pub fn load_root(&self, root_file: &str) -> Result<Config> {
        let root_config = self.ctx.root_config();
        let root_dir = match root_config.get("root_dir") {
            Value::Str(s) => PathBuf::from(s),
            _ => std::env::current_dir()?,
        };
        let mod_path = crate::paths::make_absolute(Path::new(root_file), &root_dir);
        let scope = RepoScope {
            repo_name: root_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            repo_dir: root_dir,
        };
        self.load_module(&mod_path, &scope)
    }

    /// Load a manifest and return its exported config, with
    /// underscore-prefixed names filtered out.
    fn load_module(&self, mod_path: &Path, scope: &RepoScope) -> Result<Config> {
        tracing::info!(path = %mod_path.display(), repo = %scope.repo_name, "loading manifest");
        let text = std::fs::read_to_string(mod_path)
            .map_err(|e| Error::script(mod_path, format!("cannot read: {e}")))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| Error::script(mod_path, format!("invalid manifest: {e}")))?;

        let mod_dir = mod_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mod_name = mod_path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut module = Config::new()
            .with("repo_name", scope.repo_name.clone())
            .with("repo_dir", scope.repo_dir.display().to_string())
            .with("mod_name", mod_name)
            .with("mod_dir", mod_dir.display().to_string())
            .with("mod_path", mod_path.display().to_string());
        module.set_parent(self.ctx.root_config(), &self.ctx.options().limits)?;

        for (key, json) in &manifest.config {
            let value = self.json_to_value(json, mod_path)?;
            module.set(key.clone(), value);
        }

        for (name, path) in &manifest.imports {
            let target = self.resolve_script_path(path, &module, mod_path)?;
            let exported = self.load_module(&target, scope)?;
            module.set(name.clone(), Value::Config(exported));
        }

        for (name, path) in &manifest.repos {
            let exported = self.load_repo(path, &module, mod_path)?;
            module.set(name.clone(), Value::Config(exported));
        }

        for (name, json) in &manifest.rules {
            let rule = match self.json_to_value(json, mod_path)? {
                Value::Config(c) => c,
                other => {
                    return Err(Error::script(
                        mod_path,
                        format!("rule '{name}' must be an object, got {other:?}"),
                    ))
                }
            };
            module.set(name.clone(), Value::Config(rule));
        }

        let module_arc = Arc::new(module.clone());
        for json in &manifest.tasks {
            self.declare_task(json, &module_arc, mod_path)?;
        }

        // Export everything the module defined except private names.
        let mut exported = Config::new();
        for (key, value) in module.iter() {
            if !key.starts_with('_') {
                exported.set(key.clone(), value.clone());
            }
        }
        for (key, json) in &manifest.exports {
            if !key.starts_with('_') {
                exported.set(key.clone(), self.json_to_value(json, mod_path)?);
            }
        }
        Ok(exported)
    }

    /// Load a manifest as an isolated subrepo: `repo_name`/`repo_dir` are
    /// re-rooted, which lands its outputs under
    /// `{build_root}/{repo_name}/...` through the standard build_dir
    /// template. Loads dedupe on canonical path.
    fn load_repo(&self, path: &str, module: &Config, mod_path: &Path) -> Result<Config> {
        let target = self.resolve_script_path(path, module, mod_path)?;
        let canonical = target.canonicalize().unwrap_or_else(|_| target.clone());
        if let Some(cached) = self.repos.lock().unwrap().get(&canonical) {
            return Ok(cached.clone());
        }
        let repo_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let scope = RepoScope {
            repo_name: repo_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            repo_dir,
        };
        let exported = self.load_module(&canonical, &scope)?;
        self.repos
            .lock()
            .unwrap()
            .insert(canonical, exported.clone());
        Ok(exported)
    }

    /// Declare (but do not queue) one task from its manifest object.
    fn declare_task(
        &self,
        json: &Json,
        module: &Arc<Config>,
        mod_path: &Path,
    ) -> Result<Arc<Task>> {
        let object = json.as_object().ok_or_else(|| {
            Error::script(mod_path, format!("task must be an object, got {json}"))
        })?;

        let mut rule_layer = None;
        let mut fields = Config::new();
        for (key, value) in object {
            if key == "rule" {
                let rule_name = value.as_str().ok_or_else(|| {
                    Error::script(mod_path, "task 'rule' must be a string")
                })?;
                match module.lookup(rule_name) {
                    Some(Value::Config(rule)) => rule_layer = Some(rule.clone()),
                    _ => {
                        return Err(Error::script(
                            mod_path,
                            format!("task references unknown rule '{rule_name}'"),
                        ))
                    }
                }
                continue;
            }
            fields.set(key.clone(), self.json_to_value(value, mod_path)?);
        }

        let layers: Vec<&Config> = match &rule_layer {
            Some(rule) => vec![rule, &fields],
            None => vec![&fields],
        };
        let task = self.ctx.task_with_parent(module.clone(), layers)?;

        if let Some(Value::Str(name)) = fields.get_own("name") {
            self.named
                .lock()
                .unwrap()
                .insert(name.clone(), task.clone());
        }
        Ok(task)
    }

    fn resolve_script_path(
        &self,
        path: &str,
        module: &Config,
        mod_path: &Path,
    ) -> Result<PathBuf> {
        // The path itself may be a template ("{mod_dir}/rules.hancho").
        let expanded = module
            .expand_str(path)
            .map_err(|e| Error::script(mod_path, format!("bad script path '{path}': {e}")))?
            .stringify();
        let mod_dir = match module.get("mod_dir") {
            Value::Str(s) => PathBuf::from(s),
            _ => PathBuf::from("."),
        };
        Ok(crate::paths::make_absolute(Path::new(&expanded), &mod_dir))
    }

    fn json_to_value(&self, json: &Json, mod_path: &Path) -> Result<Value> {
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.json_to_value(v, mod_path))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Json::Object(map) => {
                // `{"task": "<name>"}` is a promise edge.
                if map.len() == 1 {
                    if let Some(Json::String(name)) = map.get("task") {
                        let named = self.named.lock().unwrap();
                        let task = named.get(name).ok_or_else(|| {
                            Error::script(
                                mod_path,
                                format!("reference to unknown task '{name}'"),
                            )
                        })?;
                        return Ok(Value::Task(task.clone()));
                    }
                }
                let mut config = Config::new();
                for (key, value) in map {
                    config.set(key.clone(), self.json_to_value(value, mod_path)?);
                }
                Value::Config(config)
            }
        })
    }

    /// Queue declared tasks: all of them, or only those whose `name`
    /// matches the target regex.
    pub fn queue_targets(&self, target: Option<&str>) -> Result<usize> {
        match target {
            None => {
                self.ctx.queue_all();
            }
            Some(pattern) => {
                let regex = regex::Regex::new(pattern)
                    .map_err(|e| Error::validation(format!("bad target regex: {e}")))?;
                let opts = self.ctx.expand_opts();
                for task in self.ctx.tasks() {
                    let name = task
                        .config()
                        .get_expanded("name", Value::Null, &opts)
                        .stringify();
                    if !name.is_empty() && regex.is_match(&name) {
                        tracing::info!(task = name, "queueing target");
                        self.ctx.queue_task(&task);
                    }
                }
            }
        }
        Ok(self.ctx.queued_count())
    }
}
