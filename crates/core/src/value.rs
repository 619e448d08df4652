//! The dynamically-typed value model shared by configs, templates, and tasks.

use crate::config::Config;
use crate::task::Task;
use crate::Result;
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Arguments to a helper call inside a template expression.
#[derive(Debug, Default, Clone)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            positional: args,
            named: IndexMap::new(),
        }
    }

    /// Fetch the nth positional argument, or Null.
    pub fn arg(&self, n: usize) -> Value {
        self.positional.get(n).cloned().unwrap_or(Value::Null)
    }
}

/// A pure helper callable from template expressions.
///
/// Helpers receive the config they are being evaluated against so that
/// path-relative helpers like `glob` can anchor themselves.
#[derive(Clone)]
pub struct NativeFn {
    pub name: &'static str,
    f: Arc<dyn Fn(&Config, &CallArgs) -> Result<Value> + Send + Sync>,
}

impl NativeFn {
    pub fn new(
        name: &'static str,
        f: impl Fn(&Config, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self { name, f: Arc::new(f) }
    }

    pub fn call(&self, config: &Config, args: &CallArgs) -> Result<Value> {
        (self.f)(config, args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

/// A command callback: invoked with the task when it runs.
///
/// The returned future resolves to the callback's result value; returning
/// normally means success, an error fails the task. Callbacks may construct
/// and queue new tasks (dynamic task graphs).
#[derive(Clone)]
pub struct TaskCallback {
    f: Arc<dyn Fn(Arc<Task>) -> BoxFuture<Result<Value>> + Send + Sync>,
}

impl TaskCallback {
    pub fn new(
        f: impl Fn(Arc<Task>) -> BoxFuture<Result<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self { f: Arc::new(f) }
    }

    pub fn invoke(&self, task: Arc<Task>) -> BoxFuture<Result<Value>> {
        (self.f)(task)
    }
}

impl fmt::Debug for TaskCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<callback>")
    }
}

/// A config/template value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Config(Config),
    /// A reference to another task; stands for that task's eventual
    /// output-file list.
    Task(Arc<Task>),
    /// A helper callable in template expressions.
    Func(NativeFn),
    /// A command callback invoked with the task.
    Callback(TaskCallback),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Config> {
        match self {
            Value::Config(c) => Some(c),
            _ => None,
        }
    }

    /// Truthiness: Null, false, zero, the empty string, and the empty list
    /// are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            _ => true,
        }
    }

    /// Flatten nested lists and drop Nulls, yielding a flat value list.
    pub fn flatten(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Value>) {
        match self {
            Value::Null => {}
            Value::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other.clone()),
        }
    }

    /// Convert to the string form used when substituting into templates:
    /// Null is empty, lists are flattened and joined with single spaces.
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(_) => {
                let parts: Vec<String> =
                    self.flatten().iter().map(Value::stringify).collect();
                parts.join(" ")
            }
            Value::Config(c) => format!("{c:?}"),
            Value::Task(t) => format!("<task {}>", t.index()),
            Value::Func(f) => format!("{f:?}"),
            Value::Callback(c) => format!("{c:?}"),
        }
    }

    /// Flatten into strings, dropping Nulls; used for file lists.
    pub fn string_list(&self) -> Vec<String> {
        self.flatten().iter().map(Value::stringify).collect()
    }

    pub fn from_paths(paths: &[PathBuf]) -> Value {
        Value::List(
            paths
                .iter()
                .map(|p| Value::Str(p.display().to_string()))
                .collect(),
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Config(a), Value::Config(b)) => a == b,
            (Value::Task(a), Value::Task(b)) => Arc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(&a.f, &b.f),
            (Value::Callback(a), Value::Callback(b)) => Arc::ptr_eq(&a.f, &b.f),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Config> for Value {
    fn from(c: Config) -> Self {
        Value::Config(c)
    }
}

impl From<Arc<Task>> for Value {
    fn from(t: Arc<Task>) -> Self {
        Value::Task(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_drops_nulls_and_nesting() {
        let v = Value::List(vec![
            Value::Null,
            Value::Str("a".into()),
            Value::List(vec![Value::Str("b".into()), Value::Null]),
        ]);
        let flat = v.flatten();
        assert_eq!(flat, vec![Value::Str("a".into()), Value::Str("b".into())]);
    }

    #[test]
    fn test_stringify_joins_with_single_spaces() {
        let v = Value::List(vec![
            Value::Str("x.c".into()),
            Value::Null,
            Value::List(vec![Value::Str("y.c".into())]),
            Value::Int(3),
        ]);
        assert_eq!(v.stringify(), "x.c y.c 3");
    }

    #[test]
    fn test_null_stringifies_empty() {
        assert_eq!(Value::Null.stringify(), "");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(Value::Int(1).truthy());
    }
}
