//! The fixed helper namespace available to template expressions.
//!
//! Helpers are the only names reachable from expressions besides the
//! config chain itself. They are all pure path/string utilities except
//! `glob` and `run_cmd`, which touch the filesystem and shell.

use crate::config::Config;
use crate::expand::ExpandOpts;
use crate::paths;
use crate::value::{CallArgs, NativeFn, Value};
use crate::{Error, Result};
use std::path::PathBuf;
use std::process::Command;

/// Resolve a helper by name.
pub fn lookup(name: &str) -> Option<Value> {
    let f = match name {
        "glob" => NativeFn::new("glob", glob_files),
        "swap_ext" | "ext" => NativeFn::new("swap_ext", swap_ext),
        "join_path" => NativeFn::new("join_path", join_path),
        "rel_path" => NativeFn::new("rel_path", rel_path),
        "abs_path" => NativeFn::new("abs_path", abs_path),
        "stem" => NativeFn::new("stem", stem),
        "flatten" => NativeFn::new("flatten", flatten),
        "join" => NativeFn::new("join", join),
        "run_cmd" => NativeFn::new("run_cmd", run_cmd),
        "len" => NativeFn::new("len", len),
        _ => return None,
    };
    Some(Value::Func(f))
}

/// Directory that relative glob patterns and paths resolve against:
/// `task_dir` if set, else `mod_dir`, else the process cwd.
fn anchor_dir(config: &Config) -> PathBuf {
    let opts = ExpandOpts::default();
    for key in ["task_dir", "mod_dir"] {
        if let Value::Str(s) = config.get_expanded(key, Value::Null, &opts) {
            if !s.is_empty() && !s.contains('{') {
                return PathBuf::from(s);
            }
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn glob_files(config: &Config, args: &CallArgs) -> Result<Value> {
    let anchor = anchor_dir(config);
    let mut out = Vec::new();
    for pattern in args.arg(0).string_list() {
        let full = if PathBuf::from(&pattern).is_absolute() {
            pattern
        } else {
            anchor.join(&pattern).display().to_string()
        };
        let matches = glob::glob(&full)
            .map_err(|e| Error::validation(format!("bad glob pattern '{full}': {e}")))?;
        for entry in matches {
            let path = entry
                .map_err(|e| Error::validation(format!("glob '{full}': {e}")))?;
            out.push(Value::Str(path.display().to_string()));
        }
    }
    Ok(Value::List(out))
}

fn swap_ext(_config: &Config, args: &CallArgs) -> Result<Value> {
    fn apply(value: &Value, new_ext: &str) -> Value {
        match value {
            Value::List(items) => {
                Value::List(items.iter().map(|v| apply(v, new_ext)).collect())
            }
            Value::Null => Value::Null,
            other => Value::Str(paths::swap_ext(&other.stringify(), new_ext)),
        }
    }
    let new_ext = args.arg(1).stringify();
    Ok(apply(&args.arg(0), &new_ext))
}

fn join_path(_config: &Config, args: &CallArgs) -> Result<Value> {
    if args.positional.len() < 2 {
        return Err(Error::validation("join_path needs at least two arguments"));
    }
    let mut acc: Vec<String> = args.arg(0).string_list();
    for arg in &args.positional[1..] {
        let rhs = arg.string_list();
        let mut next = Vec::with_capacity(acc.len() * rhs.len());
        for l in &acc {
            for r in &rhs {
                next.push(paths::join_path(l, r));
            }
        }
        acc = next;
    }
    if acc.len() == 1 {
        Ok(Value::Str(acc.pop().unwrap_or_default()))
    } else {
        Ok(Value::List(acc.into_iter().map(Value::Str).collect()))
    }
}

fn rel_path(_config: &Config, args: &CallArgs) -> Result<Value> {
    let base = args.arg(1).stringify();
    fn apply(value: &Value, base: &str) -> Value {
        match value {
            Value::List(items) => {
                Value::List(items.iter().map(|v| apply(v, base)).collect())
            }
            Value::Null => Value::Null,
            other => Value::Str(paths::rel_path(&other.stringify(), base)),
        }
    }
    Ok(apply(&args.arg(0), &base))
}

fn abs_path(config: &Config, args: &CallArgs) -> Result<Value> {
    let anchor = anchor_dir(config);
    fn apply(value: &Value, anchor: &std::path::Path) -> Value {
        match value {
            Value::List(items) => {
                Value::List(items.iter().map(|v| apply(v, anchor)).collect())
            }
            Value::Null => Value::Null,
            other => Value::Str(
                paths::make_absolute(std::path::Path::new(&other.stringify()), anchor)
                    .display()
                    .to_string(),
            ),
        }
    }
    Ok(apply(&args.arg(0), &anchor))
}

fn stem(_config: &Config, args: &CallArgs) -> Result<Value> {
    let first = args
        .arg(0)
        .string_list()
        .into_iter()
        .next()
        .unwrap_or_default();
    Ok(Value::Str(paths::stem(&first)))
}

fn flatten(_config: &Config, args: &CallArgs) -> Result<Value> {
    Ok(Value::List(args.arg(0).flatten()))
}

/// Cartesian string concatenation over flattened lists.
fn join(_config: &Config, args: &CallArgs) -> Result<Value> {
    if args.positional.len() < 2 {
        return Err(Error::validation("join needs at least two arguments"));
    }
    let mut acc: Vec<String> = args.arg(0).string_list();
    for arg in &args.positional[1..] {
        let rhs = arg.string_list();
        let mut next = Vec::with_capacity(acc.len() * rhs.len());
        for l in &acc {
            for r in &rhs {
                next.push(format!("{l}{r}"));
            }
        }
        acc = next;
    }
    Ok(Value::List(acc.into_iter().map(Value::Str).collect()))
}

/// Run a console command synchronously; returns trimmed stdout.
fn run_cmd(_config: &Config, args: &CallArgs) -> Result<Value> {
    let cmdline = args.arg(0).stringify();
    let output = Command::new(shell_program())
        .arg(shell_flag())
        .arg(&cmdline)
        .output()?;
    if !output.status.success() {
        return Err(Error::validation(format!(
            "run_cmd '{cmdline}' exited with {}",
            output.status.code().unwrap_or(-1)
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Value::Str(stdout.trim().to_string()))
}

fn len(_config: &Config, args: &CallArgs) -> Result<Value> {
    let n = match args.arg(0) {
        Value::List(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        Value::Config(c) => c.len(),
        other => {
            return Err(Error::validation(format!(
                "len() of unsupported value {other:?}"
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

pub(crate) fn shell_program() -> &'static str {
    if cfg!(windows) {
        "cmd"
    } else {
        "sh"
    }
}

pub(crate) fn shell_flag() -> &'static str {
    if cfg!(windows) {
        "/C"
    } else {
        "-c"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn call(name: &str, config: &Config, args: Vec<Value>) -> Result<Value> {
        match lookup(name) {
            Some(Value::Func(f)) => f.call(config, &CallArgs::positional(args)),
            _ => panic!("no helper {name}"),
        }
    }

    #[test]
    fn test_glob_anchors_at_task_dir() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.c"), "").unwrap();
        fs::write(tmp.path().join("b.c"), "").unwrap();
        fs::write(tmp.path().join("note.txt"), "").unwrap();

        let config =
            Config::new().with("task_dir", tmp.path().display().to_string());
        let result = call("glob", &config, vec![Value::Str("*.c".into())]).unwrap();
        let mut names = result.string_list();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("a.c"));
        assert!(names[1].ends_with("b.c"));
    }

    #[test]
    fn test_join_path_cartesian() {
        let config = Config::new();
        let result = call(
            "join_path",
            &config,
            vec![
                Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]),
                Value::Str("x.c".into()),
            ],
        )
        .unwrap();
        assert_eq!(
            result.string_list(),
            vec!["a/x.c".to_string(), "b/x.c".to_string()]
        );
    }

    #[test]
    fn test_join_concat() {
        let config = Config::new();
        let result = call(
            "join",
            &config,
            vec![
                Value::Str("-I".into()),
                Value::List(vec![Value::Str("inc".into()), Value::Str("src".into())]),
            ],
        )
        .unwrap();
        assert_eq!(
            result.string_list(),
            vec!["-Iinc".to_string(), "-Isrc".to_string()]
        );
    }

    #[test]
    fn test_run_cmd_captures_stdout() {
        let config = Config::new();
        let result =
            call("run_cmd", &config, vec![Value::Str("echo hello".into())]).unwrap();
        assert_eq!(result, Value::Str("hello".into()));
    }

    #[test]
    fn test_run_cmd_failure_is_error() {
        let config = Config::new();
        assert!(call("run_cmd", &config, vec![Value::Str("exit 3".into())]).is_err());
    }
}
