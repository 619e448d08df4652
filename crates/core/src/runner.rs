//! Subprocess execution: spawn shell commands with captured output, run
//! command lists in order, and invoke callback commands.

use crate::builtins::{shell_flag, shell_program};
use crate::scheduler::BuildContext;
use crate::task::Task;
use crate::value::Value;
use crate::{Error, Result};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Lines of stdout/stderr kept when summarizing a failed command.
const FAILURE_SNIPPET_LINES: usize = 20;

/// Run a task's command value: a single string, a sequence run in order
/// (first failure aborts the rest), or a callback invoked with the task.
pub(crate) async fn run_commands(task: &Arc<Task>, ctx: &BuildContext) -> Result<()> {
    for part in task.command().flatten() {
        run_single(task, ctx, &part).await?;
    }
    Ok(())
}

async fn run_single(task: &Arc<Task>, ctx: &BuildContext, command: &Value) -> Result<()> {
    match command {
        Value::Callback(callback) => {
            if ctx.options().dry_run {
                return Ok(());
            }
            tracing::debug!(task = task.index(), "invoking callback command");
            match callback.invoke(task.clone()).await {
                Ok(_) => {
                    task.record_capture(String::new(), String::new(), 0);
                    Ok(())
                }
                Err(err) => Err(Error::Callback(err.to_string())),
            }
        }
        Value::Str(cmdline) => run_shell(task, ctx, cmdline).await,
        other => Err(Error::validation(format!(
            "don't know how to run {other:?} as a command"
        ))),
    }
}

async fn run_shell(task: &Arc<Task>, ctx: &BuildContext, cmdline: &str) -> Result<()> {
    let task_dir = task.task_dir();
    ctx.reporter()
        .command(&task_dir, cmdline, ctx.options().dry_run);
    if ctx.options().dry_run {
        return Ok(());
    }

    tracing::debug!(task = task.index(), command = cmdline, "spawning subprocess");
    let output = Command::new(shell_program())
        .arg(shell_flag())
        .arg(cmdline)
        .current_dir(&task_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let code = output.status.code().unwrap_or(-1);
    task.record_capture(stdout.clone(), stderr.clone(), code);

    // `should_fail` inverts success so intentionally-failing fixtures
    // don't rerun every build.
    let passed = (code == 0) != task.should_fail(&ctx.expand_opts());
    if !passed {
        return Err(Error::CommandFailed {
            code,
            detail: summarize_capture(&stdout, &stderr),
        });
    }
    Ok(())
}

/// Compact failure summary: the tail of each captured stream.
pub(crate) fn summarize_capture(stdout: &str, stderr: &str) -> String {
    let mut sections = Vec::new();
    if let Some(s) = summarize_stream("stdout", stdout) {
        sections.push(s);
    }
    if let Some(s) = summarize_stream("stderr", stderr) {
        sections.push(s);
    }
    sections.join("\n")
}

fn summarize_stream(label: &str, content: &str) -> Option<String> {
    let trimmed = content.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let start = lines.len().saturating_sub(FAILURE_SNIPPET_LINES);
    let snippet = lines[start..].join("\n");
    let header = if lines.len() > FAILURE_SNIPPET_LINES {
        format!(
            "{label} (last {FAILURE_SNIPPET_LINES} of {} lines):",
            lines.len()
        )
    } else {
        format!("{label}:")
    };
    Some(format!("{header}\n{snippet}"))
}
