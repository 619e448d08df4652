//! Human-facing build output: task banners, rebuild reasons, failure
//! replays, and the final tally. Engine diagnostics go through `tracing`;
//! this is the part the user watches.

use crate::scheduler::BuildSummary;
use console::style;
use std::path::Path;

pub struct Reporter {
    quiet: bool,
    verbosity: u8,
}

impl Reporter {
    pub fn new(quiet: bool, verbosity: u8, use_color: bool) -> Self {
        if use_color {
            console::set_colors_enabled(true);
        }
        Self { quiet, verbosity }
    }

    /// The `[i/N] desc` status line.
    pub fn banner(&self, index: usize, total: usize, desc: &str) {
        if self.quiet {
            return;
        }
        println!("{} {desc}", style(format!("[{index}/{total}]")).green());
    }

    pub fn reason(&self, reason: &str) {
        if self.quiet || self.verbosity == 0 {
            return;
        }
        println!("{}", style(format!("Reason: {reason}")).dim());
    }

    /// The expanded command, prefixed by its working directory.
    pub fn command(&self, task_dir: &Path, command: &str, dry_run: bool) {
        if self.quiet || self.verbosity == 0 {
            return;
        }
        let prefix = if dry_run { "(DRY RUN) " } else { "" };
        println!(
            "{prefix}{}$ {command}",
            style(task_dir.display().to_string()).cyan()
        );
    }

    pub fn failure(&self, desc: &str, detail: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{} {desc}", style("Task failed:").red());
        if !detail.is_empty() {
            eprintln!("{detail}");
        }
    }

    pub fn warn(&self, message: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{}", style(message).yellow());
    }

    pub fn note(&self, message: &str) {
        if self.quiet || self.verbosity == 0 {
            return;
        }
        println!("{message}");
    }

    /// Final counts and the BUILD PASSED / FAILED / CLEAN line.
    pub fn tally(&self, summary: &BuildSummary) {
        if self.quiet {
            return;
        }
        if self.verbosity > 0 {
            println!("tasks started:   {}", summary.started);
            println!("tasks passed:    {}", summary.passed);
            println!("tasks failed:    {}", summary.failed);
            println!("tasks skipped:   {}", summary.skipped);
            println!("tasks cancelled: {}", summary.cancelled);
        }
        if summary.failed > 0 || summary.cancelled > 0 {
            println!("hancho: {}", style("BUILD FAILED").red());
        } else if summary.passed > 0 {
            println!("hancho: {}", style("BUILD PASSED").green());
        } else {
            println!("hancho: {}", style("BUILD CLEAN").cyan());
        }
    }
}
