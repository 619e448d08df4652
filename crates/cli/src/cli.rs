//! The command-line surface.
//!
//! Unknown `--key=value` flags are not errors: they are split off before
//! clap runs and merged into the global config, so scripts can be
//! parameterized from the command line (`hancho --opt_level=2`).

use clap::{ArgAction, Parser};
use hancho_core::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hancho")]
#[command(about = "A simple, pleasant build orchestrator")]
#[command(version)]
pub struct Cli {
    /// A regex that selects the targets to build by name. Defaults to all
    /// targets.
    pub target: Option<String>,

    /// Change directory before starting the build.
    #[arg(short = 'C', long = "root_dir", default_value = ".")]
    pub root_dir: PathBuf,

    /// The name of the root build manifest.
    #[arg(short = 'f', long = "root_file", default_value = "build.hancho")]
    pub root_file: String,

    /// Run N jobs in parallel (0 = unbounded, default = hardware
    /// concurrency).
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Increase verbosity (-v, -vv).
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Mute all output.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Make rebuild decisions but skip the subprocesses.
    #[arg(short = 'n', long = "dry_run")]
    pub dry_run: bool,

    /// Print debugging dumps.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Rebuild everything regardless of mtimes.
    #[arg(long)]
    pub force: bool,

    /// Trace every template expansion step.
    #[arg(long)]
    pub trace: bool,

    /// Shuffle task order to shake out dependency issues.
    #[arg(short = 's', long)]
    pub shuffle: bool,

    /// Force color in the console output.
    #[arg(long = "use_color")]
    pub use_color: bool,
}

/// Flags clap knows about; anything else shaped like `--key[=value]`
/// becomes a global config field.
const KNOWN_FLAGS: &[&str] = &[
    "C",
    "root_dir",
    "f",
    "root_file",
    "j",
    "jobs",
    "v",
    "q",
    "quiet",
    "n",
    "dry_run",
    "d",
    "debug",
    "force",
    "trace",
    "s",
    "shuffle",
    "use_color",
    "h",
    "help",
    "V",
    "version",
];

/// Partition argv into (args for clap, extra config fields).
pub fn split_extra_flags(argv: Vec<String>) -> (Vec<String>, Vec<(String, Value)>) {
    let mut known = Vec::new();
    let mut extra = Vec::new();
    for arg in argv {
        // Only long flags can be config fields; short flags (including
        // bundled ones like -vv) always belong to clap.
        let Some(stripped) = arg.strip_prefix("--") else {
            known.push(arg);
            continue;
        };
        let (key, value) = match stripped.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (stripped, None),
        };
        if KNOWN_FLAGS.contains(&key) || key.is_empty() {
            known.push(arg);
            continue;
        }
        extra.push((key.to_string(), convert_flag_value(value)));
    }
    (known, extra)
}

/// Bare flags become `true`; values convert to int or float when they
/// parse as one, and stay strings otherwise.
fn convert_flag_value(value: Option<&str>) -> Value {
    let Some(text) = value else {
        return Value::Bool(true);
    };
    if let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(x) = text.parse::<f64>() {
        return Value::Float(x);
    }
    Value::Str(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["hancho"]).unwrap();
        assert_eq!(cli.root_file, "build.hancho");
        assert!(cli.jobs.is_none());
        assert!(!cli.dry_run);
        assert!(cli.target.is_none());
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from([
            "hancho", "-C", "/tmp", "-j", "4", "-vv", "-n", "-s", "tests.*",
        ])
        .unwrap();
        assert_eq!(cli.root_dir, PathBuf::from("/tmp"));
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.verbose, 2);
        assert!(cli.dry_run);
        assert!(cli.shuffle);
        assert_eq!(cli.target.as_deref(), Some("tests.*"));
    }

    #[test]
    fn test_extra_flags_split_off() {
        let (known, extra) = split_extra_flags(
            ["hancho", "-j", "4", "--opt_level=2", "--fast", "--tag=release"]
                .map(String::from)
                .to_vec(),
        );
        assert_eq!(known, ["hancho", "-j", "4"]);
        assert_eq!(
            extra,
            vec![
                ("opt_level".to_string(), Value::Int(2)),
                ("fast".to_string(), Value::Bool(true)),
                ("tag".to_string(), Value::Str("release".into())),
            ]
        );
        assert!(Cli::try_parse_from(known).is_ok());
    }
}
