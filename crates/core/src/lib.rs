//! Core types and engine for hancho.
//!
//! Hancho builds a DAG of tasks described by prototype-chained [`Config`]
//! objects, expands `{...}` templates lazily against them, decides which
//! tasks must rerun from file mtimes (plus compiler depfiles), and runs
//! commands on a bounded async job pool.

use std::path::Path;
use thiserror::Error;

pub mod builtins;
pub mod config;
pub mod depfile;
pub mod expand;
pub mod expr;
pub mod graph;
pub mod output;
pub mod paths;
pub mod pool;
pub mod rebuild;
pub mod runner;
pub mod scheduler;
pub mod script;
pub mod task;
pub mod value;

pub use config::Config;
pub use expand::ExpandOpts;
pub use scheduler::{BuildContext, BuildOptions, BuildSummary};
pub use script::ScriptHost;
pub use task::{Outcome, Task, TaskState};
pub use value::{CallArgs, NativeFn, TaskCallback, Value};

/// Main error type for hancho operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Template expansion exceeded the recursion depth or size cap.
    #[error("Expansion loop while expanding '{template}': {detail}")]
    ExpansionLoop { template: String, detail: String },

    #[error("Missing input file: {}", path.display())]
    MissingInput { path: Box<Path> },

    #[error("Command exited with return code {code}\n{detail}")]
    CommandFailed { code: i32, detail: String },

    #[error("Callback command failed: {0}")]
    Callback(String),

    #[error("Config parent chain error: {0}")]
    ParentChain(String),

    #[error("Script error in {}: {message}", path.display())]
    Script { path: Box<Path>, message: String },

    #[error("Path error: {0}")]
    BadPath(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn script(path: &Path, message: impl Into<String>) -> Self {
        Error::Script {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn bad_path(msg: impl Into<String>) -> Self {
        Error::BadPath(msg.into())
    }
}

/// Result type alias for hancho operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurable engine limits.
///
/// The expansion caps exist so a buggy or hostile config cannot hang the
/// build; the parent-depth cap doubles as the config-chain cycle check.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum template expansion recursion depth.
    pub max_expand_depth: usize,
    /// Maximum size of an expanded string, in bytes.
    pub max_expand_size: usize,
    /// Maximum length of a config parent chain.
    pub max_parent_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_expand_depth: 100,
            max_expand_size: 64 * 1024,
            max_parent_depth: 64,
        }
    }
}
