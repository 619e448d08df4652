//! Pre-scheduling validation of the promise graph.
//!
//! Promise edges cannot form a cycle by construction (a task can only
//! reference tasks that already exist), but the check is cheap and catches
//! anything unsafe code or future refactors might produce.

use crate::config::Config;
use crate::task::Task;
use crate::value::Value;
use crate::{Error, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::sync::Arc;

/// Collect every task referenced by a config's own fields, recursing
/// through lists and nested configs.
pub(crate) fn collect_task_refs(config: &Config, out: &mut Vec<Arc<Task>>) {
    for (_, value) in config.iter() {
        collect_value(value, out);
    }
}

fn collect_value(value: &Value, out: &mut Vec<Arc<Task>>) {
    match value {
        Value::Task(task) => out.push(task.clone()),
        Value::List(items) => {
            for item in items {
                collect_value(item, out);
            }
        }
        Value::Config(config) => collect_task_refs(config, out),
        _ => {}
    }
}

/// Check the promise edges over all registered tasks for acyclicity.
pub(crate) fn validate(tasks: &[Arc<Task>]) -> Result<()> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut nodes = HashMap::new();
    for task in tasks {
        nodes.insert(task.index(), graph.add_node(task.index()));
    }
    for task in tasks {
        let config = task.config();
        let mut refs = Vec::new();
        collect_task_refs(&config, &mut refs);
        let Some(&to) = nodes.get(&task.index()) else {
            continue;
        };
        for dep in refs {
            if let Some(&from) = nodes.get(&dep.index()) {
                graph.add_edge(from, to, ());
            }
        }
    }
    if is_cyclic_directed(&graph) {
        return Err(Error::validation("task graph contains a cycle"));
    }
    tracing::debug!(
        tasks = graph.node_count(),
        edges = graph.edge_count(),
        "task graph validated"
    );
    Ok(())
}
