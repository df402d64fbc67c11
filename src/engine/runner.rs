mod diagnostics;

use std::time::Instant;

use tracing::Level;

use crate::core::{Environment, Globals};
use crate::engine::{ExecutionId, ExecutionTree, Task, execute_task};
use crate::error::{Aborted, MigrationError};
use crate::utils::as_overhead;

/// Drives one migration: owns the process-wide state and the execution tree
/// of its single top-level run.
#[derive(Debug, Default)]
pub struct Migration {
    globals: Globals,
    tree: ExecutionTree,
}

impl Migration {
    pub fn new(globals: Globals) -> Self {
        Self {
            globals,
            tree: ExecutionTree::new(),
        }
    }

    pub fn with_environment(environment: Environment) -> Self {
        Self::new(Globals::new(environment))
    }

    /// Runs `task` as the root execution.
    ///
    /// A migration runs once; calling this again fails with
    /// [`MigrationError::InvalidState`]. On failure the partially built tree
    /// stays available through [`Migration::tree`].
    pub fn run<P>(&mut self, task: &Task<P>, params: &P) -> Result<ExecutionId, MigrationError> {
        if let Some(root) = self.tree.root() {
            return Err(MigrationError::invalid_state(format!(
                "migration '{}' has already run",
                self.tree[root].name()
            )));
        }

        let s = Instant::now();
        let span = tracing::span!(Level::INFO, "migration");
        let _enter = span.enter();

        tracing::info!("Running migration '{}'", task.name());
        let result = execute_task(&mut self.tree, &self.globals, None, task, params);
        let summary = self.tree.summary();

        match &result {
            Ok(_) => tracing::info!(
                success = summary.success,
                skipped = summary.skipped,
                failed = summary.failed,
                "Migration finished {}",
                as_overhead(s)
            ),
            Err(err) => tracing::error!(
                executed = summary.total,
                "Migration aborted {}: {err}",
                as_overhead(s)
            ),
        }

        result
    }

    /// Runs `task` and hands back the finished tree, or the partial one
    /// together with the error.
    pub fn run_once<P>(mut self, task: &Task<P>, params: &P) -> Result<ExecutionTree, Aborted> {
        match self.run(task, params) {
            Ok(_) => Ok(self.tree),
            Err(error) => Err(Aborted {
                tree: self.tree,
                error,
            }),
        }
    }

    pub fn tree(&self) -> &ExecutionTree {
        &self.tree
    }

    pub fn into_tree(self) -> ExecutionTree {
        self.tree
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }
}
