use std::sync::LazyLock;

use indicatif::ProgressStyle;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Environment, Globals, MigrationFiles};
use crate::engine::{ExecutionId, ExecutionTree, Status, Task, TaskResult};
use crate::error::{MigrationError, MigrationFailure};

static TASK_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .expect("Error setting progress bar template")
});

/// The context passed to every task body and hook.
///
/// It belongs to exactly one execution: subtasks executed through it become
/// that execution's children, in invocation order.
pub struct TaskContext<'a> {
    tree: &'a mut ExecutionTree,
    globals: &'a Globals,
    id: ExecutionId,
    span: tracing::Span,
}

impl<'a> TaskContext<'a> {
    /// Executes `task` as the next child of this execution.
    ///
    /// Errors raised by the subtask are returned after being recorded, so a
    /// body that propagates them with `?` aborts its remaining work. A context
    /// only exists while its execution runs, so the execution has no result
    /// yet; re-running a finished tree is rejected by [`Migration::run`].
    ///
    /// [`Migration::run`]: crate::Migration::run
    pub fn execute<P>(&mut self, task: &Task<P>, params: &P) -> Result<ExecutionId, MigrationError> {
        execute_task(self.tree, self.globals, Some(self.id), task, params)
    }

    /// Whether any direct subtask executed so far succeeded.
    pub fn has_succeeded_subtasks(&self) -> bool {
        self.tree[self.id]
            .children()
            .iter()
            .any(|&child| self.tree[child].status() == Some(Status::Success))
    }

    /// Result of an execution recorded in the same tree.
    pub fn result_of(&self, id: ExecutionId) -> Option<&TaskResult> {
        self.tree.get(id).and_then(|node| node.result())
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Names of this execution and its ancestors, root first.
    pub fn path(&self) -> String {
        self.tree.path_of(self.id)
    }

    pub fn tree(&self) -> &ExecutionTree {
        self.tree
    }

    pub fn globals(&self) -> &Globals {
        self.globals
    }

    pub fn environment(&self) -> &Environment {
        &self.globals.environment
    }

    pub fn files(&self) -> &MigrationFiles {
        &self.globals.files
    }

    /// Tracing span assigned to this execution.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

/// Allocates a node for `task` under `parent` and runs it.
pub(crate) fn execute_task<P>(
    tree: &mut ExecutionTree,
    globals: &Globals,
    parent: Option<ExecutionId>,
    task: &Task<P>,
    params: &P,
) -> Result<ExecutionId, MigrationError> {
    if task.name().name().is_empty() {
        return Err(MigrationError::invalid_state("cannot execute an unnamed task"));
    }

    let id = tree.push(parent, task.name().clone());
    let path = tree.path_of(id);

    let span = tracing::span!(Level::INFO, "task", name = %task.name());
    span.pb_set_style(&TASK_STYLE);
    span.pb_set_message(&format!("Running {}", task.name()));
    let _enter = span.enter();

    let mut ctx = TaskContext {
        tree,
        globals,
        id,
        span: span.clone(),
    };

    if task.should_skip(&ctx, params) {
        tracing::debug!(%path, "Skipping task");
        ctx.tree.complete(id, TaskResult::skipped())?;
        return Ok(id);
    }

    tracing::debug!(%path, "Running task");

    match task.invoke(&mut ctx, params) {
        Ok(result) => {
            tracing::debug!(%path, status = %result.status(), "Finished task");
            ctx.tree.complete(id, result)?;
            Ok(id)
        }
        Err(err) => {
            let error = match err.downcast::<MigrationError>() {
                Ok(error) => error,
                Err(cause) => {
                    tracing::error!(%path, "Task failed: {cause:#}");
                    MigrationError::Failure(MigrationFailure::new(path.clone(), cause))
                }
            };

            let failure = match &error {
                MigrationError::Failure(failure) => failure.clone(),
                MigrationError::InvalidState(_) => MigrationFailure::new(path, error.clone()),
            };

            ctx.tree.complete(id, TaskResult::fail(failure))?;
            Err(error)
        }
    }
}
