use std::fmt::{Display, Formatter};
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::engine::{Status, TaskName, TaskResult};
use crate::error::MigrationError;

/// Process-wide, monotonically increasing execution counter.
static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Separator used when rendering execution paths.
pub const PATH_SEPARATOR: &str = " > ";

/// Index of an execution inside its [`ExecutionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(usize);

impl ExecutionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Runtime record of one task invocation.
#[derive(Debug)]
pub struct TaskExecution {
    name: TaskName,
    parent: Option<ExecutionId>,
    children: Vec<ExecutionId>,
    sequence: u64,
    start: Instant,
    duration: Option<Duration>,
    result: Option<TaskResult>,
}

impl TaskExecution {
    pub fn name(&self) -> &TaskName {
        &self.name
    }

    pub fn parent(&self) -> Option<ExecutionId> {
        self.parent
    }

    /// Subtasks invoked during this execution, in invocation order.
    pub fn children(&self) -> &[ExecutionId] {
        &self.children
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    /// Time between the start and the recorded result.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// `None` while the execution is still running, or if it was interrupted.
    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn status(&self) -> Option<Status> {
        self.result.as_ref().map(TaskResult::status)
    }
}

/// Status counts over a whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

/// Every execution of a run, stored as an arena.
///
/// Nodes are appended as tasks are invoked and are never removed; a node's
/// result is written exactly once.
#[derive(Debug, Default)]
pub struct ExecutionTree {
    nodes: Vec<TaskExecution>,
    roots: Vec<ExecutionId>,
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, parent: Option<ExecutionId>, name: TaskName) -> ExecutionId {
        let id = ExecutionId(self.nodes.len());

        self.nodes.push(TaskExecution {
            name,
            parent,
            children: Vec::new(),
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
            start: Instant::now(),
            duration: None,
            result: None,
        });

        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        id
    }

    pub(crate) fn complete(&mut self, id: ExecutionId, result: TaskResult) -> Result<(), MigrationError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or_else(|| MigrationError::invalid_state(format!("unknown execution {}", id.0)))?;

        if node.result.is_some() {
            return Err(MigrationError::invalid_state(format!(
                "task '{}' already has a result",
                node.name
            )));
        }

        node.duration = Some(node.start.elapsed());
        node.result = Some(result);
        Ok(())
    }

    pub fn get(&self, id: ExecutionId) -> Option<&TaskExecution> {
        self.nodes.get(id.0)
    }

    /// The first top-level execution.
    pub fn root(&self) -> Option<ExecutionId> {
        self.roots.first().copied()
    }

    pub fn roots(&self) -> &[ExecutionId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ancestor names joined by [`PATH_SEPARATOR`], root first.
    pub fn path_of(&self, id: ExecutionId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);

        while let Some(id) = current {
            let Some(node) = self.get(id) else { break };
            names.push(node.name.to_string());
            current = node.parent;
        }

        names.reverse();
        names.join(PATH_SEPARATOR)
    }

    /// Finds the first execution, in invocation order, with the given path.
    pub fn find(&self, path: &str) -> Option<ExecutionId> {
        (0..self.nodes.len())
            .map(ExecutionId)
            .find(|&id| self.path_of(id) == path)
    }

    /// Depth-first, pre-order traversal yielding `(depth, id)` pairs.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: self.roots.iter().rev().map(|&id| (0, id)).collect(),
        }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.nodes.len(),
            ..Default::default()
        };

        for node in &self.nodes {
            match node.status() {
                Some(Status::Success) => summary.success += 1,
                Some(Status::Skipped) => summary.skipped += 1,
                Some(Status::Fail) => summary.failed += 1,
                None => {}
            }
        }

        summary
    }
}

impl Index<ExecutionId> for ExecutionTree {
    type Output = TaskExecution;

    fn index(&self, index: ExecutionId) -> &Self::Output {
        &self.nodes[index.0]
    }
}

pub struct Walk<'a> {
    tree: &'a ExecutionTree,
    stack: Vec<(usize, ExecutionId)>,
}

impl Iterator for Walk<'_> {
    type Item = (usize, ExecutionId);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, id) = self.stack.pop()?;

        let children = &self.tree[id].children;
        self.stack
            .extend(children.iter().rev().map(|&child| (depth + 1, child)));

        Some((depth, id))
    }
}

impl Display for ExecutionTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (depth, id) in self.walk() {
            let node = &self[id];
            let status = node
                .status()
                .map(|status| status.to_string())
                .unwrap_or_else(|| "INTERRUPTED".to_string());

            writeln!(f, "{:indent$}{} [{}]", "", node.name, status, indent = depth * 2)?;
        }

        Ok(())
    }
}
