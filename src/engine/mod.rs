//! The task model.
//!
//! A [`Task`] is a named, immutable unit of work that can be executed any
//! number of times, each execution leaving one node in an
//! [`ExecutionTree`]. Tasks are generic over the parameter value `P` they are
//! run with, which lets one task definition be instantiated once per resource
//! found in the live configuration tree.
//!
//! ## Execution contract
//!
//! Executing a task through [`TaskContext::execute`]:
//!
//! 1. allocates a new node as the next child of the calling execution,
//! 2. evaluates the task's [`SkipPolicy`], recording `SKIPPED` without
//!    touching the hooks or the body when it holds,
//! 3. otherwise runs the before hook, the body and the after hook, and records
//!    the body's [`TaskResult`],
//! 4. on error records `FAIL` and re-throws, aborting every enclosing
//!    composite on the way up.

mod context;
mod runner;
mod tree;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MigrationFailure;

pub use crate::engine::context::TaskContext;
pub use crate::engine::runner::Migration;
pub use crate::engine::tree::{
    ExecutionId, ExecutionTree, PATH_SEPARATOR, Summary, TaskExecution, Walk,
};

pub(crate) use crate::engine::context::execute_task;

/// Name and ordered attributes identifying a task.
///
/// ```
/// use utsuri::TaskName;
///
/// let name = TaskName::new("update-subsystem").with_attribute("name", "undertow");
/// assert_eq!(name.to_string(), "update-subsystem(name=undertow)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskName {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<(String, String)>,
}

impl TaskName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute. Setting an existing key replaces its value in place.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();

        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key, value)),
        }

        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Display for TaskName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;

        if !self.attributes.is_empty() {
            f.write_str("(")?;
            for (i, (k, v)) in self.attributes.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str(")")?;
        }

        Ok(())
    }
}

impl From<&str> for TaskName {
    fn from(value: &str) -> Self {
        TaskName::new(value)
    }
}

impl From<String> for TaskName {
    fn from(value: String) -> Self {
        TaskName::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Fail,
    Success,
    Skipped,
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Fail => "FAIL",
            Status::Success => "SUCCESS",
            Status::Skipped => "SKIPPED",
        })
    }
}

/// Outcome of one task execution.
#[derive(Debug, Clone)]
pub struct TaskResult {
    status: Status,
    failure: Option<MigrationFailure>,
    attributes: BTreeMap<String, String>,
}

impl TaskResult {
    pub fn success() -> Self {
        Self::with_status(Status::Success)
    }

    /// The condition for running the task was not met.
    pub fn skipped() -> Self {
        Self::with_status(Status::Skipped)
    }

    pub fn fail(failure: MigrationFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::with_status(Status::Fail)
        }
    }

    fn with_status(status: Status) -> Self {
        Self {
            status,
            failure: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn failure(&self) -> Option<&MigrationFailure> {
        self.failure.as_ref()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

pub(crate) type BodyFn<P> =
    Arc<dyn Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<TaskResult> + Send + Sync>;

pub(crate) type HookFn<P> =
    Arc<dyn Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<()> + Send + Sync>;

type PredicateFn<P> = Arc<dyn Fn(&TaskContext<'_>, &P) -> bool + Send + Sync>;

/// Decides whether an execution should bypass its task's hooks and body.
pub enum SkipPolicy<P> {
    /// Always run.
    Never,
    /// Never run.
    Always,
    /// Skip when the `<key>.skip` environment property is `true`, where `<key>`
    /// is the task's skip key or, by default, its name.
    Environment,
    /// Skip when the predicate holds.
    When(PredicateFn<P>),
    /// Skip when any of the policies does.
    Any(Vec<SkipPolicy<P>>),
}

impl<P> SkipPolicy<P> {
    pub fn from_environment() -> Self {
        SkipPolicy::Environment
    }

    pub fn never() -> Self {
        SkipPolicy::Never
    }

    pub fn always() -> Self {
        SkipPolicy::Always
    }

    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&TaskContext<'_>, &P) -> bool + Send + Sync + 'static,
    {
        SkipPolicy::When(Arc::new(predicate))
    }

    pub fn or(self, other: SkipPolicy<P>) -> Self {
        match self {
            SkipPolicy::Any(mut policies) => {
                policies.push(other);
                SkipPolicy::Any(policies)
            }
            policy => SkipPolicy::Any(vec![policy, other]),
        }
    }

    pub(crate) fn should_skip(&self, skip_property: &str, ctx: &TaskContext<'_>, params: &P) -> bool {
        match self {
            SkipPolicy::Never => false,
            SkipPolicy::Always => true,
            SkipPolicy::Environment => ctx.environment().get_bool(skip_property, false),
            SkipPolicy::When(predicate) => predicate(ctx, params),
            SkipPolicy::Any(policies) => policies
                .iter()
                .any(|policy| policy.should_skip(skip_property, ctx, params)),
        }
    }
}

impl<P> Default for SkipPolicy<P> {
    fn default() -> Self {
        SkipPolicy::Environment
    }
}

impl<P> Clone for SkipPolicy<P> {
    fn clone(&self) -> Self {
        match self {
            SkipPolicy::Never => SkipPolicy::Never,
            SkipPolicy::Always => SkipPolicy::Always,
            SkipPolicy::Environment => SkipPolicy::Environment,
            SkipPolicy::When(predicate) => SkipPolicy::When(predicate.clone()),
            SkipPolicy::Any(policies) => SkipPolicy::Any(policies.clone()),
        }
    }
}

impl<P> std::fmt::Debug for SkipPolicy<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipPolicy::Never => write!(f, "SkipPolicy::Never"),
            SkipPolicy::Always => write!(f, "SkipPolicy::Always"),
            SkipPolicy::Environment => write!(f, "SkipPolicy::Environment"),
            SkipPolicy::When(_) => write!(f, "SkipPolicy::When(*)"),
            SkipPolicy::Any(policies) => f.debug_tuple("SkipPolicy::Any").field(policies).finish(),
        }
    }
}

pub(crate) struct TaskInner<P> {
    pub name: TaskName,
    pub skip: SkipPolicy<P>,
    pub skip_key: Option<String>,
    pub before: Option<HookFn<P>>,
    pub after: Option<HookFn<P>>,
    pub body: BodyFn<P>,
}

/// A named unit of work run with parameters of type `P`.
///
/// Tasks are built once, with [`Task::leaf`] or [`Task::composite`], and are
/// cheap to clone and reuse across runs.
pub struct Task<P> {
    pub(crate) inner: Arc<TaskInner<P>>,
}

impl<P> Task<P> {
    pub fn name(&self) -> &TaskName {
        &self.inner.name
    }

    /// Environment property consulted by [`SkipPolicy::Environment`].
    pub fn skip_property(&self) -> String {
        let key = self
            .inner
            .skip_key
            .as_deref()
            .unwrap_or(self.inner.name.name());

        format!("{key}.skip")
    }

    pub(crate) fn should_skip(&self, ctx: &TaskContext<'_>, params: &P) -> bool {
        self.inner
            .skip
            .should_skip(&self.skip_property(), ctx, params)
    }

    /// Runs the hooks and the body, in order.
    pub(crate) fn invoke(&self, ctx: &mut TaskContext<'_>, params: &P) -> anyhow::Result<TaskResult> {
        if let Some(before) = &self.inner.before {
            before(ctx, params)?;
        }

        let result = (self.inner.body)(ctx, params)?;

        if let Some(after) = &self.inner.after {
            after(ctx, params)?;
        }

        Ok(result)
    }
}

impl<P> Clone for Task<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> std::fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.inner.name)
    }
}
