//! Builders for leaf and composite tasks.
//!
//! ```
//! use utsuri::{Migration, Task, TaskResult};
//!
//! let plan: Task<()> = Task::composite("migrate-server")
//!     .subtask(Task::leaf("copy-files").run_ok(|_, _| Ok(())))
//!     .subtask(Task::leaf("update-subsystems").run(|_, _| Ok(TaskResult::skipped())))
//!     .build();
//!
//! let tree = Migration::default().run_once(&plan, &()).unwrap();
//! assert!(tree[tree.root().unwrap()].result().unwrap().is_success());
//! ```

use std::sync::Arc;

use crate::engine::{BodyFn, HookFn, SkipPolicy, Task, TaskContext, TaskInner, TaskName, TaskResult};
use crate::error::MigrationError;
use crate::model::{ResourceParams, Selector};

/// Runs one configured step of a composite, executing zero or more subtasks.
type ExecutorFn<P> = Arc<dyn Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<()> + Send + Sync>;

/// How a composite derives its own result from its direct children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// SUCCESS if at least one direct child succeeded, SKIPPED otherwise.
    #[default]
    OnlyIfSuccessfulSubtasks,
    /// SUCCESS whenever the subtasks ran without error.
    Always,
}

/// Settings shared by every task shape.
struct Common<P> {
    name: TaskName,
    skip: SkipPolicy<P>,
    skip_key: Option<String>,
    before: Option<HookFn<P>>,
    after: Option<HookFn<P>>,
}

/// Pins the higher-ranked signature of a body closure.
fn body_fn<P, F>(body: F) -> BodyFn<P>
where
    F: Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<TaskResult> + Send + Sync + 'static,
{
    Arc::new(body)
}

impl<P> Common<P> {
    fn new(name: TaskName) -> Self {
        Self {
            name,
            skip: SkipPolicy::default(),
            skip_key: None,
            before: None,
            after: None,
        }
    }

    fn finish(self, body: BodyFn<P>) -> Task<P> {
        Task {
            inner: Arc::new(TaskInner {
                name: self.name,
                skip: self.skip,
                skip_key: self.skip_key,
                before: self.before,
                after: self.after,
                body,
            }),
        }
    }
}

macro_rules! common_setters {
    () => {
        /// Replaces the default environment-driven skip policy.
        pub fn skip_policy(mut self, policy: SkipPolicy<P>) -> Self {
            self.common.skip = policy;
            self
        }

        /// Key used for the `<key>.skip` environment property instead of the
        /// task name.
        pub fn skip_key(mut self, key: impl Into<String>) -> Self {
            self.common.skip_key = Some(key.into());
            self
        }

        /// Runs before the body, only if the task is not skipped.
        pub fn before<F>(mut self, hook: F) -> Self
        where
            F: Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<()> + Send + Sync + 'static,
        {
            self.common.before = Some(Arc::new(hook));
            self
        }

        /// Runs after the body returned successfully.
        pub fn after<F>(mut self, hook: F) -> Self
        where
            F: Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<()> + Send + Sync + 'static,
        {
            self.common.after = Some(Arc::new(hook));
            self
        }
    };
}

impl<P: 'static> Task<P> {
    /// Starts a task whose body is supplied by the caller.
    pub fn leaf(name: impl Into<TaskName>) -> LeafBuilder<P> {
        LeafBuilder {
            common: Common::new(name.into()),
        }
    }

    /// Starts a task whose body runs a list of subtasks in order.
    pub fn composite(name: impl Into<TaskName>) -> CompositeBuilder<P> {
        CompositeBuilder {
            common: Common::new(name.into()),
            executors: Vec::new(),
            policy: SuccessPolicy::default(),
            tolerate_failures: false,
        }
    }
}

pub struct LeafBuilder<P> {
    common: Common<P>,
}

impl<P: 'static> LeafBuilder<P> {
    common_setters!();

    pub fn run<F>(self, body: F) -> Task<P>
    where
        F: Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<TaskResult> + Send + Sync + 'static,
    {
        self.common.finish(Arc::new(body))
    }

    /// Like [`run`](Self::run), reporting SUCCESS when the body returns `Ok`.
    pub fn run_ok<F>(self, body: F) -> Task<P>
    where
        F: Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.common.finish(body_fn(move |ctx, params| {
            body(ctx, params)?;
            Ok(TaskResult::success())
        }))
    }
}

pub struct CompositeBuilder<P> {
    common: Common<P>,
    executors: Vec<ExecutorFn<P>>,
    policy: SuccessPolicy,
    tolerate_failures: bool,
}

impl<P: 'static> CompositeBuilder<P> {
    common_setters!();

    /// Appends a subtask run with the composite's own parameters.
    pub fn subtask(self, task: Task<P>) -> Self {
        self.executor(move |ctx, params| {
            ctx.execute(&task, params)?;
            Ok(())
        })
    }

    /// Appends a subtask run with parameters derived from the composite's.
    pub fn subtask_with<Q, M>(self, task: Task<Q>, map: M) -> Self
    where
        Q: 'static,
        M: Fn(&P) -> Q + Send + Sync + 'static,
    {
        self.executor(move |ctx, params| {
            ctx.execute(&task, &map(params))?;
            Ok(())
        })
    }

    /// Appends an arbitrary step which may execute any number of subtasks.
    pub fn executor<F>(mut self, executor: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>, &P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.executors.push(Arc::new(executor));
        self
    }

    pub fn success_policy(mut self, policy: SuccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn succeed_always(self) -> Self {
        self.success_policy(SuccessPolicy::Always)
    }

    pub fn succeed_only_if_successful_subtasks(self) -> Self {
        self.success_policy(SuccessPolicy::OnlyIfSuccessfulSubtasks)
    }

    /// Keeps running the remaining steps when one of them fails. The failed
    /// subtask still records FAIL. Invalid-state errors are never tolerated.
    pub fn tolerate_failures(mut self) -> Self {
        self.tolerate_failures = true;
        self
    }

    pub fn build(self) -> Task<P> {
        let Self {
            common,
            executors,
            policy,
            tolerate_failures,
        } = self;

        common.finish(body_fn(move |ctx, params| {
            for executor in &executors {
                if let Err(err) = executor(ctx, params) {
                    let fatal = matches!(
                        err.downcast_ref::<MigrationError>(),
                        Some(MigrationError::InvalidState(_))
                    );

                    if !tolerate_failures || fatal {
                        return Err(err);
                    }

                    tracing::warn!(path = %ctx.path(), "Tolerating subtask failure: {err}");
                }
            }

            Ok(match policy {
                SuccessPolicy::Always => TaskResult::success(),
                SuccessPolicy::OnlyIfSuccessfulSubtasks if ctx.has_succeeded_subtasks() => {
                    TaskResult::success()
                }
                SuccessPolicy::OnlyIfSuccessfulSubtasks => TaskResult::skipped(),
            })
        }))
    }
}

impl<S> CompositeBuilder<ResourceParams<S>>
where
    S: Send + Sync + 'static,
{
    /// Runs `task` once per resource `selector` finds from the current one.
    pub fn fan_out(self, selector: Selector, task: Task<ResourceParams<S>>) -> Self {
        self.executor(move |ctx, params| {
            for downstream in selector.fan_out(params)? {
                ctx.execute(&task, &downstream)?;
            }
            Ok(())
        })
    }

    /// Like [`fan_out`](Self::fan_out), building the subtask per match so it
    /// can be named after the resource.
    pub fn fan_out_with<F>(self, selector: Selector, factory: F) -> Self
    where
        F: Fn(&ResourceParams<S>) -> anyhow::Result<Task<ResourceParams<S>>> + Send + Sync + 'static,
    {
        self.executor(move |ctx, params| {
            for downstream in selector.fan_out(params)? {
                let task = factory(&downstream)?;
                ctx.execute(&task, &downstream)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use proptest::prelude::*;

    use super::*;
    use crate::engine::{ExecutionTree, Status};
    use crate::error::Aborted;
    use crate::{Environment, Migration};

    fn ok(name: &str) -> Task<()> {
        Task::leaf(name).run(|_, _| Ok(TaskResult::success()))
    }

    fn skip(name: &str) -> Task<()> {
        Task::leaf(name)
            .skip_policy(SkipPolicy::always())
            .run(|_, _| Ok(TaskResult::success()))
    }

    fn failing(name: &str) -> Task<()> {
        Task::leaf(name).run(|_, _| Err(anyhow::anyhow!("boom")))
    }

    fn statuses(tree: &ExecutionTree) -> Vec<(String, Status)> {
        let root = tree.root().unwrap();
        tree[root]
            .children()
            .iter()
            .map(|&id| (tree[id].name().to_string(), tree[id].status().unwrap()))
            .collect()
    }

    #[test]
    fn test_success_with_skipped_sibling() {
        let task = Task::composite("root").subtask(ok("a")).subtask(skip("b")).build();
        let tree = Migration::default().run_once(&task, &()).unwrap();

        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Success));
        assert_eq!(
            statuses(&tree),
            vec![
                ("a".to_string(), Status::Success),
                ("b".to_string(), Status::Skipped)
            ]
        );
    }

    #[test]
    fn test_only_skipped_children_means_skipped() {
        let task = Task::composite("root").subtask(skip("a")).build();
        let tree = Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Skipped));
    }

    #[test]
    fn test_no_children_means_skipped() {
        let task: Task<()> = Task::composite("root").build();
        let tree = Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Skipped));
        assert!(tree[tree.root().unwrap()].children().is_empty());
    }

    #[test]
    fn test_succeed_always() {
        let task = Task::composite("root").subtask(skip("a")).succeed_always().build();
        let tree = Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Success));
    }

    #[test]
    fn test_only_direct_children_count() {
        let mid: Task<()> = Task::leaf("mid").run(|ctx, _| {
            ctx.execute(&ok("deep"), &())?;
            Ok(TaskResult::skipped())
        });
        let task = Task::composite("root").subtask(mid).build();

        let tree = Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Skipped));

        let deep = tree.find("root > mid > deep").unwrap();
        assert_eq!(tree[deep].status(), Some(Status::Success));
    }

    #[test]
    fn test_fail_fast() {
        let task = Task::composite("root")
            .subtask(ok("x"))
            .subtask(failing("y"))
            .subtask(ok("z"))
            .build();

        let Aborted { tree, error } = Migration::default().run_once(&task, &()).unwrap_err();
        let MigrationError::Failure(failure) = error else {
            panic!("expected a failure");
        };
        assert_eq!(failure.path(), "root > y");
        assert_eq!(failure.cause().to_string(), "boom");

        assert_eq!(
            statuses(&tree),
            vec![("x".to_string(), Status::Success), ("y".to_string(), Status::Fail)]
        );
        assert!(tree.find("root > z").is_none());

        let root = &tree[tree.root().unwrap()];
        assert_eq!(root.status(), Some(Status::Fail));
        assert_eq!(root.result().unwrap().failure().unwrap().path(), "root > y");
    }

    #[test]
    fn test_failure_propagates_through_ancestors() {
        let task = Task::composite("root")
            .subtask(Task::composite("mid").subtask(failing("leaf")).build())
            .subtask(ok("after"))
            .build();

        let Aborted { tree, .. } = Migration::default().run_once(&task, &()).unwrap_err();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.summary().failed, 3);
        assert!(tree.find("root > after").is_none());
    }

    #[test]
    fn test_tolerate_failures() {
        let task = Task::composite("root")
            .subtask(failing("y"))
            .subtask(ok("z"))
            .tolerate_failures()
            .build();

        let tree = Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(
            statuses(&tree),
            vec![("y".to_string(), Status::Fail), ("z".to_string(), Status::Success)]
        );
        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Success));
    }

    #[test]
    fn test_unnamed_subtask_is_invalid() {
        let task = Task::composite("root").subtask(ok("")).tolerate_failures().build();
        let Aborted { error, tree } = Migration::default().run_once(&task, &()).unwrap_err();
        assert!(matches!(error, MigrationError::InvalidState(_)));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.summary().failed, 1);
    }

    #[test]
    fn test_skip_bypasses_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (c1, c2, c3) = (calls.clone(), calls.clone(), calls.clone());

        let task: Task<()> = Task::composite("root")
            .skip_policy(SkipPolicy::always())
            .before(move |_, _| {
                c1.lock().unwrap().push("before");
                Ok(())
            })
            .after(move |_, _| {
                c2.lock().unwrap().push("after");
                Ok(())
            })
            .executor(move |_, _| {
                c3.lock().unwrap().push("body");
                Ok(())
            })
            .build();

        let tree = Migration::default().run_once(&task, &()).unwrap();
        let root = &tree[tree.root().unwrap()];
        assert_eq!(root.status(), Some(Status::Skipped));
        assert!(root.children().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hook_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (c1, c2, c3) = (calls.clone(), calls.clone(), calls.clone());

        let task: Task<()> = Task::leaf("leaf")
            .before(move |_, _| {
                c1.lock().unwrap().push("before");
                Ok(())
            })
            .after(move |_, _| {
                c2.lock().unwrap().push("after");
                Ok(())
            })
            .run_ok(move |_, _| {
                c3.lock().unwrap().push("body");
                Ok(())
            });

        Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["before", "body", "after"]);
    }

    #[test]
    fn test_failing_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (c1, c2) = (calls.clone(), calls.clone());

        let task: Task<()> = Task::composite("root")
            .subtask(
                Task::leaf("before-fails")
                    .before(|_, _| Err(anyhow::anyhow!("no backup")))
                    .run_ok(move |_, _| {
                        c1.lock().unwrap().push("body");
                        Ok(())
                    }),
            )
            .tolerate_failures()
            .subtask(
                Task::leaf("after-fails")
                    .after(|_, _| Err(anyhow::anyhow!("no reload")))
                    .run_ok(move |_, _| {
                        c2.lock().unwrap().push("body");
                        Ok(())
                    }),
            )
            .build();

        let tree = Migration::default().run_once(&task, &()).unwrap();
        assert_eq!(
            statuses(&tree),
            vec![
                ("before-fails".to_string(), Status::Fail),
                ("after-fails".to_string(), Status::Fail)
            ]
        );
        // the body ran only for the task whose before hook succeeded
        assert_eq!(*calls.lock().unwrap(), vec!["body"]);

        let id = tree.find("root > after-fails").unwrap();
        let failure = tree[id].result().unwrap().failure().unwrap();
        assert_eq!(failure.path(), "root > after-fails");
        assert_eq!(failure.cause().to_string(), "no reload");
    }

    #[test]
    fn test_failing_hook_aborts() {
        let task: Task<()> = Task::composite("root")
            .subtask(
                Task::leaf("x")
                    .after(|_, _| Err(anyhow::anyhow!("no reload")))
                    .run(|_, _| Ok(TaskResult::success())),
            )
            .subtask(ok("y"))
            .build();

        let Aborted { tree, error } = Migration::default().run_once(&task, &()).unwrap_err();
        assert!(matches!(error, MigrationError::Failure(ref f) if f.path() == "root > x"));
        assert!(tree.find("root > y").is_none());
        assert_eq!(tree[tree.root().unwrap()].status(), Some(Status::Fail));
    }

    #[test]
    fn test_environment_skip() {
        let task = Task::composite("root")
            .subtask(ok("a"))
            .subtask(ok("b"))
            .subtask(Task::leaf("c").skip_key("custom").run(|_, _| Ok(TaskResult::success())))
            .build();

        let environment = Environment::new().with("a.skip", "true").with("custom.skip", "true");
        let tree = Migration::with_environment(environment).run_once(&task, &()).unwrap();
        assert_eq!(
            statuses(&tree),
            vec![
                ("a".to_string(), Status::Skipped),
                ("b".to_string(), Status::Success),
                ("c".to_string(), Status::Skipped),
            ]
        );
    }

    #[test]
    fn test_subtask_with_mapped_params() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let leaf: Task<String> = Task::leaf("print").run_ok(move |_, value: &String| {
            sink.lock().unwrap().push(value.clone());
            Ok(())
        });

        let task: Task<u32> = Task::composite("root")
            .subtask_with(leaf, |n: &u32| format!("n={n}"))
            .build();

        Migration::default().run_once(&task, &7).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["n=7"]);
    }

    #[test]
    fn test_has_succeeded_subtasks_in_body() {
        let task: Task<()> = Task::leaf("root").run(|ctx, _| {
            assert!(!ctx.has_succeeded_subtasks());
            ctx.execute(&skip("a"), &())?;
            assert!(!ctx.has_succeeded_subtasks());
            let id = ctx.execute(&ok("b"), &())?;
            assert!(ctx.has_succeeded_subtasks());
            assert!(ctx.result_of(id).unwrap().is_success());
            Ok(TaskResult::success().with_attribute("children", "2"))
        });

        let tree = Migration::default().run_once(&task, &()).unwrap();
        let root = &tree[tree.root().unwrap()];
        assert_eq!(root.result().unwrap().attribute("children"), Some("2"));
    }

    proptest! {
        #[test]
        fn test_aggregation_rule(children in prop::collection::vec(any::<bool>(), 0..8), always in any::<bool>()) {
            let mut builder = Task::composite("root");
            for (i, succeeds) in children.iter().enumerate() {
                let name = format!("child-{i}");
                builder = builder.subtask(if *succeeds { ok(&name) } else { skip(&name) });
            }
            if always {
                builder = builder.succeed_always();
            }

            let tree = Migration::default().run_once(&builder.build(), &()).unwrap();
            let expected = if always || children.contains(&true) {
                Status::Success
            } else {
                Status::Skipped
            };
            prop_assert_eq!(tree[tree.root().unwrap()].status(), Some(expected));
            prop_assert_eq!(tree.len(), children.len() + 1);
        }
    }
}
