use std::sync::Arc;

use serde_json::json;
use utsuri::{
    Aborted, Environment, ManagementClient, MemoryModel, Migration, MigrationError, Resource,
    ResourceParams, ResourcePath, Schema, Selector, SkipPolicy, Status, Task, TaskName, TaskResult,
};

/// What the old server looked like, as far as the plan cares.
struct Source {
    removed_subsystems: Vec<&'static str>,
    statistics: bool,
}

type Params = ResourceParams<Source>;

fn schema() -> Arc<Schema> {
    Schema::builder("server")
        .child("server", "subsystem")
        .child("server", "interface")
        .child("subsystem", "handler")
        .build()
        .unwrap()
}

fn model() -> Arc<MemoryModel> {
    let model = MemoryModel::from_json(
        "server",
        "standalone",
        r#"{
            "interface=public": { "inet-address": "127.0.0.1" },
            "subsystem=logging": {
                "handler=console": { "level": "INFO" },
                "handler=file": { "level": "DEBUG" }
            },
            "subsystem=undertow": {},
            "subsystem=cmp": {}
        }"#,
    )
    .unwrap();

    Arc::new(model)
}

fn plan(schema: &Arc<Schema>) -> Task<Params> {
    let subsystem = schema.get("subsystem").unwrap();
    let handler = schema.get("handler").unwrap();
    let interface = schema.get("interface").unwrap();

    let remove_subsystems = Task::composite("remove-unsupported-subsystems")
        .fan_out_with(Selector::to_children(&subsystem), |p: &Params| {
            let name = TaskName::new("remove-subsystem").with_attribute("name", p.resource.name());
            Ok(Task::leaf(name).run(|_, p: &Params| {
                let name = p.resource.name();
                if !p.source.removed_subsystems.iter().any(|removed| *removed == name) {
                    return Ok(TaskResult::skipped());
                }
                p.resource.remove_self()?;
                Ok(TaskResult::success())
            }))
        })
        .build();

    let update_handlers = Task::composite("update-handlers")
        .fan_out(
            Selector::select_resources(&handler),
            Task::leaf("update-handler")
                .skip_policy(SkipPolicy::from_environment().or(SkipPolicy::when(
                    |_, p: &Params| p.resource
                        .read()
                        .map(|a| a.get("level") == Some(&json!("INFO")))
                        .unwrap_or(false),
                )))
                .run_ok(|_, p: &Params| {
                    p.resource.write_attribute("level", "INFO")?;
                    Ok(())
                }),
        )
        .build();

    let enable_statistics = Task::composite("enable-statistics")
        .skip_policy(SkipPolicy::when(|_, p: &Params| !p.source.statistics))
        .fan_out(
            Selector::select_resource(&subsystem, "undertow"),
            Task::leaf("write-statistics-enabled").run_ok(|_, p: &Params| {
                p.resource.write_attribute("statistics-enabled", true)?;
                Ok(())
            }),
        )
        .build();

    let update_interfaces = Task::composite("update-interfaces")
        .fan_out(
            Selector::to_children(&interface),
            Task::leaf("update-interface").run_ok(|_, _| Ok(())),
        )
        .build();

    Task::composite("migrate-server")
        .subtask(
            Task::leaf("copy-files").run_ok(|ctx, _| {
                ctx.files().register("old/standalone.xml", "new/standalone.xml")?;
                Ok(())
            }),
        )
        .subtask(remove_subsystems)
        .subtask(update_handlers)
        .subtask(enable_statistics)
        .subtask(update_interfaces)
        .build()
}

fn params(model: Arc<MemoryModel>, schema: &Arc<Schema>, source: Source) -> Params {
    let root = Resource::root("standalone", model, schema.root());
    ResourceParams::new(source, root)
}

fn status(tree: &utsuri::ExecutionTree, path: &str) -> Option<Status> {
    tree.find(path).and_then(|id| tree[id].status())
}

#[test]
fn test_full_plan() {
    let schema = schema();
    let model = model();
    let source = Source {
        removed_subsystems: vec!["cmp"],
        statistics: true,
    };

    let environment = Environment::from_args(["-Dupdate-interfaces.skip=true"]);
    let migration = Migration::with_environment(environment);
    assert!(migration.globals().files.copied().is_empty());

    let plan = plan(&schema);
    let tree = migration
        .run_once(&plan, &params(model.clone(), &schema, source))
        .unwrap();

    assert_eq!(status(&tree, "migrate-server"), Some(Status::Success));
    assert_eq!(status(&tree, "migrate-server > copy-files"), Some(Status::Success));
    assert_eq!(
        status(&tree, "migrate-server > remove-unsupported-subsystems > remove-subsystem(name=cmp)"),
        Some(Status::Success)
    );
    assert_eq!(
        status(&tree, "migrate-server > remove-unsupported-subsystems > remove-subsystem(name=logging)"),
        Some(Status::Skipped)
    );
    assert_eq!(status(&tree, "migrate-server > update-interfaces"), Some(Status::Skipped));
    assert_eq!(status(&tree, "migrate-server > enable-statistics"), Some(Status::Success));

    // console is already at INFO, only the file handler is updated
    let handlers: Vec<_> = tree
        .walk()
        .map(|(_, id)| &tree[id])
        .filter(|node| node.name().name() == "update-handler")
        .map(|node| node.status())
        .collect();
    assert_eq!(handlers, vec![Some(Status::Skipped), Some(Status::Success)]);

    let cmp = model.root().join("subsystem", "cmp");
    assert!(!model.contains(&cmp));

    let file = model.root().join("subsystem", "logging").join("handler", "file");
    let read = utsuri::Operation::read_resource(file);
    assert_eq!(model.execute(&read).unwrap()["level"], json!("INFO"));

    let undertow: ResourcePath = model.root().join("subsystem", "undertow");
    let read = utsuri::Operation::read_resource(undertow);
    assert_eq!(model.execute(&read).unwrap()["statistics-enabled"], json!(true));

    let summary = tree.summary();
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total, tree.len());

    let listing = tree.to_string();
    assert!(listing.starts_with("migrate-server [SUCCESS]\n  copy-files [SUCCESS]\n"));
}

#[test]
fn test_plan_without_statistics() {
    let schema = schema();
    let model = model();
    let source = Source {
        removed_subsystems: vec![],
        statistics: false,
    };

    let tree = Migration::default()
        .run_once(&plan(&schema), &params(model.clone(), &schema, source))
        .unwrap();

    let id = tree.find("migrate-server > enable-statistics").unwrap();
    assert_eq!(tree[id].status(), Some(Status::Skipped));
    assert!(tree[id].children().is_empty());

    let undertow = model.root().join("subsystem", "undertow");
    let attributes = model
        .execute(&utsuri::Operation::read_resource(undertow))
        .unwrap();
    assert!(attributes.get("statistics-enabled").is_none());
}

#[test]
fn test_management_failure_aborts_plan() {
    let schema = schema();
    let model = model();
    let subsystem = schema.get("subsystem").unwrap();

    let plan: Task<Params> = Task::composite("migrate-server")
        .subtask(Task::leaf("remove-ejb3").run_ok(move |_, p: &Params| {
            p.root.remove_child(&subsystem, "ejb3")?;
            Ok(())
        }))
        .subtask(Task::leaf("never-runs").run_ok(|_, _| Ok(())))
        .build();

    let source = Source {
        removed_subsystems: vec![],
        statistics: false,
    };

    let Aborted { tree, error } = Migration::default()
        .run_once(&plan, &params(model, &schema, source))
        .unwrap_err();

    let MigrationError::Failure(failure) = error else {
        panic!("expected a failure");
    };
    assert_eq!(failure.path(), "migrate-server > remove-ejb3");
    assert!(
        failure
            .cause()
            .downcast_ref::<utsuri::ManagementError>()
            .is_some()
    );

    assert_eq!(status(&tree, "migrate-server > remove-ejb3"), Some(Status::Fail));
    assert!(tree.find("migrate-server > never-runs").is_none());
    assert_eq!(tree.summary().failed, 2);
}
