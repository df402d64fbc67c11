#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
mod core;
mod engine;
mod error;
pub mod model;
mod utils;

pub use crate::blueprint::{CompositeBuilder, LeafBuilder, SuccessPolicy};
pub use crate::core::{Environment, Globals, MigrationFiles};
pub use crate::engine::{
    ExecutionId, ExecutionTree, Migration, PATH_SEPARATOR, SkipPolicy, Status, Summary, Task,
    TaskContext, TaskExecution, TaskName, TaskResult, Walk,
};
pub use crate::error::*;
pub use crate::model::{
    ManagementClient, MemoryModel, Operation, Resource, ResourceParams, ResourcePath,
    ResourceType, Schema, SchemaBuilder, Selector,
};
pub use crate::utils::init_logging;
