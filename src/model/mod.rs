//! The live configuration tree a migration works on.
//!
//! A [`Schema`] fixes the resource types and how they nest. [`Resource`]
//! handles address individual nodes and reach the actual state only through a
//! [`ManagementClient`]. [`Selector`]s query the tree, and
//! [`ResourceParams`] carry the result of a query into the tasks that run once
//! per match.

mod memory;
mod operation;
mod params;
mod resource;
mod schema;
mod selector;

pub use crate::model::memory::MemoryModel;
pub use crate::model::operation::{ManagementClient, Operation, ResourcePath};
pub use crate::model::params::ResourceParams;
pub use crate::model::resource::Resource;
pub use crate::model::schema::{ResourceType, Schema, SchemaBuilder};
pub use crate::model::selector::Selector;

/// Names of the operations understood by [`MemoryModel`] and issued by
/// [`Resource`].
pub mod ops {
    pub use crate::model::operation::{
        ADD, CHILD_TYPE, NAME, READ_CHILDREN_NAMES, READ_RESOURCE, REMOVE, VALUE, WRITE_ATTRIBUTE,
    };
}
