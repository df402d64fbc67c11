use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::error::ManagementError;
use crate::model::resource::Resource;
use crate::model::selector::Selector;

/// Parameters of a task working on one resource.
///
/// `source` is shared by every task of a plan, typically the configuration
/// being migrated from. `root` is the top of the target tree and `resource`
/// the resource this particular execution is about.
pub struct ResourceParams<S> {
    pub source: Arc<S>,
    pub resource: Resource,
    pub root: Resource,
}

impl<S> ResourceParams<S> {
    /// Parameters positioned on the root resource.
    pub fn new(source: S, root: Resource) -> Self {
        Self {
            source: Arc::new(source),
            resource: root.clone(),
            root,
        }
    }

    /// Same source and root, positioned on `resource`.
    pub fn at(&self, resource: Resource) -> Self {
        Self {
            source: self.source.clone(),
            resource,
            root: self.root.clone(),
        }
    }
}

impl<S> Clone for ResourceParams<S> {
    fn clone(&self) -> Self {
        self.at(self.resource.clone())
    }
}

impl<S> Debug for ResourceParams<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceParams")
            .field("resource", &self.resource)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Selector {
    /// One set of downstream parameters per resource found from the current
    /// one, in path order.
    pub fn fan_out<S>(&self, params: &ResourceParams<S>) -> Result<Vec<ResourceParams<S>>, ManagementError> {
        Ok(self
            .collect(&params.resource)?
            .into_iter()
            .map(|resource| params.at(resource))
            .collect())
    }
}
