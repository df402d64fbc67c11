//! Composable queries over the live resource tree.
//!
//! A [`Selector`] maps one resource to a set of resources. Applied to several
//! inputs it yields the union of the per-input results, so duplicate inputs
//! are harmless. Selectors hold no state of their own: given the same tree
//! they return the same set.
//!
//! ```
//! use std::sync::Arc;
//! use utsuri::{MemoryModel, Resource, Schema, Selector};
//!
//! let schema = Schema::builder("server")
//!     .child("server", "subsystem")
//!     .child("subsystem", "handler")
//!     .build()
//!     .unwrap();
//!
//! let model = MemoryModel::from_json("server", "standalone", r#"{
//!     "subsystem=logging": { "handler=console": {}, "handler=file": {} }
//! }"#).unwrap();
//!
//! let root = Resource::root("standalone", Arc::new(model), schema.root());
//! let handlers = Selector::select_resources(&schema.get("handler").unwrap());
//!
//! let names: Vec<_> = handlers
//!     .collect(&root)
//!     .unwrap()
//!     .into_iter()
//!     .map(|r| r.name().to_string())
//!     .collect();
//! assert_eq!(names, ["console", "file"]);
//! ```

use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use glob::Pattern;

use crate::error::ManagementError;
use crate::model::resource::Resource;
use crate::model::schema::ResourceType;

type SelectFn =
    Arc<dyn Fn(&Resource) -> Result<BTreeSet<Resource>, ManagementError> + Send + Sync>;

#[derive(Clone)]
pub struct Selector {
    select: SelectFn,
}

impl Selector {
    pub fn new<F>(select: F) -> Self
    where
        F: Fn(&Resource) -> Result<BTreeSet<Resource>, ManagementError> + Send + Sync + 'static,
    {
        Self {
            select: Arc::new(select),
        }
    }

    pub fn collect(&self, resource: &Resource) -> Result<BTreeSet<Resource>, ManagementError> {
        (self.select)(resource)
    }

    /// Union of the results for every input.
    pub fn collect_all<'a, I>(&self, resources: I) -> Result<BTreeSet<Resource>, ManagementError>
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        let mut found = BTreeSet::new();
        for resource in resources {
            found.extend(self.collect(resource)?);
        }
        Ok(found)
    }

    /// Applies `self`, then `next` to everything `self` found.
    pub fn and_then(&self, next: &Selector) -> Selector {
        let (first, next) = (self.clone(), next.clone());
        Selector::new(move |resource| next.collect_all(&first.collect(resource)?))
    }

    /// Applies `before`, then `self`.
    pub fn compose(&self, before: &Selector) -> Selector {
        before.and_then(self)
    }

    pub fn union(&self, other: &Selector) -> Selector {
        let (a, b) = (self.clone(), other.clone());
        Selector::new(move |resource| {
            let mut found = a.collect(resource)?;
            found.extend(b.collect(resource)?);
            Ok(found)
        })
    }

    /// Keeps the resources matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Selector
    where
        F: Fn(&Resource) -> bool + Send + Sync + 'static,
    {
        let inner = self.clone();
        Selector::new(move |resource| {
            let mut found = inner.collect(resource)?;
            found.retain(|r| predicate(r));
            Ok(found)
        })
    }

    /// The input resource itself.
    pub fn identity() -> Selector {
        Selector::new(|resource| Ok(BTreeSet::from([resource.clone()])))
    }

    /// The parent of the input, nothing for the root.
    pub fn to_parent() -> Selector {
        Selector::new(|resource| Ok(resource.parent().into_iter().collect()))
    }

    /// Direct children of type `ty`.
    pub fn to_children(ty: &ResourceType) -> Selector {
        let ty = ty.clone();
        Selector::new(move |resource| Ok(resource.children(&ty)?.into_iter().collect()))
    }

    /// Every resource of type `ty` below the input, at any depth.
    pub fn select_resources(ty: &ResourceType) -> Selector {
        Self::search(ty, NameFilter::Any)
    }

    /// The resources of type `ty` named `name` below the input, at any depth.
    pub fn select_resource(ty: &ResourceType, name: impl Into<String>) -> Selector {
        Self::search(ty, NameFilter::Exact(name.into()))
    }

    /// Resources of type `ty` below the input whose names match `pattern`.
    pub fn select_matching(ty: &ResourceType, pattern: Pattern) -> Selector {
        Self::search(ty, NameFilter::Pattern(pattern))
    }

    fn search(ty: &ResourceType, filter: NameFilter) -> Selector {
        let ty = ty.clone();
        Selector::new(move |resource| {
            let mut found = BTreeSet::new();
            descend(resource, &ty, &filter, &mut found)?;
            Ok(found)
        })
    }
}

impl Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Selector(*)")
    }
}

enum NameFilter {
    Any,
    Exact(String),
    Pattern(Pattern),
}

impl NameFilter {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Exact(exact) => exact == name,
            NameFilter::Pattern(pattern) => pattern.matches(name),
        }
    }
}

/// Collects matches below `resource`, descending only through child types
/// that are, or can contain, the target type.
fn descend(
    resource: &Resource,
    target: &ResourceType,
    filter: &NameFilter,
    found: &mut BTreeSet<Resource>,
) -> Result<(), ManagementError> {
    for child_type in resource.resource_type().child_types() {
        let is_target = child_type == *target;
        let leads_to_target = child_type.has_descendant(target);

        if !is_target && !leads_to_target {
            continue;
        }

        for child in resource.children(&child_type)? {
            if leads_to_target {
                descend(&child, target, filter, found)?;
            }
            if is_target && filter.matches(child.name()) {
                found.insert(child);
            }
        }
    }

    Ok(())
}
