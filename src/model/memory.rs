use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::ManagementError;
use crate::model::operation::{
    ADD, CHILD_TYPE, ManagementClient, NAME, Operation, READ_CHILDREN_NAMES, READ_RESOURCE,
    REMOVE, ResourcePath, VALUE, WRITE_ATTRIBUTE,
};

#[derive(Debug, Default, Clone)]
struct Node {
    attributes: Map<String, Value>,
    children: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory configuration tree answering management operations.
///
/// Nodes are stored flat, keyed by path, with each node keeping the names of
/// its children per type. Removing a resource removes everything below it.
#[derive(Debug)]
pub struct MemoryModel {
    root: ResourcePath,
    nodes: RwLock<BTreeMap<ResourcePath, Node>>,
}

impl MemoryModel {
    pub fn new(root_type: impl Into<String>, root_name: impl Into<String>) -> Self {
        let root = ResourcePath::root(root_type, root_name);
        let nodes = BTreeMap::from([(root.clone(), Node::default())]);

        Self {
            root,
            nodes: RwLock::new(nodes),
        }
    }

    /// Builds a model from a JSON object. Keys of the form `type=name` holding
    /// an object are child resources, every other key is an attribute.
    ///
    /// ```
    /// use utsuri::MemoryModel;
    ///
    /// let model = MemoryModel::from_json("server", "standalone", r#"{
    ///     "product-version": "8.0",
    ///     "subsystem=undertow": { "statistics-enabled": false }
    /// }"#).unwrap();
    ///
    /// let path = model.root().join("subsystem", "undertow");
    /// assert!(model.contains(&path));
    /// ```
    pub fn from_json(
        root_type: impl Into<String>,
        root_name: impl Into<String>,
        json: &str,
    ) -> Result<Self, ManagementError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| ManagementError::Malformed(format!("invalid model JSON: {err}")))?;

        let model = Self::new(root_type, root_name);
        let root = model.root.clone();
        model.seed(&root, &value)?;
        Ok(model)
    }

    /// Merges a JSON object into the resource at `path`, creating children as
    /// needed.
    pub fn seed(&self, path: &ResourcePath, value: &Value) -> Result<(), ManagementError> {
        let Value::Object(object) = value else {
            return Err(ManagementError::Malformed(format!(
                "resource '{path}' must be described by an object"
            )));
        };

        let mut attributes = Map::new();
        let mut children = Vec::new();

        for (key, value) in object {
            match (key.split_once('='), value) {
                (Some((ty, name)), Value::Object(_)) => children.push((path.join(ty, name), value)),
                _ => {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }

        {
            let mut nodes = self.write();
            let node = nodes
                .get_mut(path)
                .ok_or_else(|| ManagementError::NotFound {
                    address: path.to_string(),
                })?;
            node.attributes.extend(attributes);
        }

        for (child, value) in children {
            if !self.contains(&child) {
                self.insert(&child, Map::new())?;
            }
            self.seed(&child, value)?;
        }

        Ok(())
    }

    /// Adds a resource below an existing parent.
    pub fn insert(
        &self,
        path: &ResourcePath,
        attributes: Map<String, Value>,
    ) -> Result<(), ManagementError> {
        let (Some(parent), Some((ty, name))) = (path.parent(), path.last()) else {
            return Err(ManagementError::Duplicate {
                address: path.to_string(),
            });
        };

        let mut nodes = self.write();

        if nodes.contains_key(path) {
            return Err(ManagementError::Duplicate {
                address: path.to_string(),
            });
        }

        let parent = nodes
            .get_mut(&parent)
            .ok_or_else(|| ManagementError::NotFound {
                address: parent.to_string(),
            })?;

        parent
            .children
            .entry(ty.to_string())
            .or_default()
            .insert(name.to_string());

        nodes.insert(
            path.clone(),
            Node {
                attributes,
                children: BTreeMap::new(),
            },
        );

        Ok(())
    }

    pub fn root(&self) -> &ResourcePath {
        &self.root
    }

    pub fn contains(&self, path: &ResourcePath) -> bool {
        self.read().contains_key(path)
    }

    /// Every resource path currently present, in path order.
    pub fn paths(&self) -> Vec<ResourcePath> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<ResourcePath, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<ResourcePath, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(address: &ResourcePath) -> ManagementError {
        ManagementError::NotFound {
            address: address.to_string(),
        }
    }

    fn remove(&self, path: &ResourcePath) -> Result<(), ManagementError> {
        let (Some(parent), Some((ty, name))) = (path.parent(), path.last()) else {
            return Err(ManagementError::Failed {
                operation: REMOVE.to_string(),
                description: "the root resource cannot be removed".to_string(),
            });
        };

        let mut nodes = self.write();

        if !nodes.contains_key(path) {
            return Err(Self::not_found(path));
        }

        nodes.retain(|candidate, _| !candidate.starts_with(path));

        if let Some(parent) = nodes.get_mut(&parent)
            && let Some(names) = parent.children.get_mut(ty)
        {
            names.remove(name);
            if names.is_empty() {
                parent.children.remove(ty);
            }
        }

        Ok(())
    }
}

impl ManagementClient for MemoryModel {
    fn execute(&self, operation: &Operation) -> Result<Value, ManagementError> {
        let address = &operation.address;
        tracing::trace!(%operation, "Executing management operation");

        match operation.name.as_str() {
            READ_RESOURCE => {
                let nodes = self.read();
                let node = nodes.get(address).ok_or_else(|| Self::not_found(address))?;
                Ok(Value::Object(node.attributes.clone()))
            }
            READ_CHILDREN_NAMES => {
                let child_type = operation.require_str(CHILD_TYPE)?;
                let nodes = self.read();
                let node = nodes.get(address).ok_or_else(|| Self::not_found(address))?;

                let names = node
                    .children
                    .get(child_type)
                    .into_iter()
                    .flatten()
                    .map(|name| Value::String(name.clone()))
                    .collect();

                Ok(Value::Array(names))
            }
            ADD => {
                self.insert(address, operation.params.clone())?;
                Ok(Value::Null)
            }
            REMOVE => {
                self.remove(address)?;
                Ok(Value::Null)
            }
            WRITE_ATTRIBUTE => {
                let name = operation.require_str(NAME)?;
                let value = operation.params.get(VALUE).cloned().unwrap_or(Value::Null);

                let mut nodes = self.write();
                let node = nodes
                    .get_mut(address)
                    .ok_or_else(|| Self::not_found(address))?;
                node.attributes.insert(name.to_string(), value);
                Ok(Value::Null)
            }
            other => Err(ManagementError::UnknownOperation(other.to_string())),
        }
    }
}
