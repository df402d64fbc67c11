use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ManagementError;
use crate::model::operation::{ManagementClient, Operation, ResourcePath};
use crate::model::schema::ResourceType;

/// Live handle on one resource of the configuration tree.
///
/// A handle holds only the resource's type and address. Every query goes
/// through the management client, so two reads separated by a mutation may
/// disagree. Handles compare by path.
#[derive(Clone)]
pub struct Resource {
    ty: ResourceType,
    path: ResourcePath,
    client: Arc<dyn ManagementClient>,
}

impl Resource {
    /// Handle on the root of the tree described by `ty`'s schema.
    pub fn root(name: impl Into<String>, client: Arc<dyn ManagementClient>, ty: ResourceType) -> Self {
        let path = ResourcePath::root(ty.tag(), name);
        Self { ty, path, client }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.ty
    }

    pub fn name(&self) -> &str {
        self.path.last().map(|(_, name)| name).unwrap_or_default()
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Management address, such as `/subsystem=undertow`.
    pub fn address(&self) -> String {
        self.path.to_string()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn client(&self) -> &Arc<dyn ManagementClient> {
        &self.client
    }

    /// The enclosing resource, looked up by address. `None` for the root.
    pub fn parent(&self) -> Option<Resource> {
        let path = self.path.parent()?;
        let (tag, _) = path.last()?;
        let ty = self.ty.schema().get(tag)?;

        Some(Self {
            ty,
            path,
            client: self.client.clone(),
        })
    }

    /// Walks up to the root resource.
    pub fn top(&self) -> Resource {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Handle on a child, whether or not it exists.
    pub fn child(&self, ty: &ResourceType, name: impl Into<String>) -> Resource {
        Self {
            ty: ty.clone(),
            path: self.path.join(ty.tag(), name),
            client: self.client.clone(),
        }
    }

    /// Names of the existing children of type `ty`. Types this resource does
    /// not declare have no children, and neither does a resource that is gone.
    pub fn child_names(&self, ty: &ResourceType) -> Result<BTreeSet<String>, ManagementError> {
        if self.ty.child_type(ty.tag()).is_none() {
            return Ok(BTreeSet::new());
        }

        let op = Operation::read_children_names(self.path.clone(), ty.tag());
        let value = match self.client.execute(&op) {
            Ok(value) => value,
            Err(ManagementError::NotFound { .. }) => return Ok(BTreeSet::new()),
            Err(err) => return Err(err),
        };

        let Value::Array(names) = value else {
            return Err(ManagementError::Failed {
                operation: op.to_string(),
                description: format!("expected a list of names, got {value}"),
            });
        };

        names
            .into_iter()
            .map(|name| match name {
                Value::String(name) => Ok(name),
                other => Err(ManagementError::Failed {
                    operation: op.to_string(),
                    description: format!("expected a name, got {other}"),
                }),
            })
            .collect()
    }

    /// Existing children of type `ty`, ordered by name.
    pub fn children(&self, ty: &ResourceType) -> Result<Vec<Resource>, ManagementError> {
        Ok(self
            .child_names(ty)?
            .into_iter()
            .map(|name| self.child(ty, name))
            .collect())
    }

    /// Whether the resource is currently listed by its parent. A resource
    /// below a removed ancestor does not exist.
    pub fn exists(&self) -> Result<bool, ManagementError> {
        match self.parent() {
            Some(parent) => Ok(parent.child_names(&self.ty)?.contains(self.name())),
            None => Ok(true),
        }
    }

    /// Current attributes of the resource.
    pub fn read(&self) -> Result<Map<String, Value>, ManagementError> {
        let op = Operation::read_resource(self.path.clone());
        match self.client.execute(&op)? {
            Value::Object(attributes) => Ok(attributes),
            Value::Null => Ok(Map::new()),
            other => Err(ManagementError::Failed {
                operation: op.to_string(),
                description: format!("expected an object, got {other}"),
            }),
        }
    }

    pub fn write_attribute(&self, name: &str, value: impl Into<Value>) -> Result<(), ManagementError> {
        self.client
            .execute(&Operation::write_attribute(self.path.clone(), name, value.into()))?;
        Ok(())
    }

    pub fn add_child(
        &self,
        ty: &ResourceType,
        name: impl Into<String>,
        attributes: Map<String, Value>,
    ) -> Result<Resource, ManagementError> {
        if self.ty.child_type(ty.tag()).is_none() {
            return Err(ManagementError::Malformed(format!(
                "'{}' does not declare child type '{}'",
                self.ty, ty
            )));
        }

        let child = self.child(ty, name);
        self.client
            .execute(&Operation::add(child.path.clone(), attributes))?;
        Ok(child)
    }

    pub fn remove_self(&self) -> Result<(), ManagementError> {
        tracing::debug!(address = %self.path, "Removing resource");
        self.client.execute(&Operation::remove(self.path.clone()))?;
        Ok(())
    }

    pub fn remove_child(&self, ty: &ResourceType, name: &str) -> Result<(), ManagementError> {
        self.child(ty, name).remove_self()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for Resource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Resource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.path, f)
    }
}

impl Debug for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Resource({} {})", self.ty, self.path)
    }
}
