use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ManagementError;

pub const READ_RESOURCE: &str = "read-resource";
pub const READ_CHILDREN_NAMES: &str = "read-children-names";
pub const ADD: &str = "add";
pub const REMOVE: &str = "remove";
pub const WRITE_ATTRIBUTE: &str = "write-attribute";

pub const CHILD_TYPE: &str = "child-type";
pub const NAME: &str = "name";
pub const VALUE: &str = "value";

/// Root-anchored address of a resource: the ordered `(type, name)` segments
/// from the root resource down.
///
/// The first segment always names the root. It is omitted when rendering the
/// management address, so the root itself renders as `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(Vec<(String, String)>);

impl ResourcePath {
    pub fn root(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self(vec![(ty.into(), name.into())])
    }

    pub fn join(&self, ty: impl Into<String>, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push((ty.into(), name.into()));
        Self(segments)
    }

    /// Path of the parent resource, `None` for the root.
    pub fn parent(&self) -> Option<ResourcePath> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Self(self.0[..n - 1].to_vec())),
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.len() <= 1
    }

    pub fn segments(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn last(&self) -> Option<(&str, &str)> {
        self.0.last().map(|(ty, name)| (ty.as_str(), name.as_str()))
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Whether `self` is `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &ResourcePath) -> bool {
        self.0.starts_with(&ancestor.0)
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }

        for (ty, name) in &self.0[1..] {
            write!(f, "/{ty}={name}")?;
        }

        Ok(())
    }
}

/// A structured management operation addressed at one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub address: ResourcePath,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl Operation {
    pub fn new(name: impl Into<String>, address: ResourcePath) -> Self {
        Self {
            name: name.into(),
            address,
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// String parameter required by the operation.
    pub fn require_str(&self, key: &str) -> Result<&str, ManagementError> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ManagementError::Malformed(format!("'{}' requires a string '{key}'", self.name))
            })
    }

    pub fn read_resource(address: ResourcePath) -> Self {
        Self::new(READ_RESOURCE, address)
    }

    pub fn read_children_names(address: ResourcePath, child_type: &str) -> Self {
        Self::new(READ_CHILDREN_NAMES, address).param(CHILD_TYPE, child_type)
    }

    pub fn add(address: ResourcePath, payload: Map<String, Value>) -> Self {
        Self {
            params: payload,
            ..Self::new(ADD, address)
        }
    }

    pub fn remove(address: ResourcePath) -> Self {
        Self::new(REMOVE, address)
    }

    pub fn write_attribute(address: ResourcePath, name: &str, value: Value) -> Self {
        Self::new(WRITE_ATTRIBUTE, address)
            .param(NAME, name)
            .param(VALUE, value)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.name)?;

        if !self.params.is_empty() {
            f.write_str("(")?;
            for (i, (k, v)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str(")")?;
        }

        Ok(())
    }
}

/// The live configuration state, reachable only through structured
/// operations. Implementations decide the transport.
pub trait ManagementClient: Send + Sync {
    fn execute(&self, operation: &Operation) -> Result<Value, ManagementError>;
}
