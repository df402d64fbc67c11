use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;

use crate::error::SchemaError;

/// The shape of a configuration tree: which resource types exist and which
/// child types each of them declares.
///
/// The graph is frozen once built, so every type's descendant closure is
/// computed exactly once, in [`SchemaBuilder::build`].
pub struct Schema {
    graph: Graph<String, ()>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
    descendants: Vec<BTreeSet<NodeIndex>>,
}

impl Schema {
    pub fn builder(root: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(root)
    }

    pub fn root(self: &Arc<Self>) -> ResourceType {
        self.at(self.root)
    }

    /// Looks up a declared type by its tag.
    pub fn get(self: &Arc<Self>, tag: &str) -> Option<ResourceType> {
        self.index.get(tag).map(|&index| self.at(index))
    }

    pub fn resolve(self: &Arc<Self>, tag: &str) -> Result<ResourceType, SchemaError> {
        self.get(tag)
            .ok_or_else(|| SchemaError::UnknownType(tag.to_string()))
    }

    pub fn types(self: &Arc<Self>) -> impl Iterator<Item = ResourceType> + '_ {
        self.graph.node_indices().map(|index| self.at(index))
    }

    fn at(self: &Arc<Self>, index: NodeIndex) -> ResourceType {
        ResourceType {
            schema: self.clone(),
            index,
        }
    }
}

impl Debug for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("root", &self.graph[self.root])
            .field("types", &self.graph.node_count())
            .finish()
    }
}

/// Collects type declarations and child relations, then freezes them into a
/// [`Schema`].
///
/// ```
/// use utsuri::Schema;
///
/// let schema = Schema::builder("server")
///     .child("server", "subsystem")
///     .child("subsystem", "server-config")
///     .build()
///     .unwrap();
///
/// let server = schema.root();
/// let config = schema.get("server-config").unwrap();
/// assert!(server.descendant_types().contains(&config));
/// ```
#[derive(Debug)]
pub struct SchemaBuilder {
    root: String,
    declared: Vec<String>,
    edges: Vec<(String, String)>,
}

impl SchemaBuilder {
    fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            declared: vec![root.clone()],
            root,
            edges: Vec::new(),
        }
    }

    /// Declares a type. Declaring the same tag twice is an error at build time.
    pub fn declare(mut self, tag: impl Into<String>) -> Self {
        self.declared.push(tag.into());
        self
    }

    /// Declares `child` as a child type of `parent`. Both types are declared
    /// implicitly when not yet known.
    pub fn child(mut self, parent: impl Into<String>, child: impl Into<String>) -> Self {
        self.edges.push((parent.into(), child.into()));
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        if self.root.is_empty() {
            return Err(SchemaError::MissingRoot);
        }

        let mut graph = Graph::new();
        let mut index = HashMap::new();

        for tag in self.declared {
            if index.contains_key(&tag) {
                return Err(SchemaError::DuplicateType(tag));
            }
            let node = graph.add_node(tag.clone());
            index.insert(tag, node);
        }

        for (parent, child) in self.edges {
            let parent = *index
                .entry(parent)
                .or_insert_with_key(|tag| graph.add_node(tag.clone()));
            let child = *index
                .entry(child)
                .or_insert_with_key(|tag| graph.add_node(tag.clone()));

            if !graph.contains_edge(parent, child) {
                graph.add_edge(parent, child, ());
            }
        }

        let root = *index
            .get(&self.root)
            .ok_or(SchemaError::MissingRoot)?;

        let descendants = graph
            .node_indices()
            .map(|node| {
                // seed with the children so a type only reaches itself through a cycle
                let mut dfs = Dfs::empty(&graph);
                dfs.stack.extend(graph.neighbors(node));

                let mut found = BTreeSet::new();
                while let Some(next) = dfs.next(&graph) {
                    found.insert(next);
                }
                found
            })
            .collect();

        Ok(Arc::new(Schema {
            graph,
            index,
            root,
            descendants,
        }))
    }
}

/// A resource type within a [`Schema`].
///
/// Identity is the type's tag: two handles with the same tag are equal, even
/// when obtained through separate lookups.
#[derive(Clone)]
pub struct ResourceType {
    schema: Arc<Schema>,
    index: NodeIndex,
}

impl ResourceType {
    pub fn tag(&self) -> &str {
        &self.schema.graph[self.index]
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn is_root(&self) -> bool {
        self.index == self.schema.root
    }

    /// Declared direct child types, in declaration order.
    pub fn child_types(&self) -> Vec<ResourceType> {
        let mut children: Vec<_> = self
            .schema
            .graph
            .neighbors(self.index)
            .map(|index| self.schema.at(index))
            .collect();
        // petgraph walks outgoing edges newest first
        children.reverse();
        children
    }

    pub fn child_type(&self, tag: &str) -> Option<ResourceType> {
        self.child_types().into_iter().find(|ty| ty.tag() == tag)
    }

    /// All types reachable through child relations.
    pub fn descendant_types(&self) -> BTreeSet<ResourceType> {
        self.schema.descendants[self.index.index()]
            .iter()
            .map(|&index| self.schema.at(index))
            .collect()
    }

    pub fn has_descendant(&self, other: &ResourceType) -> bool {
        match self.schema.index.get(other.tag()) {
            Some(index) => self.schema.descendants[self.index.index()].contains(index),
            None => false,
        }
    }
}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }
}

impl Eq for ResourceType {}

impl Hash for ResourceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
    }
}

impl PartialOrd for ResourceType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(other.tag())
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl Debug for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceType({})", self.tag())
    }
}
