//! Build graph of entry points, packages and asset files
//!
//! Nodes are keyed by a canonical URL and kept in insertion order, so
//! `find` returns the first node that was put into the graph. Edges point from
//! a dependent to its dependency and are not checked for cycles.
use crate::entry_point::{EntryPoint, Package};
use crate::error::{BuildError, BuildResult};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Payload carried by a node
#[derive(Debug, Clone)]
pub enum NodeData {
    EntryPoint(Box<EntryPoint>),
    Package(Box<Package>),
    /// Plain file, such as a copied asset
    File,
}

/// Build state of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Dirty,
    InProgress,
    Done,
}

/// A node in the build graph
#[derive(Debug, Clone)]
pub struct Node {
    url: String,
    data: NodeData,
    state: NodeState,
    depends_on: BTreeSet<String>,
}

impl Node {
    pub fn new(url: impl Into<String>, data: NodeData) -> Self {
        Self {
            url: url.into(),
            data,
            state: NodeState::Dirty,
            depends_on: BTreeSet::new(),
        }
    }

    /// Node for a plain file
    pub fn file(url: impl Into<String>) -> Self {
        Self::new(url, NodeData::File)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Record that this node depends on the node at `url`
    pub fn depends_on(&mut self, url: impl Into<String>) {
        self.depends_on.insert(url.into());
    }

    /// URLs of the nodes this node depends on
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().map(String::as_str)
    }

    pub fn entry_point(&self) -> Option<&EntryPoint> {
        match &self.data {
            NodeData::EntryPoint(entry_point) => Some(entry_point),
            _ => None,
        }
    }

    pub fn package(&self) -> Option<&Package> {
        match &self.data {
            NodeData::Package(package) => Some(package),
            _ => None,
        }
    }
}

/// Node is an entry point
pub fn is_entry_point(node: &Node) -> bool {
    matches!(node.data, NodeData::EntryPoint(_))
}

/// Node is a package
pub fn is_package(node: &Node) -> bool {
    matches!(node.data, NodeData::Package(_))
}

/// Node is a plain file
pub fn is_file(node: &Node) -> bool {
    matches!(node.data, NodeData::File)
}

/// Node is currently being built
pub fn is_in_progress(node: &Node) -> bool {
    node.state == NodeState::InProgress
}

/// Graph of nodes for one build run
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl BuildGraph {
    /// Create a new empty build graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&Node> {
        self.index.get(url).map(|&i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut Node> {
        match self.index.get(url) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    /// Insert a node, replacing any node with the same URL in place
    pub fn put(&mut self, node: Node) {
        match self.index.get(&node.url) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(node.url.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// First node matching the predicate, in insertion order
    pub fn find<P>(&self, predicate: P) -> Option<&Node>
    where
        P: Fn(&Node) -> bool,
    {
        self.nodes.iter().find(|node| predicate(node))
    }

    /// All nodes matching the predicate, in insertion order
    pub fn filter<P>(&self, predicate: P) -> Vec<&Node>
    where
        P: Fn(&Node) -> bool,
    {
        self.nodes.iter().filter(|node| predicate(node)).collect()
    }

    /// Record a `dependent -> dependency` edge between two existing nodes
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> BuildResult<()> {
        if !self.index.contains_key(dependency) {
            return Err(BuildError::node_not_found(dependency));
        }
        let node = self
            .get_mut(dependent)
            .ok_or_else(|| BuildError::node_not_found(dependent))?;
        node.depends_on(dependency);
        Ok(())
    }

    /// Every node that depends on `url`, directly or transitively
    pub fn dependents_of(&self, url: &str) -> Vec<&str> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([url]);
        let mut dependents = Vec::new();

        while let Some(current) = queue.pop_front() {
            for node in &self.nodes {
                if node.depends_on.contains(current) && visited.insert(node.url.as_str()) {
                    if node.url != url {
                        dependents.push(node.url.as_str());
                    }
                    queue.push_back(node.url.as_str());
                }
            }
        }

        dependents
    }

    /// Mark an entry point as the one being built
    ///
    /// Only one entry point may be in progress at a time.
    pub fn begin(&mut self, url: &str) -> BuildResult<()> {
        if let Some(active) = self.find(|node| is_entry_point(node) && is_in_progress(node)) {
            if active.url != url {
                return Err(BuildError::EntryPointAlreadyInProgress {
                    requested: url.to_string(),
                    active: active.url.clone(),
                });
            }
        }
        self.set_state(url, NodeState::InProgress)
    }

    /// Mark a node as built
    pub fn finish(&mut self, url: &str) -> BuildResult<()> {
        self.set_state(url, NodeState::Done)
    }

    /// Return a node to `Dirty` after a failed build
    pub fn abandon(&mut self, url: &str) -> BuildResult<()> {
        self.set_state(url, NodeState::Dirty)
    }

    fn set_state(&mut self, url: &str, state: NodeState) -> BuildResult<()> {
        let node = self
            .get_mut(url)
            .ok_or_else(|| BuildError::node_not_found(url))?;
        node.state = state;
        Ok(())
    }

    /// The entry point node currently in progress
    pub fn entry_point_in_progress(&self) -> BuildResult<&Node> {
        self.find(|node| is_entry_point(node) && is_in_progress(node))
            .ok_or(BuildError::NoEntryPointInProgress)
    }

    /// The package node, if the graph has one
    pub fn package(&self) -> Option<&Package> {
        self.find(is_package).and_then(Node::package)
    }

    /// All entry points in insertion order
    pub fn entry_points(&self) -> Vec<&EntryPoint> {
        self.nodes.iter().filter_map(Node::entry_point).collect()
    }
}
