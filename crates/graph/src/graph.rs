use depmap_model::{Link, Node, NodeType, ROOT_NAME};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::collections::HashMap;

/// The assembled dependency graph.
///
/// Nodes are keyed by fully-qualified name; re-insertion of a known name
/// merges attributes instead of duplicating. Links whose endpoints both
/// exist materialize as petgraph edges; the rest stay queryable as
/// unresolved links, classified by their [`Link::target_type`] hint.
pub struct DependencyGraph {
    inner: StableDiGraph<Node, usize>,
    name_index: HashMap<String, NodeIndex>,
    links: Vec<Link>,
    /// Link indices still missing an endpoint, keyed by the missing name.
    waiting: HashMap<String, Vec<usize>>,
    materialized: Vec<bool>,
    incomplete: bool,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("node_count", &self.inner.node_count())
            .field("link_count", &self.links.len())
            .field("incomplete", &self.incomplete)
            .finish()
    }
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            inner: StableDiGraph::new(),
            name_index: HashMap::new(),
            links: Vec::new(),
            waiting: HashMap::new(),
            materialized: Vec::new(),
            incomplete: false,
        };
        graph.insert_node(Node::new(ROOT_NAME, NodeType::Root));
        graph
    }

    /// Insert or merge a node. Returns the previous kind when an existing
    /// node changed kind, so the caller can log the conflict.
    pub fn insert_node(&mut self, node: Node) -> Option<NodeType> {
        let name = node.name.clone();
        let conflict = if let Some(&idx) = self.name_index.get(&name) {
            let existing = self
                .inner
                .node_weight_mut(idx)
                .expect("indexed node exists");
            let previous = existing.node_type;
            existing.merge_from(node);
            (previous != existing.node_type).then_some(previous)
        } else {
            let idx = self.inner.add_node(node);
            self.name_index.insert(name.clone(), idx);
            None
        };

        // A late-arriving node may complete links parked on its name.
        if let Some(parked) = self.waiting.remove(&name) {
            for link_idx in parked {
                self.try_materialize(link_idx);
            }
        }
        conflict
    }

    /// Record a link. The target (or even the source) need not exist yet,
    /// or ever.
    pub fn insert_link(&mut self, link: Link) {
        let idx = self.links.len();
        self.links.push(link);
        self.materialized.push(false);
        self.try_materialize(idx);
    }

    fn try_materialize(&mut self, link_idx: usize) {
        if self.materialized[link_idx] {
            return;
        }
        let link = &self.links[link_idx];
        let source = self.name_index.get(&link.source).copied();
        let target = self.name_index.get(&link.target).copied();
        match (source, target) {
            (Some(s), Some(t)) => {
                self.inner.add_edge(s, t, link_idx);
                self.materialized[link_idx] = true;
            }
            (None, _) => {
                let key = self.links[link_idx].source.clone();
                self.waiting.entry(key).or_default().push(link_idx);
            }
            (_, None) => {
                let key = self.links[link_idx].target.clone();
                self.waiting.entry(key).or_default().push(link_idx);
            }
        }
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.name_index
            .get(name)
            .and_then(|&idx| self.inner.node_weight(idx))
    }

    pub(crate) fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.name_index
            .get(name)
            .and_then(|&idx| self.inner.node_weight_mut(idx))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    pub fn all_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Links whose source or target never arrived as a node.
    pub fn unresolved_links(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .zip(self.materialized.iter())
            .filter_map(|(link, done)| (!done).then_some(link))
    }

    /// Direct children of a node in the containment tree. `ROOT_NAME`
    /// additionally owns every parentless node.
    pub fn children_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        let under_root = name == ROOT_NAME;
        self.all_nodes().filter(move |node| match &node.parent {
            Some(parent) => parent == name,
            None => under_root && node.name != ROOT_NAME,
        })
    }

    /// Containment chain from a node up to the root, nearest first.
    ///
    /// Bounded by the kind depth, so even a malformed parent cycle cannot
    /// loop.
    #[must_use]
    pub fn ancestors_of(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.node(name);
        while let Some(node) = current {
            if chain.len() > NodeType::MAX_DEPTH as usize {
                break;
            }
            match &node.parent {
                Some(parent) => {
                    chain.push(parent.clone());
                    current = self.node(parent);
                }
                None => {
                    if node.name != ROOT_NAME {
                        chain.push(ROOT_NAME.to_string());
                    }
                    break;
                }
            }
        }
        chain
    }

    /// Outgoing dependency links of a node (materialized or not).
    pub fn links_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Link> {
        self.links.iter().filter(move |link| link.source == name)
    }

    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Mark the graph as explicitly partial (cancelled parse).
    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
