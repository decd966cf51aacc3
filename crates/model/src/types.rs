use serde::{Deserialize, Serialize};

/// Discriminates what kind of structural element a node represents.
///
/// The variants are ordered by containment depth: a node's kind must sit
/// deeper than its parent's (see [`NodeType::depth`]). Nested types are the
/// one sanctioned equal-depth containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Root,
    Solution,
    SolutionFolder,
    Assembly,
    Group,
    Dll,
    Exe,
    Namespace,
    Type,

    // ── Member subkinds ─────────────────────────────────────
    Field,
    Constructor,
    Event,
    Property,
    Method,
}

impl NodeType {
    /// Deepest value [`NodeType::depth`] can return; bounds parent-chain
    /// walks in the assembler.
    pub const MAX_DEPTH: u8 = 6;

    /// Containment depth of this kind (Root shallowest, members deepest).
    #[must_use]
    pub const fn depth(self) -> u8 {
        match self {
            NodeType::Root => 0,
            NodeType::Solution => 1,
            NodeType::SolutionFolder => 2,
            NodeType::Assembly | NodeType::Group | NodeType::Dll | NodeType::Exe => 3,
            NodeType::Namespace => 4,
            NodeType::Type => 5,
            NodeType::Field
            | NodeType::Constructor
            | NodeType::Event
            | NodeType::Property
            | NodeType::Method => 6,
        }
    }

    /// True for the member subkinds (fields, constructors, events,
    /// properties, methods).
    #[must_use]
    pub const fn is_member(self) -> bool {
        matches!(
            self,
            NodeType::Field
                | NodeType::Constructor
                | NodeType::Event
                | NodeType::Property
                | NodeType::Method
        )
    }

    /// True for the compiled-module kinds a project node can take.
    #[must_use]
    pub const fn is_module(self) -> bool {
        matches!(
            self,
            NodeType::Assembly | NodeType::Dll | NodeType::Exe
        )
    }

    /// Whether `child` may legally be contained by `self`.
    ///
    /// Containment must descend in depth; the single exception is a type
    /// declared inside another type.
    #[must_use]
    pub const fn may_contain(self, child: NodeType) -> bool {
        if matches!(self, NodeType::Type) && matches!(child, NodeType::Type) {
            return true;
        }
        self.depth() < child.depth()
    }
}

/// Location of a node's declaration in source, 1-based inclusive lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpan {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl FileSpan {
    #[must_use]
    pub const fn new(path: String, start_line: u32, end_line: u32) -> Self {
        Self {
            path,
            start_line,
            end_line,
        }
    }

    /// Check if the span covers a specific line.
    #[must_use]
    pub const fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Number of lines covered.
    #[must_use]
    pub const fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A single node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique fully-qualified name (see the `names` module for the
    /// conventions).
    pub name: String,

    pub node_type: NodeType,

    /// Human-readable text: doc-comment summary, or the failure reason on
    /// placeholder nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the containing node; `None` attaches the node under Root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default)]
    pub is_private: bool,

    /// Present iff the node was derived from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<FileSpan>,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            description: None,
            parent: None,
            is_private: false,
            span: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: FileSpan) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub const fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    /// Merge a re-emission of the same name into this node.
    ///
    /// Attribute-by-attribute: non-null incoming values overwrite, absent
    /// ones leave the existing value alone. Kind and visibility always take
    /// the incoming value (last write wins).
    pub fn merge_from(&mut self, incoming: Node) {
        debug_assert_eq!(self.name, incoming.name);
        self.node_type = incoming.node_type;
        self.is_private = incoming.is_private;
        if incoming.description.is_some() {
            self.description = incoming.description;
        }
        if incoming.parent.is_some() {
            self.parent = incoming.parent;
        }
        if incoming.span.is_some() {
            self.span = incoming.span;
        }
    }
}

/// A directed dependency edge between two node names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The kind the target is expected to be. The target node may not exist
    /// in the graph (external or unresolved dependency); this hint is what
    /// classifies such links.
    pub target_type: NodeType,
}

impl Link {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        target_type: NodeType,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            description: None,
            target_type,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The unit of transport on the item stream: exactly one node or link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Node(Node),
    Link(Link),
}

impl From<Node> for Item {
    fn from(node: Node) -> Self {
        Item::Node(node)
    }
}

impl From<Link> for Item {
    fn from(link: Link) -> Self {
        Item::Link(link)
    }
}
