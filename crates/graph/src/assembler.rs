use crate::graph::DependencyGraph;
use depmap_model::{Item, Link, Node, NodeType, ROOT_NAME};
use depmap_stream::{CancelSignal, ItemReceiver};
use std::collections::HashSet;

/// Consumes the item stream and builds the unified graph.
///
/// Runs single-threaded: the stream serializes all parser output, so the
/// graph itself needs no locking.
pub struct GraphAssembler {
    graph: DependencyGraph,
    seen_links: HashSet<Link>,
}

impl GraphAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
            seen_links: HashSet::new(),
        }
    }

    /// Drain the stream until it closes (all producers finished) or the
    /// cancel signal fires, then finish the graph.
    ///
    /// On cancellation the stream is closed early, already-queued items are
    /// still applied, and the resulting graph is explicitly marked
    /// incomplete rather than silently truncated.
    pub async fn drain(mut self, mut rx: ItemReceiver, cancel: &CancelSignal) -> DependencyGraph {
        let mut closing = false;
        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => self.insert(item),
                    None => break,
                },
                () = cancel.cancelled(), if !closing => {
                    log::info!("parse cancelled; closing item stream");
                    rx.close();
                    closing = true;
                }
            }
        }
        if cancel.is_cancelled() {
            self.graph.mark_incomplete();
        }
        self.finish()
    }

    /// Apply one item. Also the restore path for persisted snapshots.
    pub fn insert(&mut self, item: Item) {
        match item {
            Item::Node(node) => self.insert_node(node),
            Item::Link(link) => self.insert_link(link),
        }
    }

    fn insert_node(&mut self, node: Node) {
        let name = node.name.clone();
        let kind = node.node_type;
        if let Some(previous) = self.graph.insert_node(node) {
            log::warn!("node {name} changed kind {previous:?} -> {kind:?}; keeping last");
        }
    }

    fn insert_link(&mut self, link: Link) {
        // A method body touching the same symbol repeatedly collapses to
        // one link.
        if self.seen_links.insert(link.clone()) {
            self.graph.insert_link(link);
        }
    }

    /// Validate containment and return the finished graph.
    #[must_use]
    pub fn finish(mut self) -> DependencyGraph {
        self.validate_containment();
        let graph = self.graph;
        log::info!(
            "assembled graph: {} nodes, {} links ({} unresolved)",
            graph.node_count(),
            graph.link_count(),
            graph.unresolved_links().count()
        );
        graph
    }

    /// Enforce the containment-depth invariant.
    ///
    /// A node whose parent is missing, too deep, or part of a cycle is a
    /// defect in the emitting parser: log it and reattach the node under
    /// its nearest valid ancestor, defaulting to Root. The build never
    /// aborts for this.
    fn validate_containment(&mut self) {
        let mut names: Vec<String> = self
            .graph
            .all_nodes()
            .map(|node| node.name.clone())
            .collect();
        names.sort();

        for name in names {
            let Some(node) = self.graph.node(&name) else {
                continue;
            };
            let kind = node.node_type;
            let Some(parent_name) = node.parent.clone() else {
                continue;
            };

            let direct_ok = self
                .graph
                .node(&parent_name)
                .is_some_and(|parent| parent.node_type.may_contain(kind));
            if direct_ok && self.chain_terminates(&name) {
                continue;
            }

            let replacement = if direct_ok {
                // Kind-wise legal parent caught in a containment cycle.
                None
            } else {
                self.nearest_valid_ancestor(&name, &parent_name, kind)
            };
            log::warn!(
                "node {name} ({kind:?}) cannot live under {parent_name}; reattaching to {}",
                replacement.as_deref().unwrap_or(ROOT_NAME)
            );
            if let Some(node) = self.graph.node_mut(&name) {
                node.parent = replacement;
            }
        }
    }

    /// Whether the parent chain of `name` reaches a parentless node within
    /// the kind-depth bound.
    fn chain_terminates(&self, name: &str) -> bool {
        let mut current = self.graph.node(name).and_then(|n| n.parent.clone());
        let mut hops = 0usize;
        while let Some(parent) = current {
            if parent == name || hops > NodeType::MAX_DEPTH as usize {
                return false;
            }
            match self.graph.node(&parent) {
                Some(node) => {
                    current = node.parent.clone();
                    hops += 1;
                }
                None => return false,
            }
        }
        true
    }

    /// Walk up from `parent` to the first node that may contain `kind`,
    /// without passing through `name` itself (cycle guard). `None` means
    /// attach under Root.
    fn nearest_valid_ancestor(
        &self,
        name: &str,
        parent: &str,
        kind: NodeType,
    ) -> Option<String> {
        let mut candidate = Some(parent.to_string());
        let mut hops = 0usize;
        while let Some(current) = candidate {
            if current == name || hops > NodeType::MAX_DEPTH as usize {
                return None;
            }
            match self.graph.node(&current) {
                Some(node) if node.node_type.may_contain(kind) => {
                    return Some(current);
                }
                Some(node) => {
                    candidate = node.parent.clone();
                    hops += 1;
                }
                None => return None,
            }
        }
        None
    }
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depmap_model::FileSpan;
    use depmap_stream::{cancellation, channel};
    use pretty_assertions::assert_eq;

    fn assemble(items: Vec<Item>) -> DependencyGraph {
        let mut assembler = GraphAssembler::new();
        for item in items {
            assembler.insert(item);
        }
        assembler.finish()
    }

    #[test]
    fn re_emission_merges_instead_of_duplicating() {
        let graph = assemble(vec![
            Node::new("LibA > Core.Engine", NodeType::Type)
                .with_parent("LibA > Core")
                .into(),
            Node::new("LibA > Core.Engine", NodeType::Type)
                .with_description("doc text")
                .into(),
        ]);

        let names: Vec<_> = graph
            .all_nodes()
            .filter(|n| n.name.contains("Engine"))
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].description.as_deref(), Some("doc text"));
        assert_eq!(names[0].parent.as_deref(), Some("LibA > Core"));
    }

    #[test]
    fn unresolved_link_survives_with_its_hint() {
        let graph = assemble(vec![
            Node::new("AppB > App.Main", NodeType::Type).into(),
            Link::new("AppB > App.Main", "mscorlib > System.Console", NodeType::Type)
                .with_description("method call")
                .into(),
        ]);

        let unresolved: Vec<_> = graph.unresolved_links().collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].target, "mscorlib > System.Console");
        assert_eq!(unresolved[0].target_type, NodeType::Type);
    }

    #[test]
    fn late_arriving_target_materializes_the_link() {
        let graph = assemble(vec![
            Node::new("AppB > App.Main", NodeType::Type).into(),
            Link::new("AppB > App.Main", "LibA > Core.Engine", NodeType::Type).into(),
            Node::new("LibA > Core.Engine", NodeType::Type).into(),
        ]);

        assert_eq!(graph.unresolved_links().count(), 0);
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn duplicate_links_collapse_to_one() {
        let call = Link::new("AppB > App.Main.Run", "LibA > Core.Engine.Start", NodeType::Method)
            .with_description("method call");
        let graph = assemble(vec![call.clone().into(), call.into()]);
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn invalid_parent_reattaches_to_nearest_valid_ancestor() {
        // A namespace cannot contain a namespace; the child must climb to
        // the assembly.
        let graph = assemble(vec![
            Node::new("LibA", NodeType::Assembly).into(),
            Node::new("LibA > Core", NodeType::Namespace)
                .with_parent("LibA")
                .into(),
            Node::new("LibA > Core.Inner", NodeType::Namespace)
                .with_parent("LibA > Core")
                .into(),
        ]);

        let inner = graph.node("LibA > Core.Inner").unwrap();
        assert_eq!(inner.parent.as_deref(), Some("LibA"));
    }

    #[test]
    fn nested_types_keep_their_declaring_type_parent() {
        let graph = assemble(vec![
            Node::new("LibA > Core.Outer", NodeType::Type).into(),
            Node::new("LibA > Core.Outer.Inner", NodeType::Type)
                .with_parent("LibA > Core.Outer")
                .into(),
        ]);

        let inner = graph.node("LibA > Core.Outer.Inner").unwrap();
        assert_eq!(inner.parent.as_deref(), Some("LibA > Core.Outer"));
    }

    #[test]
    fn parent_cycles_break_to_root() {
        let graph = assemble(vec![
            Node::new("LibA > A", NodeType::Type).with_parent("LibA > B").into(),
            Node::new("LibA > B", NodeType::Type).with_parent("LibA > A").into(),
        ]);

        // Both nodes end up rooted; ancestor walks terminate.
        for name in ["LibA > A", "LibA > B"] {
            let ancestors = graph.ancestors_of(name);
            assert!(ancestors.len() <= NodeType::MAX_DEPTH as usize + 1, "{ancestors:?}");
            assert_eq!(ancestors.last().map(String::as_str), Some(ROOT_NAME));
        }
    }

    #[test]
    fn ancestor_chains_terminate_at_root_within_depth_bound() {
        let graph = assemble(vec![
            Node::new("Sln", NodeType::Solution).into(),
            Node::new("LibA", NodeType::Assembly).with_parent("Sln").into(),
            Node::new("LibA > Core", NodeType::Namespace).with_parent("LibA").into(),
            Node::new("LibA > Core.Engine", NodeType::Type)
                .with_parent("LibA > Core")
                .into(),
            Node::new("LibA > Core.Engine.Run", NodeType::Method)
                .with_parent("LibA > Core.Engine")
                .into(),
        ]);

        let ancestors = graph.ancestors_of("LibA > Core.Engine.Run");
        assert_eq!(
            ancestors,
            vec![
                "LibA > Core.Engine".to_string(),
                "LibA > Core".to_string(),
                "LibA".to_string(),
                "Sln".to_string(),
                ROOT_NAME.to_string(),
            ]
        );
    }

    #[test]
    fn two_project_solution_scenario() {
        let graph = assemble(vec![
            Node::new("Shop", NodeType::Solution).into(),
            Node::new("LibA", NodeType::Dll).with_parent("Shop").into(),
            Node::new("AppB", NodeType::Exe).with_parent("Shop").into(),
            Node::new("LibA > Core", NodeType::Namespace).with_parent("LibA").into(),
            Node::new("LibA > Core.Engine", NodeType::Type)
                .with_parent("LibA > Core")
                .into(),
            Node::new("AppB > App", NodeType::Namespace).with_parent("AppB").into(),
            Node::new("AppB > App.Main", NodeType::Type)
                .with_parent("AppB > App")
                .with_span(FileSpan::new("AppB/Main.cs".into(), 1, 20))
                .into(),
            Link::new("AppB > App.Main", "LibA > Core.Engine", NodeType::Type)
                .with_description("type reference")
                .into(),
        ]);

        assert!(graph.node("Shop").is_some());
        assert!(graph.node("LibA").is_some());
        assert!(graph.node("AppB").is_some());
        let cross: Vec<_> = graph.links_from("AppB > App.Main").collect();
        assert_eq!(cross.len(), 1);
        assert_eq!(cross[0].target, "LibA > Core.Engine");
        assert_eq!(graph.unresolved_links().count(), 0);
    }

    #[tokio::test]
    async fn drain_consumes_until_producers_finish() {
        let (tx, rx) = channel(16);
        let producer = tokio::spawn(async move {
            tx.send_node(Node::new("LibA", NodeType::Assembly))
                .await
                .unwrap();
            tx.send_node(Node::new("LibA > Core", NodeType::Namespace).with_parent("LibA"))
                .await
                .unwrap();
        });

        let graph = GraphAssembler::new()
            .drain(rx, &CancelSignal::never())
            .await;
        producer.await.unwrap();

        assert!(graph.node("LibA > Core").is_some());
        assert!(!graph.is_incomplete());
    }

    #[tokio::test]
    async fn cancelled_drain_yields_explicitly_incomplete_graph() {
        let (tx, rx) = channel(4);
        let (handle, signal) = cancellation();

        tx.send_node(Node::new("LibA", NodeType::Assembly))
            .await
            .unwrap();
        handle.cancel();

        let graph = GraphAssembler::new().drain(rx, &signal).await;
        drop(tx);

        assert!(graph.is_incomplete());
        assert!(graph.node("LibA").is_some());
    }
}
