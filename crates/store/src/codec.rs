use crate::error::{Result, StoreError};
use depmap_graph::{DependencyGraph, GraphAssembler};
use depmap_model::{Item, Link, Node};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store directory created next to the solution manifest.
pub const STORE_DIR: &str = ".depmap";

const SNAPSHOT_FILE: &str = "snapshot.json";

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[must_use]
pub fn store_dir(root: &Path) -> PathBuf {
    root.join(STORE_DIR)
}

#[must_use]
pub fn snapshot_path(root: &Path) -> PathBuf {
    store_dir(root).join(SNAPSHOT_FILE)
}

/// The persisted form of a graph: every node and link attribute, nothing
/// else.
///
/// Collections are sorted so equal graphs serialize to identical bytes;
/// absent optional attributes are omitted and restore as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Snapshot {
    #[must_use]
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let mut nodes: Vec<Node> = graph.all_nodes().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut links: Vec<Link> = graph.all_links().cloned().collect();
        links.sort_by(|a, b| {
            (&a.source, &a.target, &a.description).cmp(&(&b.source, &b.target, &b.description))
        });

        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            nodes,
            links,
        }
    }

    /// Rebuild the graph through the assembler's merge path, so a restored
    /// graph satisfies the same invariants as a parsed one.
    #[must_use]
    pub fn into_graph(self) -> DependencyGraph {
        let mut assembler = GraphAssembler::new();
        for node in self.nodes {
            assembler.insert(Item::Node(node));
        }
        for link in self.links {
            assembler.insert(Item::Link(link));
        }
        assembler.finish()
    }
}

/// Persist a graph snapshot atomically (write-then-rename).
pub async fn save_snapshot(root: &Path, graph: &DependencyGraph) -> Result<()> {
    let dir = store_dir(root);
    tokio::fs::create_dir_all(&dir).await?;

    let snapshot = Snapshot::from_graph(graph);
    let bytes = serde_json::to_vec_pretty(&snapshot)?;

    let path = snapshot_path(root);
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;

    log::debug!(
        "saved snapshot to {} ({} nodes, {} links)",
        path.display(),
        snapshot.nodes.len(),
        snapshot.links.len()
    );
    Ok(())
}

/// Restore a persisted snapshot; `None` when no snapshot exists.
pub async fn load_snapshot(root: &Path) -> Result<Option<DependencyGraph>> {
    let path = snapshot_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let bytes = tokio::fs::read(&path).await?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(StoreError::SchemaVersion {
            found: snapshot.schema_version,
            expected: SNAPSHOT_SCHEMA_VERSION,
        });
    }

    log::debug!("restored snapshot from {}", path.display());
    Ok(Some(snapshot.into_graph()))
}
