use serde::{Deserialize, Serialize};

/// Statistics about one parse pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStats {
    /// Artifacts (modules / source projects) parsed successfully
    pub artifacts: usize,

    /// Nodes emitted
    pub nodes: usize,

    /// Links emitted
    pub links: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Per-artifact failures, with context
    pub errors: Vec<String>,
}

impl ParseStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_artifact(&mut self, nodes: usize, links: usize) {
        self.artifacts += 1;
        self.nodes += nodes;
        self.links += links;
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}
