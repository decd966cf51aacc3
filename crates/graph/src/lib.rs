//! # Depmap Graph
//!
//! Graph assembly: drains the item stream into one hierarchical dependency
//! graph.
//!
//! ```text
//! Item Stream
//!     │
//!     ├──> Graph Assembler (single-threaded)
//!     │      ├─ Merge nodes by name (last write wins, attribute-wise)
//!     │      ├─ Collect links; materialize edges when both ends exist
//!     │      └─ Validate containment after the stream closes
//!     │
//!     └──> DependencyGraph (petgraph + name index)
//!            ├─ Nodes: structural elements
//!            ├─ Edges: resolved dependency links
//!            └─ Unresolved links kept with their target-type hint
//! ```

mod assembler;
mod graph;

pub use assembler::GraphAssembler;
pub use graph::DependencyGraph;
