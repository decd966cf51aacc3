//! # Depmap Model
//!
//! Shared data model for the dependency-graph engine.
//!
//! ```text
//! Parsers ──> Item { Node | Link } ──> Item Stream ──> Graph Assembler
//! ```
//!
//! A [`Node`] is one structural element (solution, project, namespace, type
//! or member) identified by a globally unique fully-qualified name. A
//! [`Link`] is a directed dependency between two node names; its target may
//! never materialize as a node, in which case the [`Link::target_type`] hint
//! classifies it. [`Item`] wraps exactly one of the two and is the unit of
//! transport between parsers and the assembler.

mod error;
mod names;
mod stats;
mod types;

pub use error::{ParseError, Result};
pub use names::{assembly_qualified, member_name, simple_name, CONTAINER_SEP, ROOT_NAME};
pub use stats::ParseStats;
pub use types::{FileSpan, Item, Link, Node, NodeType};
