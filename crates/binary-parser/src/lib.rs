//! # Depmap Binary Parser
//!
//! Walks a compiled .NET module's metadata and IL, emitting containment and
//! usage facts for the graph assembler.
//!
//! ```text
//! .dll / .exe
//!     │
//!     ├──> pe         PE headers, sections, RVA resolution, CLI header
//!     ├──> metadata   BSJB root, #~ tables, #Strings / #Blob heaps
//!     ├──> il         method-body opcode walk, inline token extraction
//!     ├──> doc        <module>.xml summaries (when present)
//!     │
//!     └──> parser     namespaces / types / members as Nodes,
//!                     IL and inheritance references as Links
//! ```
//!
//! The reader is deliberately self-contained: no decompiler or compiler-API
//! binding, just the ECMA-335 physical layout. Modules that deviate from it
//! surface as a single malformed-artifact result; nothing partial is ever
//! emitted for them.

mod doc;
mod error;
mod il;
mod metadata;
mod parser;
mod pe;
mod reader;

pub use error::{BinaryError, Result};
pub use parser::BinaryParser;
