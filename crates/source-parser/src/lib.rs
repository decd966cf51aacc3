//! # Depmap Source Parser
//!
//! Derives graph fragments from C# declaration syntax instead of compiled
//! IL, so every node carries a source span for navigation.
//!
//! ```text
//! *.cs files
//!     │
//!     ├──> declarations   namespaces, types, members -> Nodes + SymbolTable
//!     │
//!     ├──> references     invocations, object creation, member access,
//!     │                   local types -> Links (bound via the symbol
//!     │                   table; unresolvable identifiers are dropped)
//!     │
//!     └──> SpanIndex      name -> file span, and the inverse lookup used
//!                         for go-to-source
//! ```
//!
//! Binding is declaration-driven rather than a full type checker: an
//! identifier resolves through the enclosing type, the enclosing namespace
//! chain, the file's `using` directives, and the referenced projects'
//! declarations, in that order. Identifiers the table cannot see are
//! dropped, not faulted.

mod error;
mod lookup;
mod parser;
mod symbols;

pub use error::{Result, SourceError};
pub use lookup::SpanIndex;
pub use parser::{Declarations, SourceParser, SourceProject};
pub use symbols::{Declared, SymbolTable};
