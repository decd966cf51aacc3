//! # Depmap Store
//!
//! Snapshot persistence and staleness tracking for assembled graphs.
//!
//! ```text
//! <solution dir>/.depmap/
//!     snapshot.json    nodes + links, sorted, byte-stable for equal graphs
//!     watermark.json   built_at + the artifact paths the build consumed
//! ```
//!
//! A cached graph is reusable only while the snapshot is at least as new as
//! every artifact it was built from; any newer or missing artifact is a
//! cache miss with an explicit reason.

mod codec;
mod error;
mod staleness;

pub use codec::{
    load_snapshot, save_snapshot, snapshot_path, store_dir, Snapshot, SNAPSHOT_SCHEMA_VERSION,
};
pub use error::{Result, StoreError};
pub use staleness::{
    assess, assess_solution, read_watermark, write_watermark, watermark_path, CacheDecision,
    StaleReason, StoredWatermark,
};
