//! Core of a simplified Delta-style tabular storage layer: a versioned,
//! append-only transaction log with optimistic concurrency control and
//! periodic binary checkpoints.
//!
//! This crate owns the log/versioning engine, the optimistic concurrency
//! protocol, and the checkpoint subsystem. Data-file encoding, the
//! end-user table API, and any CLI surface are out of scope — data files
//! are referenced by path, size and timestamp only, never read or written
//! by this crate.

pub mod action;
pub mod checkpoint;
mod conflict;
pub mod delta_log;
pub mod error;
pub mod log_store;
pub mod snapshot;
pub mod transaction;

pub use action::{Action, AddFile, CommitInfo, Metadata, Protocol, RemoveFile};
pub use checkpoint::CheckpointMetadata;
pub use delta_log::{DeltaLog, LogConfig};
pub use error::{DeltaLogError, Result};
pub use log_store::LogStore;
pub use snapshot::Snapshot;
pub use transaction::{IsolationLevel, OptimisticTransaction, Transaction};
