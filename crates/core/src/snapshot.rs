//! Deterministic replay of an ordered action sequence into a materialized
//! snapshot: the live file set, and the last-seen protocol and metadata.

use std::collections::HashMap;
use std::sync::Weak;

use crate::action::{Action, AddFile, Metadata, Protocol};
use crate::delta_log::DeltaLog;

/// Materialized state at a given version. Carries a non-owning
/// back-reference to the log it was built from, purely for convenience
/// queries (e.g. re-reading a file's bytes) — it is a [`Weak`] handle so a
/// `Snapshot` can never keep its `DeltaLog` alive and the two never form an
/// ownership cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    log: Option<Weak<DeltaLog>>,
    version: i64,
    actions: Vec<Action>,
    protocol: Option<Protocol>,
    metadata: Option<Metadata>,
    live_files: HashMap<String, AddFile>,
}

impl Snapshot {
    /// Replays `actions` in order. Within a version actions must already be
    /// in their serialized order; callers chaining multiple versions (or a
    /// checkpoint followed by a tail) must concatenate them in ascending
    /// version order before calling this — replay itself is a single
    /// sequential pass with no reordering.
    pub fn replay(actions: Vec<Action>, version: i64, log: Option<Weak<DeltaLog>>) -> Snapshot {
        let mut protocol = None;
        let mut metadata = None;
        let mut live_files: HashMap<String, AddFile> = HashMap::new();

        for action in &actions {
            match action {
                Action::Add(add) => {
                    live_files.insert(add.path.clone(), add.clone());
                }
                Action::Remove(remove) => {
                    live_files.remove(&remove.path);
                }
                Action::Metadata(m) => {
                    metadata = Some(m.clone());
                }
                Action::Protocol(p) => {
                    protocol = Some(p.clone());
                }
                Action::CommitInfo(_) => {}
            }
        }

        Snapshot {
            log,
            version,
            actions,
            protocol,
            metadata,
            live_files,
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn live_files(&self) -> &HashMap<String, AddFile> {
        &self.live_files
    }

    pub fn log(&self) -> Option<std::sync::Arc<DeltaLog>> {
        self.log.as_ref().and_then(|w| w.upgrade())
    }

    /// All currently-live files, in unspecified order.
    pub fn all_files(&self) -> Vec<&AddFile> {
        self.live_files.values().collect()
    }

    /// `files(None)` is equivalent to [`Self::all_files`]. `files(Some(p))`
    /// is a simple substring match against each live file's path — a
    /// documented placeholder for a richer predicate language, not a query
    /// language in its own right.
    pub fn files(&self, predicate: Option<&str>) -> Vec<&AddFile> {
        match predicate {
            None => self.all_files(),
            Some(needle) => self
                .live_files
                .values()
                .filter(|f| f.path.contains(needle))
                .collect(),
        }
    }
}
