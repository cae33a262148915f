//! The `DeltaLog` handle: the per-table coordinator that owns the log's
//! lock, the log store, checkpoint configuration, and a mutable snapshot
//! cache. `Transaction` and `OptimisticTransaction` are built against a
//! `DeltaLog` and compose the lower four components (actions, log store,
//! snapshot builder, checkpoint engine) through it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use crate::action::{Action, CommitInfo};
use crate::checkpoint::{self, CheckpointMetadata};
use crate::conflict::check_conflicts;
use crate::error::Result;
use crate::log_store::LogStore;
use crate::snapshot::Snapshot;
use crate::transaction::{IsolationLevel, OptimisticTransaction, Transaction};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `shouldCheckpoint(V, interval)` is evaluated after every commit.
    pub checkpoint_interval: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 10,
        }
    }
}

/// The per-log coordinator. All state-mutating operations
/// (`update`, `write`, `checkpoint`, and the fused
/// conflict-check/commit of an optimistic transaction) acquire
/// `commit_lock` for their entire critical section. Filesystem reads
/// outside those entry points (e.g. `LogStore::read_version` during
/// conflict checking, which itself runs inside the lock here) are
/// otherwise lockless.
#[derive(Debug)]
pub struct DeltaLog {
    store: LogStore,
    config: LogConfig,
    commit_lock: Mutex<()>,
    cache: RwLock<Option<Snapshot>>,
}

impl DeltaLog {
    pub fn open(root: impl Into<std::path::PathBuf>, config: LogConfig) -> Arc<DeltaLog> {
        Arc::new(DeltaLog {
            store: LogStore::new(root),
            config,
            commit_lock: Mutex::new(()),
            cache: RwLock::new(None),
        })
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub async fn table_exists(&self) -> Result<bool> {
        self.store.table_exists().await
    }

    pub async fn latest_version(&self) -> Result<i64> {
        self.store.latest_version().await
    }

    /// Returns the most recently computed snapshot, if `update` has been
    /// called at least once.
    pub async fn cached_snapshot(&self) -> Option<Snapshot> {
        self.cache.read().await.clone()
    }

    /// Resolves the latest checkpoint, replays it and every subsequent
    /// commit, and caches the result under the log's lock.
    #[instrument(skip(self))]
    pub async fn update(self: &Arc<Self>) -> Result<Snapshot> {
        let _guard = self.commit_lock.lock().await;
        let latest = self.store.latest_version().await?;
        let actions = self.replay_actions_up_to(latest).await?;
        let snapshot = Snapshot::replay(actions, latest, Some(Arc::downgrade(self)));
        *self.cache.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn new_transaction(self: &Arc<Self>) -> Transaction {
        Transaction::new(Arc::clone(self))
    }

    pub async fn new_optimistic_transaction(
        self: &Arc<Self>,
        isolation_level: IsolationLevel,
    ) -> Result<OptimisticTransaction> {
        OptimisticTransaction::new(Arc::clone(self), isolation_level).await
    }

    /// Appends a single commit for a plain `Transaction`: resolve
    /// `latestVersion() + 1` and write, all under the lock.
    pub(crate) async fn commit_next(&self, actions: Vec<Action>) -> Result<i64> {
        let _guard = self.commit_lock.lock().await;
        let version = self.store.latest_version().await? + 1;
        self.store.write(version, &actions).await?;
        self.checkpoint_if_needed(version).await?;
        Ok(version)
    }

    /// The fused conflict-check/commit critical section for an
    /// `OptimisticTransaction`. Per spec.md §9, the naive approach of
    /// checking for conflicts and then writing as two separate lock
    /// acquisitions has a TOCTOU gap — a commit could land between the
    /// check and the write. Holding `commit_lock` across both closes it.
    ///
    /// The committed version is `current + 1`, not `read_version + 1`: a
    /// non-conflicting commit may still have landed ahead of `read_version`
    /// (e.g. an unrelated `AddFile` under `WriteSerializable`), and the
    /// augmenting `CommitInfo` is built here, inside the lock, so it can
    /// carry the version that's actually being written rather than the
    /// stale version the transaction read from.
    pub(crate) async fn commit_optimistic(
        &self,
        read_version: i64,
        read_predicates: &std::collections::HashSet<String>,
        new_metadata: &HashMap<String, String>,
        isolation_level: IsolationLevel,
        mut actions: Vec<Action>,
        operation: &str,
    ) -> Result<i64> {
        let _guard = self.commit_lock.lock().await;
        let current = self.store.latest_version().await?;
        if current != read_version && read_version != -1 {
            check_conflicts(
                &self.store,
                read_version,
                current,
                read_predicates,
                new_metadata,
                isolation_level,
            )
            .await?;
        }
        let version = current + 1;

        let mut operation_parameters = HashMap::new();
        operation_parameters.insert(
            "isolationLevel".to_string(),
            format!("{isolation_level:?}"),
        );
        operation_parameters.insert("startVersion".to_string(), read_version.to_string());
        actions.push(Action::CommitInfo(CommitInfo {
            version: version.to_string(),
            timestamp: now_millis(),
            operation: operation.to_string(),
            operation_parameters,
            commit_version: version.to_string(),
        }));

        self.store.write(version, &actions).await?;
        self.checkpoint_if_needed(version).await?;
        Ok(version)
    }

    async fn checkpoint_if_needed(&self, version: i64) -> Result<()> {
        if !checkpoint::should_checkpoint(version, self.config.checkpoint_interval) {
            return Ok(());
        }
        let actions = self.replay_actions_up_to(version).await?;
        let snapshot = Snapshot::replay(actions, version, None);
        checkpoint::write_checkpoint(&self.store, &snapshot).await?;
        Ok(())
    }

    /// Combines the latest checkpoint at or before `version` (if any) with
    /// every subsequent commit through `version`, in ascending order.
    async fn replay_actions_up_to(&self, version: i64) -> Result<Vec<Action>> {
        if version < 0 {
            return Ok(Vec::new());
        }

        let checkpoint_meta: Option<CheckpointMetadata> =
            checkpoint::find_latest_checkpoint(&self.store).await?;

        let (mut actions, start_version) = match checkpoint_meta {
            Some(meta) if meta.version <= version => {
                let actions = checkpoint::read_checkpoint(&self.store, meta.version).await?;
                (actions, meta.version + 1)
            }
            _ => (Vec::new(), 0),
        };

        for v in start_version..=version {
            actions.extend(self.store.read_version(v).await?);
        }
        Ok(actions)
    }
}
