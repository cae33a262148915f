//! `Transaction` (plain, single-writer append) and `OptimisticTransaction`
//! (read-set tracking, conflict detection, retry with backoff).

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::action::Action;
use crate::delta_log::DeltaLog;
use crate::error::{ConflictCause, DeltaLogError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Serializable,
    WriteSerializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::Serializable
    }
}

/// Single-writer, append-only transaction: stage actions, then commit them
/// as the next version. No conflict detection — a second concurrent
/// `Transaction` against the same table would race on `latestVersion() + 1`
/// inside `DeltaLog::commit_next`, guarded only by the in-process lock (see
/// the concurrency model notes in the crate root).
#[derive(Debug)]
pub struct Transaction {
    log: Arc<DeltaLog>,
    actions: Vec<Action>,
    app_id: Uuid,
    committed: AtomicBool,
}

impl Transaction {
    pub fn new(log: Arc<DeltaLog>) -> Self {
        Self {
            log,
            actions: Vec::new(),
            app_id: Uuid::new_v4(),
            committed: AtomicBool::new(false),
        }
    }

    pub fn app_id(&self) -> Uuid {
        self.app_id
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn add_action(&mut self, action: Action) -> Result<()> {
        if self.is_committed() {
            return Err(DeltaLogError::InvalidState {
                reason: "cannot add an action to an already-committed transaction".into(),
            });
        }
        self.actions.push(action);
        Ok(())
    }

    /// Resolves `latestVersion() + 1` and writes the staged actions under
    /// the log's lock. The first commit of a new table lands at version 0.
    pub async fn commit(&mut self) -> Result<i64> {
        if self.committed.swap(true, Ordering::SeqCst) {
            return Err(DeltaLogError::InvalidState {
                reason: "transaction already committed".into(),
            });
        }
        let actions = std::mem::take(&mut self.actions);
        self.log.commit_next(actions).await
    }
}

/// Extends [`Transaction`] with read-set tracking, conflict detection
/// against interleaved commits, and retry-with-backoff. Deref/DerefMut to
/// the inner `Transaction` so `add_action` and friends are inherited rather
/// than re-declared.
#[derive(Debug)]
pub struct OptimisticTransaction {
    inner: Transaction,
    isolation_level: IsolationLevel,
    read_version: i64,
    read_predicates: HashSet<String>,
    new_metadata: HashMap<String, String>,
    max_retry_count: u32,
}

impl Deref for OptimisticTransaction {
    type Target = Transaction;
    fn deref(&self) -> &Transaction {
        &self.inner
    }
}

impl DerefMut for OptimisticTransaction {
    fn deref_mut(&mut self) -> &mut Transaction {
        &mut self.inner
    }
}

impl OptimisticTransaction {
    pub async fn new(log: Arc<DeltaLog>, isolation_level: IsolationLevel) -> Result<Self> {
        let read_version = log.latest_version().await?;
        Ok(Self {
            inner: Transaction::new(log),
            isolation_level,
            read_version,
            read_predicates: HashSet::new(),
            new_metadata: HashMap::new(),
            max_retry_count: 3,
        })
    }

    pub fn with_max_retry_count(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    pub fn read_version(&self) -> i64 {
        self.read_version
    }

    pub fn read_file(&mut self, path: impl Into<String>) {
        self.read_predicates.insert(format!("file:{}", path.into()));
    }

    pub fn read_metadata(&mut self, key: impl Into<String>) {
        self.read_predicates
            .insert(format!("metadata:{}", key.into()));
    }

    pub fn update_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.new_metadata.insert(key.into(), value.into());
    }

    /// Runs the commit protocol once: fused conflict-check against any
    /// commits interleaved since `read_version`, append an augmenting
    /// `CommitInfo`, and write. Returns `ConcurrentModification` without
    /// retrying — callers that want retry-with-backoff use
    /// [`Self::commit_with_retry`]. The actual committed version (and the
    /// `CommitInfo` describing it) is resolved inside `DeltaLog`'s critical
    /// section, since it can land ahead of `read_version` even when the
    /// conflict check passes.
    pub async fn commit(&mut self, operation: &str) -> Result<i64> {
        if self.inner.is_committed() {
            return Err(DeltaLogError::InvalidState {
                reason: "transaction already committed".into(),
            });
        }

        let actions = self.inner.actions.clone();
        let version = self
            .inner
            .log
            .commit_optimistic(
                self.read_version,
                &self.read_predicates,
                &self.new_metadata,
                self.isolation_level,
                actions,
                operation,
            )
            .await?;

        self.inner.committed.store(true, Ordering::SeqCst);
        Ok(version)
    }

    /// Retries `commit` on `ConcurrentModification` up to `maxRetryCount`
    /// attempts total (`maxRetryCount` bounds the whole budget, not just the
    /// retries after the first), sleeping `50ms × 2^attempt` before each
    /// retry (`attempt >= 1`). After exhaustion, surfaces the last conflict
    /// wrapped as `IoError`. On each retry the transaction recaptures
    /// `readVersion` from the log; it does not re-evaluate or widen its own
    /// read set, so a transaction whose read set only makes sense against
    /// the stale base may legitimately fail again on the next attempt.
    pub async fn commit_with_retry(mut self, operation: &str) -> Result<i64> {
        let mut attempt = 0u32;
        loop {
            match self.commit(operation).await {
                Ok(version) => return Ok(version),
                Err(DeltaLogError::ConcurrentModification { cause }) => {
                    attempt += 1;
                    if attempt >= self.max_retry_count {
                        return Err(DeltaLogError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            ConflictCause(cause),
                        )));
                    }
                    let backoff = Duration::from_millis(50 * 2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                    self.read_version = self.inner.log.latest_version().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
