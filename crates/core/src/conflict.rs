//! Conflict classification for `OptimisticTransaction::commit`: given every
//! action committed at versions `(readVersion, current]`, decide whether any
//! of them invalidates the transaction's declared read set.

use std::collections::{HashMap, HashSet};

use crate::action::Action;
use crate::error::{DeltaLogError, Result};
use crate::log_store::LogStore;
use crate::transaction::IsolationLevel;

pub async fn check_conflicts(
    store: &LogStore,
    read_version: i64,
    current_version: i64,
    read_predicates: &HashSet<String>,
    new_metadata: &HashMap<String, String>,
    isolation_level: IsolationLevel,
) -> Result<()> {
    for version in (read_version + 1)..=current_version {
        for action in store.read_version(version).await? {
            classify(action, version, read_predicates, new_metadata, isolation_level)?;
        }
    }
    Ok(())
}

fn classify(
    action: Action,
    version: i64,
    read_predicates: &HashSet<String>,
    new_metadata: &HashMap<String, String>,
    isolation_level: IsolationLevel,
) -> Result<()> {
    match action {
        Action::Add(add) => {
            let conflicts = match isolation_level {
                IsolationLevel::Serializable => read_predicates.contains(&file_key(&add.path)),
                IsolationLevel::WriteSerializable => false,
            };
            if conflicts {
                return Err(conflict(format!(
                    "concurrent AddFile({}) at version {version} conflicts with a prior read of that path",
                    add.path
                )));
            }
        }
        Action::Remove(remove) => {
            if read_predicates.contains(&file_key(&remove.path)) {
                return Err(conflict(format!(
                    "concurrent RemoveFile({}) at version {version} conflicts with a prior read of that path",
                    remove.path
                )));
            }
        }
        Action::Metadata(_) => {
            let conflicts = read_predicates.iter().any(|predicate| {
                predicate
                    .strip_prefix("metadata:")
                    .is_some_and(|key| new_metadata.contains_key(key))
            });
            if conflicts {
                return Err(conflict(format!(
                    "concurrent Metadata update at version {version} conflicts with a pending metadata write"
                )));
            }
        }
        Action::Protocol(_) | Action::CommitInfo(_) => {}
    }
    Ok(())
}

fn file_key(path: &str) -> String {
    format!("file:{path}")
}

fn conflict(cause: String) -> DeltaLogError {
    DeltaLogError::ConcurrentModification { cause }
}
