//! Filesystem representation of the log: version ⇄ path translation,
//! listing, and atomic per-version commit writes.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::action::{parse_action, Action};
use crate::error::{DeltaLogError, Result};

const LOG_DIR: &str = "_delta_log";
const VERSION_DIGITS: usize = 20;
const COMMIT_SUFFIX: &str = ".json";
const CHECKPOINT_SUFFIX: &str = ".checkpoint.parquet";
pub const LAST_CHECKPOINT_FILE: &str = "_last_checkpoint";

#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    pub fn commit_path(&self, version: i64) -> PathBuf {
        self.log_dir()
            .join(format!("{version:0width$}{COMMIT_SUFFIX}", width = VERSION_DIGITS))
    }

    pub fn checkpoint_path(&self, version: i64) -> PathBuf {
        self.log_dir().join(format!(
            "{version:0width$}{CHECKPOINT_SUFFIX}",
            width = VERSION_DIGITS
        ))
    }

    pub fn last_checkpoint_path(&self) -> PathBuf {
        self.log_dir().join(LAST_CHECKPOINT_FILE)
    }

    /// Scans the log directory for commit files, parses their version out
    /// of the file name, and returns the versions in ascending order.
    /// Non-matching entries (the checkpoint pointer, checkpoint files,
    /// anything else) are ignored silently. A missing log directory yields
    /// an empty list rather than an error.
    pub async fn list_versions(&self) -> Result<Vec<i64>> {
        let names = storage::list_file_names(&self.log_dir()).await?;
        let mut versions: Vec<i64> = names
            .iter()
            .filter_map(|name| parse_commit_file_name(name))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    /// Last of [`list_versions`], or `-1` if the log has no commits yet.
    pub async fn latest_version(&self) -> Result<i64> {
        Ok(self.list_versions().await?.last().copied().unwrap_or(-1))
    }

    pub async fn table_exists(&self) -> Result<bool> {
        Ok(self.latest_version().await? >= 0)
    }

    /// Reads one commit file and parses every non-blank line into an
    /// [`Action`]. A missing file returns an empty list so tolerant scans
    /// (e.g. reading ahead of a concurrently-advancing log) don't need
    /// special-case handling.
    #[instrument(skip(self), fields(version))]
    pub async fn read_version(&self, version: i64) -> Result<Vec<Action>> {
        let path = self.commit_path(version);
        let bytes = match storage::read_if_exists(&path).await? {
            Some(bytes) => bytes,
            None => return Ok(Vec::new()),
        };
        let text = String::from_utf8(bytes).map_err(|e| DeltaLogError::CorruptLog {
            reason: format!("commit file {} is not valid utf-8: {e}", path.display()),
        })?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_action)
            .collect()
    }

    /// Writes a single commit file containing one serialized action per
    /// line, terminated by a newline, via an atomic rename. Callers are
    /// responsible for resolving `version = latestVersion() + 1` under the
    /// log's lock before calling this — overwriting an existing version is
    /// rejected rather than silently allowed.
    #[instrument(skip(self, actions), fields(version, actions = actions.len()))]
    pub async fn write(&self, version: i64, actions: &[Action]) -> Result<()> {
        let mut body = String::new();
        for action in actions {
            body.push_str(&action.serialize()?);
            body.push('\n');
        }
        let path = self.commit_path(version);
        storage::atomic_write(&path, body.as_bytes(), true).await?;
        debug!(version, path = %path.display(), "committed version");
        Ok(())
    }
}

fn parse_commit_file_name(name: &str) -> Option<i64> {
    let digits = name.strip_suffix(COMMIT_SUFFIX)?;
    if digits.len() != VERSION_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{AddFile, Protocol};

    #[test]
    fn commit_path_is_zero_padded() {
        let store = LogStore::new("/table");
        assert_eq!(
            store.commit_path(3),
            PathBuf::from("/table/_delta_log/00000000000000000003.json")
        );
    }

    #[test]
    fn checkpoint_path_uses_checkpoint_suffix() {
        let store = LogStore::new("/table");
        assert_eq!(
            store.checkpoint_path(10),
            PathBuf::from("/table/_delta_log/00000000000000000010.checkpoint.parquet")
        );
    }

    #[tokio::test]
    async fn empty_log_has_no_versions() {
        let temp = tempfile::tempdir().unwrap();
        let store = LogStore::new(temp.path());
        assert_eq!(store.list_versions().await.unwrap(), Vec::<i64>::new());
        assert_eq!(store.latest_version().await.unwrap(), -1);
        assert!(!store.table_exists().await.unwrap());
    }

    #[tokio::test]
    async fn write_then_read_round_trips_actions() {
        let temp = tempfile::tempdir().unwrap();
        let store = LogStore::new(temp.path());
        let actions = vec![
            Action::Protocol(Protocol::new(1, 2)),
            Action::Add(AddFile {
                path: "a.csv".into(),
                size: 10,
                ..Default::default()
            }),
        ];
        store.write(0, &actions).await.unwrap();
        assert_eq!(store.latest_version().await.unwrap(), 0);
        let read_back = store.read_version(0).await.unwrap();
        assert_eq!(read_back, actions);
    }

    #[tokio::test]
    async fn read_version_missing_file_returns_empty() {
        let temp = tempfile::tempdir().unwrap();
        let store = LogStore::new(temp.path());
        assert!(store.read_version(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewriting_an_existing_version_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let store = LogStore::new(temp.path());
        store.write(0, &[]).await.unwrap();
        let err = store.write(0, &[]).await.unwrap_err();
        assert!(matches!(err, DeltaLogError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn non_matching_files_are_ignored_by_listing() {
        let temp = tempfile::tempdir().unwrap();
        let store = LogStore::new(temp.path());
        store.write(0, &[]).await.unwrap();
        store.write(1, &[]).await.unwrap();
        tokio::fs::write(store.last_checkpoint_path(), b"{}")
            .await
            .unwrap();
        tokio::fs::write(store.checkpoint_path(0), b"not json")
            .await
            .unwrap();
        assert_eq!(store.list_versions().await.unwrap(), vec![0, 1]);
    }
}
