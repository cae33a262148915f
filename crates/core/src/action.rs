//! The tagged-sum `Action` type and its canonical line-delimited JSON form.
//!
//! Each variant carries its own discriminant in the serialized `type` field.
//! `serde`'s internally-tagged representation gives us that for free and
//! ignores unknown fields on the way in, which is what forward-compatible
//! log readers want. An unrecognized `type` value is the one thing serde
//! can't shrug off gracefully, so [`parse_action`] turns that failure into
//! [`DeltaLogError::CorruptLog`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DeltaLogError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    #[serde(default)]
    pub min_reader_version: i32,
    #[serde(default)]
    pub min_writer_version: i32,
    #[serde(default)]
    pub reader_features: Vec<String>,
    #[serde(default)]
    pub writer_features: Vec<String>,
}

impl Protocol {
    pub fn new(min_reader_version: i32, min_writer_version: i32) -> Self {
        Self {
            min_reader_version,
            min_writer_version,
            reader_features: Vec::new(),
            writer_features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub configuration: HashMap<String, String>,
    #[serde(default)]
    pub partition_columns: HashMap<String, String>,
    #[serde(default)]
    pub created_time: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub partition_values: HashMap<String, String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub modification_time: i64,
    #[serde(default = "default_true")]
    pub data_change: bool,
    #[serde(default)]
    pub stats: HashMap<String, String>,
    #[serde(default)]
    pub tags: String,
}

impl Default for AddFile {
    fn default() -> Self {
        Self {
            path: String::new(),
            partition_values: HashMap::new(),
            size: 0,
            modification_time: 0,
            data_change: true,
            stats: HashMap::new(),
            tags: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub deletion_timestamp: i64,
    #[serde(default)]
    pub data_change: bool,
    #[serde(default)]
    pub partition_values: HashMap<String, String>,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub operation_parameters: HashMap<String, String>,
    #[serde(default)]
    pub commit_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "protocol")]
    Protocol(Protocol),
    #[serde(rename = "metadata")]
    Metadata(Metadata),
    #[serde(rename = "add")]
    Add(AddFile),
    #[serde(rename = "remove")]
    Remove(RemoveFile),
    #[serde(rename = "commitInfo")]
    CommitInfo(CommitInfo),
}

impl Action {
    /// Canonical single-line textual form. Never contains an embedded
    /// newline so one action maps to exactly one line in a commit file.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parses one line of a commit file into an [`Action`]. An unrecognized
/// `type` discriminant, or a line that isn't a JSON object at all, is
/// reported as [`DeltaLogError::CorruptLog`].
pub fn parse_action(line: &str) -> Result<Action> {
    serde_json::from_str(line).map_err(|e| DeltaLogError::CorruptLog {
        reason: format!("unparseable action line {line:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(action: Action) {
        let text = action.serialize().unwrap();
        let parsed = parse_action(&text).unwrap();
        assert_eq!(action, parsed);
    }

    #[test]
    fn round_trips_protocol_with_features() {
        round_trip(Action::Protocol(Protocol {
            min_reader_version: 3,
            min_writer_version: 7,
            reader_features: vec!["deletionVectors".into()],
            writer_features: vec!["deletionVectors".into(), "columnMapping".into()],
        }));
    }

    #[test]
    fn round_trips_default_metadata() {
        round_trip(Action::Metadata(Metadata::default()));
    }

    #[test]
    fn round_trips_populated_metadata() {
        let mut configuration = HashMap::new();
        configuration.insert("delta.appendOnly".to_string(), "true".to_string());
        let mut partition_columns = HashMap::new();
        partition_columns.insert("dt".to_string(), "string".to_string());
        round_trip(Action::Metadata(Metadata {
            id: "t1".into(),
            name: "Test Table".into(),
            description: "".into(),
            format: "csv".into(),
            configuration,
            partition_columns,
            created_time: 1_700_000_000_000,
        }));
    }

    #[test]
    fn add_file_default_data_change_is_true() {
        let default_add = AddFile::default();
        assert!(default_add.data_change);
    }

    #[test]
    fn round_trips_add_file() {
        round_trip(Action::Add(AddFile {
            path: "dt=2024-01-01/a.csv".into(),
            size: 1234,
            modification_time: 42,
            data_change: true,
            ..Default::default()
        }));
    }

    #[test]
    fn round_trips_remove_file() {
        round_trip(Action::Remove(RemoveFile {
            path: "dt=2024-01-01/a.csv".into(),
            deletion_timestamp: 99,
            data_change: true,
            size: 1234,
            ..Default::default()
        }));
    }

    #[test]
    fn round_trips_commit_info() {
        round_trip(Action::CommitInfo(CommitInfo {
            version: "3".into(),
            timestamp: 100,
            operation: "WRITE".into(),
            commit_version: "3".into(),
            ..Default::default()
        }));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let text = r#"{"type":"add","path":"x.csv","size":1,"futureField":{"nested":true}}"#;
        let action = parse_action(text).unwrap();
        assert!(matches!(action, Action::Add(AddFile { path, .. }) if path == "x.csv"));
    }

    #[test]
    fn unknown_discriminant_is_corrupt_log() {
        let text = r#"{"type":"bogus"}"#;
        let err = parse_action(text).unwrap_err();
        assert!(matches!(err, DeltaLogError::CorruptLog { .. }));
    }

    #[test]
    fn non_json_line_is_corrupt_log() {
        let err = parse_action("not json at all").unwrap_err();
        assert!(matches!(err, DeltaLogError::CorruptLog { .. }));
    }
}
