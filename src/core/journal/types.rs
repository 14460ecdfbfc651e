//! Undo journal entry types.

use crate::core::record::FileRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// What a journal entry reverts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UndoAction {
    /// A duplicate set was collapsed: files moved into quarantine and the
    /// keepers' metadata replaced with the merged lists
    CollapseSet {
        set_key: String,
        /// Quarantine path -> original path
        moved: BTreeMap<PathBuf, PathBuf>,
        records_before: Vec<FileRecord>,
        grouping_before: Option<Vec<PathBuf>>,
    },
    /// Metadata was rewritten without moving any file
    UpdateMetadata { records_before: Vec<FileRecord> },
}

impl UndoAction {
    pub fn records_before(&self) -> &[FileRecord] {
        match self {
            UndoAction::CollapseSet { records_before, .. } => records_before,
            UndoAction::UpdateMetadata { records_before } => records_before,
        }
    }

    pub fn description(&self) -> String {
        match self {
            UndoAction::CollapseSet { set_key, moved, .. } => format!(
                "collapse of set {} ({} file(s) quarantined)",
                short_key(set_key),
                moved.len()
            ),
            UndoAction::UpdateMetadata { records_before } => {
                format!("metadata update of {} file(s)", records_before.len())
            }
        }
    }
}

/// `name|size|` plus the first 12 digest characters
fn short_key(set_key: &str) -> String {
    match set_key.rsplit_once('|') {
        Some((prefix, digest)) => format!("{}|{}", prefix, digest.chars().take(12).collect::<String>()),
        None => set_key.chars().take(12).collect(),
    }
}

/// One reversible step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub action: UndoAction,
}

impl UndoEntry {
    pub fn new(action: UndoAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_shortens_the_digest_but_keeps_the_name() {
        let action = UndoAction::CollapseSet {
            set_key: format!("x.jpg|10|{}", "ab".repeat(32)),
            moved: BTreeMap::new(),
            records_before: Vec::new(),
            grouping_before: None,
        };

        assert_eq!(
            action.description(),
            "collapse of set x.jpg|10|abababababab (0 file(s) quarantined)"
        );
    }
}
