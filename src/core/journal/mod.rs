//! # Journal Module
//!
//! In-memory LIFO stack of reversible actions.
//!
//! An entry is pushed with its snapshots *before* the destructive step
//! starts, then completed with [`UndoJournal::record_moves`] once the
//! quarantine report is known. Replaying an entry:
//! 1. moves quarantined files back,
//! 2. overwrites store records and the grouping entry with the snapshots,
//! 3. persists the state.
//!
//! The journal does not survive a restart. Files still in quarantine after
//! a restart are restored from the persisted manifest instead.

mod types;

pub use types::{UndoAction, UndoEntry};

use crate::core::fsops::RetryPolicy;
use crate::core::quarantine::QuarantineMover;
use crate::core::store::{ArchiveState, StatePaths};
use crate::error::{PersistenceError, QuarantineError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Everything a replay touches
pub struct ReplayContext<'a> {
    pub state: &'a mut ArchiveState,
    pub mover: &'a QuarantineMover,
    pub paths: &'a StatePaths,
    pub retry: &'a RetryPolicy,
}

/// What a replay did
#[derive(Debug)]
pub struct ReplayOutcome {
    pub id: Uuid,
    pub description: String,
    pub restored: usize,
    /// Quarantined files that could not be put back; they stay quarantined
    pub failures: Vec<(PathBuf, QuarantineError)>,
}

#[derive(Debug, Clone, Default)]
pub struct UndoJournal {
    entries: Vec<UndoEntry>,
}

impl UndoJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: UndoAction) -> Uuid {
        let entry = UndoEntry::new(action);
        let id = entry.id;
        tracing::debug!("journal: recorded {}", entry.action.description());
        self.entries.push(entry);
        id
    }

    /// Attach completed quarantine moves (original -> quarantine) to the
    /// top entry. Returns false if the top entry moves no files.
    pub fn record_moves(&mut self, completed: &BTreeMap<PathBuf, PathBuf>) -> bool {
        match self.entries.last_mut().map(|e| &mut e.action) {
            Some(UndoAction::CollapseSet { moved, .. }) => {
                for (original, quarantined) in completed {
                    moved.insert(quarantined.clone(), original.clone());
                }
                true
            }
            _ => false,
        }
    }

    /// Drop the top entry without replaying it
    pub fn discard_top(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &UndoEntry> {
        self.entries.iter().rev()
    }

    /// Pop the newest entry and revert it in memory and on disk, without
    /// persisting. Used when the step it records could not be committed.
    pub fn rollback_top(
        &mut self,
        state: &mut ArchiveState,
        mover: &QuarantineMover,
    ) -> Option<ReplayOutcome> {
        let entry = self.entries.pop()?;

        let mut outcome = ReplayOutcome {
            id: entry.id,
            description: entry.action.description(),
            restored: 0,
            failures: Vec::new(),
        };

        match entry.action {
            UndoAction::CollapseSet {
                set_key,
                moved,
                records_before,
                grouping_before,
            } => {
                let report = mover.restore(&moved);
                state.manifest.forget(report.restored.keys());
                state.store.restore_snapshot(records_before);

                for (quarantined, _) in &report.failures {
                    let record = moved
                        .get(quarantined)
                        .and_then(|original| state.store.get_mut(original));
                    if let Some(record) = record {
                        record.quarantine_path = Some(quarantined.clone());
                    }
                }

                state.grouping.set(&set_key, grouping_before);
                outcome.restored = report.restored.len();
                outcome.failures = report.failures;
            }
            UndoAction::UpdateMetadata { records_before } => {
                state.store.restore_snapshot(records_before);
            }
        }

        Some(outcome)
    }

    /// Pop the newest entry, revert it, and persist the result.
    ///
    /// Returns `Ok(None)` when there is nothing to undo. Files that cannot
    /// be put back are reported and stay quarantined; the snapshots are
    /// still applied to every other record.
    pub fn pop_and_replay(
        &mut self,
        ctx: ReplayContext<'_>,
    ) -> Result<Option<ReplayOutcome>, PersistenceError> {
        let ReplayContext {
            state,
            mover,
            paths,
            retry,
        } = ctx;

        let Some(outcome) = self.rollback_top(state, mover) else {
            return Ok(None);
        };

        state.save(paths, retry)?;
        tracing::info!("Undid {}", outcome.description);
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{FileRecord, Observation, ObservationSource};
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn collapse(set_key: &str) -> UndoAction {
        UndoAction::CollapseSet {
            set_key: set_key.to_string(),
            moved: BTreeMap::new(),
            records_before: Vec::new(),
            grouping_before: None,
        }
    }

    #[test]
    fn entries_are_lifo() {
        let mut journal = UndoJournal::new();
        journal.push(collapse("first"));
        let second = journal.push(collapse("second"));

        assert_eq!(journal.len(), 2);
        assert_eq!(journal.peek().map(|e| e.id), Some(second));
        assert_eq!(journal.discard_top().map(|e| e.id), Some(second));
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn record_moves_fills_top_collapse() {
        let mut journal = UndoJournal::new();
        journal.push(collapse("k"));
        let moved = BTreeMap::from([(PathBuf::from("/a/x.jpg"), PathBuf::from("/q/x.jpg"))]);

        assert!(journal.record_moves(&moved));

        match &journal.peek().unwrap().action {
            UndoAction::CollapseSet { moved, .. } => {
                assert_eq!(moved[&PathBuf::from("/q/x.jpg")], PathBuf::from("/a/x.jpg"));
            }
            other => panic!("unexpected action {other:?}"),
        }

        journal.push(UndoAction::UpdateMetadata {
            records_before: Vec::new(),
        });
        assert!(!journal.record_moves(&moved));
    }

    #[test]
    fn empty_journal_replays_nothing() {
        let temp = TempDir::new().unwrap();
        let mut state = ArchiveState::default();
        let mover = QuarantineMover::new(temp.path().join("q"));
        let paths = StatePaths::in_dir(temp.path());

        let outcome = UndoJournal::new()
            .pop_and_replay(ReplayContext {
                state: &mut state,
                mover: &mover,
                paths: &paths,
                retry: &RetryPolicy::default(),
            })
            .unwrap();

        assert!(outcome.is_none());
        assert!(!paths.metadata.exists());
    }

    #[test]
    fn replay_restores_files_records_and_grouping() {
        let temp = TempDir::new().unwrap();
        let keeper = temp.path().join("a").join("x.jpg");
        let discard = temp.path().join("b").join("x.jpg");
        for p in [&keeper, &discard] {
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, b"same bytes").unwrap();
        }

        let paths = StatePaths::in_dir(&temp.path().join("state"));
        let mover = QuarantineMover::new(temp.path().join("q"));
        let mut state = ArchiveState::default();
        state.store.insert(FileRecord::new(&keeper, 10));
        state.store.insert(FileRecord::new(&discard, 10));
        let members = vec![keeper.clone(), discard.clone()];
        state.grouping.set("k", Some(members.clone()));
        let before = state.clone();

        let mut journal = UndoJournal::new();
        journal.push(UndoAction::CollapseSet {
            set_key: "k".to_string(),
            moved: BTreeMap::new(),
            records_before: state.store.snapshot(&members),
            grouping_before: state.grouping.get("k").cloned(),
        });

        let report = mover.quarantine(&[discard.clone()]).unwrap();
        journal.record_moves(&report.moved);
        state.manifest.record_moves(&report.moved);
        let when = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        state
            .store
            .get_mut(&keeper)
            .unwrap()
            .observations_mut(ObservationSource::User)
            .push(Observation::at(when));
        state.store.get_mut(&discard).unwrap().quarantine_path =
            report.moved.get(&discard).cloned();
        state.grouping.set("k", None);

        let outcome = journal
            .pop_and_replay(ReplayContext {
                state: &mut state,
                mover: &mover,
                paths: &paths,
                retry: &RetryPolicy::default(),
            })
            .unwrap()
            .unwrap();

        assert_eq!(outcome.restored, 1);
        assert!(outcome.failures.is_empty());
        assert_eq!(fs::read(&discard).unwrap(), b"same bytes");
        assert_eq!(state, before);
        assert!(journal.is_empty());
        assert_eq!(ArchiveState::load(&paths).unwrap(), before);
    }

    #[test]
    fn failed_restore_keeps_file_quarantined() {
        let temp = TempDir::new().unwrap();
        let discard = temp.path().join("b").join("x.jpg");
        fs::create_dir_all(discard.parent().unwrap()).unwrap();
        fs::write(&discard, b"bytes").unwrap();

        let paths = StatePaths::in_dir(temp.path());
        let mover = QuarantineMover::new(temp.path().join("q"));
        let mut state = ArchiveState::default();
        state.store.insert(FileRecord::new(&discard, 5));

        let mut journal = UndoJournal::new();
        journal.push(UndoAction::CollapseSet {
            set_key: "k".to_string(),
            moved: BTreeMap::new(),
            records_before: state.store.snapshot(&[discard.clone()]),
            grouping_before: None,
        });
        let report = mover.quarantine(&[discard.clone()]).unwrap();
        journal.record_moves(&report.moved);
        state.manifest.record_moves(&report.moved);
        let quarantined = report.moved[&discard].clone();
        state.store.get_mut(&discard).unwrap().quarantine_path = Some(quarantined.clone());

        // Something new now occupies the original location.
        fs::write(&discard, b"newer").unwrap();

        let outcome = journal
            .pop_and_replay(ReplayContext {
                state: &mut state,
                mover: &mover,
                paths: &paths,
                retry: &RetryPolicy::default(),
            })
            .unwrap()
            .unwrap();

        assert_eq!(outcome.restored, 0);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            state.store.get(&discard).unwrap().quarantine_path,
            Some(quarantined.clone())
        );
        assert_eq!(state.manifest.original_of(&quarantined), Some(&discard));
    }
}
