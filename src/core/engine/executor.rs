//! Applying decisions to one duplicate set.

use super::DedupEngine;
use crate::core::cluster::PendingDecision;
use crate::core::grouper::DuplicateSet;
use crate::core::journal::UndoAction;
use crate::core::merge::MergedMetadata;
use crate::core::resolver::{Resolution, Resolver};
use crate::error::{QuarantineError, ResolverError, Result};
use crate::events::{Event, EngineEvent, GroupEvent};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What happened to one duplicate set
#[derive(Debug)]
pub enum SetOutcome {
    /// Discards were quarantined and keepers got the merged metadata
    Collapsed {
        set_key: String,
        kept: usize,
        /// Original path -> quarantine path
        moved: BTreeMap<PathBuf, PathBuf>,
        /// Discards that could not be moved; they stay in place
        failures: Vec<(PathBuf, QuarantineError)>,
        bytes_reclaimed: u64,
    },
    /// Every file was kept; only metadata changed
    MetadataUpdated { set_key: String, kept: usize },
    /// No decision yet; nothing was touched
    Deferred { set_key: String, clusters: usize },
    /// The resolver's answer broke its contract; nothing was touched
    Rejected(ResolverError),
}

impl DedupEngine {
    pub(super) fn process_set(
        &mut self,
        set: &DuplicateSet,
        decision: PendingDecision,
        resolver: &mut dyn Resolver,
    ) -> Result<SetOutcome> {
        match decision {
            PendingDecision::Automatic {
                keeper,
                merged,
                discards,
            } => self.collapse(set, &[keeper], &discards, merged),
            PendingDecision::NeedsManualChoice { clusters } => match resolver.resolve(&clusters) {
                Some(resolution) => self.apply(set, resolution),
                None => {
                    let set_key = set.key();
                    tracing::info!(
                        "Deferred set {} ({} conflicting clusters)",
                        set_key,
                        clusters.len()
                    );
                    self.events.send(Event::Group(GroupEvent::SetDeferred {
                        set_key: set_key.clone(),
                        clusters: clusters.len(),
                    }));
                    Ok(SetOutcome::Deferred {
                        set_key,
                        clusters: clusters.len(),
                    })
                }
            },
        }
    }

    /// Apply an explicit resolution to a duplicate set.
    ///
    /// A resolution that breaks the keeper/discard contract is rejected
    /// without touching anything. Keepers receive the union of every
    /// member's metadata, with the chosen timestamp/geotag first.
    pub fn apply(&mut self, set: &DuplicateSet, resolution: Resolution) -> Result<SetOutcome> {
        let set_key = set.key();
        if let Err(e) = resolution.validate(&set_key, &set.paths()) {
            tracing::warn!("Rejected resolution for set {}: {}", set_key, e);
            self.events.send(Event::Group(GroupEvent::SetRejected {
                set_key,
                message: e.to_string(),
            }));
            return Ok(SetOutcome::Rejected(e));
        }

        let merged = self
            .merger
            .merge_with_choice(&set.records, resolution.choice());

        if resolution.discards.is_empty() {
            self.update_metadata(set, &resolution.keepers, merged)
        } else {
            self.collapse(set, &resolution.keepers, &resolution.discards, merged)
        }
    }

    fn collapse(
        &mut self,
        set: &DuplicateSet,
        keepers: &[PathBuf],
        discards: &[PathBuf],
        merged: MergedMetadata,
    ) -> Result<SetOutcome> {
        let set_key = set.key();
        let members = set.paths();

        self.journal.push(UndoAction::CollapseSet {
            set_key: set_key.clone(),
            moved: BTreeMap::new(),
            records_before: self.state.store.snapshot(&members),
            grouping_before: self.state.grouping.get(&set_key).cloned(),
        });

        let report = match self.mover.quarantine(discards) {
            Ok(report) => report,
            Err(e) => {
                self.journal.discard_top();
                return Err(e.into());
            }
        };

        self.journal.record_moves(&report.moved);
        self.state.manifest.record_moves(&report.moved);
        for (original, quarantined) in &report.moved {
            if let Some(record) = self.state.store.get_mut(original) {
                record.quarantine_path = Some(quarantined.clone());
            }
        }
        for keeper in keepers {
            if let Some(record) = self.state.store.get_mut(keeper) {
                merged.apply_to(record);
            }
        }

        let remaining: Vec<PathBuf> = members
            .into_iter()
            .filter(|p| !report.moved.contains_key(p))
            .collect();
        self.state
            .grouping
            .set(&set_key, (remaining.len() > 1).then_some(remaining));

        self.commit()?;

        let size = set.records.first().map(|r| r.size).unwrap_or(0);
        let bytes_reclaimed = size * report.moved.len() as u64;
        tracing::info!(
            "Collapsed set {}: kept {}, quarantined {}, {} failed",
            set_key,
            keepers.len(),
            report.moved.len(),
            report.failures.len()
        );
        self.events.send(Event::Group(GroupEvent::SetCollapsed {
            set_key: set_key.clone(),
            kept: keepers.len(),
            quarantined: report.moved.len(),
        }));

        Ok(SetOutcome::Collapsed {
            set_key,
            kept: keepers.len(),
            moved: report.moved,
            failures: report.failures,
            bytes_reclaimed,
        })
    }

    fn update_metadata(
        &mut self,
        set: &DuplicateSet,
        keepers: &[PathBuf],
        merged: MergedMetadata,
    ) -> Result<SetOutcome> {
        self.journal.push(UndoAction::UpdateMetadata {
            records_before: self.state.store.snapshot(keepers),
        });

        for keeper in keepers {
            if let Some(record) = self.state.store.get_mut(keeper) {
                merged.apply_to(record);
            }
        }

        self.commit()?;

        tracing::info!(
            "Kept all {} files of set {}, metadata merged",
            keepers.len(),
            set.key()
        );
        Ok(SetOutcome::MetadataUpdated {
            set_key: set.key(),
            kept: keepers.len(),
        })
    }

    /// Persist the top journal entry's changes, or roll them back
    fn commit(&mut self) -> Result<()> {
        if let Err(e) = self.state.save(&self.paths, &self.config.retry) {
            tracing::error!("Could not persist state, rolling back the last set: {}", e);
            if let Some(outcome) = self.journal.rollback_top(&mut self.state, &self.mover) {
                for (path, failure) in &outcome.failures {
                    tracing::error!(
                        "{} is still quarantined after rollback: {}",
                        path.display(),
                        failure
                    );
                }
            }
            // Renames are not atomic as a group, so some files may already
            // hold the collapsed state.
            if let Err(again) = self.state.save(&self.paths, &self.config.retry) {
                tracing::error!("Could not persist the rolled-back state either: {}", again);
            }
            return Err(e.into());
        }

        self.events.send(Event::Engine(EngineEvent::StateSaved));
        Ok(())
    }
}
