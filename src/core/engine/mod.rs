//! # Engine Module
//!
//! Orchestrates one deduplication run over the persisted archive state.
//!
//! ## Stages
//! 1. **Hash** - lazily hash the files that share a name and size with
//!    another file (the only parallel step)
//! 2. **Group** - `(name, size)` buckets, then content buckets
//! 3. **Resolve** - per duplicate set: cluster, decide, merge, quarantine,
//!    journal, persist
//!
//! Sets are handled one at a time on the calling thread. Each set is
//! committed (state persisted) before the next one starts; if persisting
//! fails the set is rolled back and the run stops.

mod config;
mod executor;

pub use config::{default_state_dir, EngineConfig, EngineConfigBuilder, APP_DIR_NAME};
pub use executor::SetOutcome;

use crate::core::cluster::{ConflictClusterer, PendingDecision};
use crate::core::grouper::{DuplicateGrouper, DuplicateSet, GroupingIndex};
use crate::core::hasher::ContentHasher;
use crate::core::journal::{ReplayContext, ReplayOutcome, UndoJournal};
use crate::core::merge::MetadataMerger;
use crate::core::quarantine::{QuarantineMover, RestoreReport};
use crate::core::record::FileRecord;
use crate::core::resolver::Resolver;
use crate::core::scanner::{MediaScanner, ScanConfig, WalkDirScanner};
use crate::core::store::{ArchiveState, IngestStats, StatePaths};
use crate::error::{HashError, QuarantineError, ResolverError, Result, ScanError};
use crate::events::{
    null_sender, EngineEvent, EnginePhase, Event, EventSender, GroupEvent, RunStats,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lets a caller stop a run between duplicate sets
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Duplicate sets found by [`DedupEngine::find_duplicate_sets`]
#[derive(Debug, Default)]
pub struct DetectionReport {
    pub sets: Vec<DuplicateSet>,
    /// Listed in the store but absent on disk
    pub missing: Vec<PathBuf>,
    /// Files that could not be hashed and were left out of grouping
    pub hash_failures: Vec<(PathBuf, HashError)>,
    /// Files hashed during this call
    pub hashed: usize,
}

/// Everything a run did, per category
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stats: RunStats,
    pub missing_files: Vec<PathBuf>,
    pub hash_failures: Vec<(PathBuf, HashError)>,
    pub move_failures: Vec<(PathBuf, QuarantineError)>,
    pub rejections: Vec<ResolverError>,
    /// Keys of sets left for later
    pub deferred: Vec<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: SetOutcome) {
        match outcome {
            SetOutcome::Collapsed {
                moved,
                failures,
                bytes_reclaimed,
                ..
            } => {
                if moved.is_empty() {
                    self.stats.sets_failed += 1;
                } else {
                    self.stats.sets_collapsed += 1;
                }
                self.stats.files_quarantined += moved.len();
                self.stats.bytes_reclaimed += bytes_reclaimed;
                self.move_failures.extend(failures);
            }
            SetOutcome::MetadataUpdated { .. } => self.stats.sets_collapsed += 1,
            SetOutcome::Deferred { set_key, .. } => {
                self.stats.sets_deferred += 1;
                self.deferred.push(set_key);
            }
            SetOutcome::Rejected(error) => {
                self.stats.sets_rejected += 1;
                self.rejections.push(error);
            }
        }
    }
}

/// Result of [`DedupEngine::scan`]
#[derive(Debug, Default)]
pub struct ScanReport {
    pub ingest: IngestStats,
    pub photos: usize,
    pub videos: usize,
    pub errors: Vec<ScanError>,
}

/// Snapshot of the persisted state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub records: usize,
    pub hashed: usize,
    pub quarantined: usize,
    pub duplicate_groups: usize,
    pub undo_depth: usize,
}

/// The deduplication engine
pub struct DedupEngine {
    config: EngineConfig,
    paths: StatePaths,
    state: ArchiveState,
    journal: UndoJournal,
    hasher: ContentHasher,
    grouper: DuplicateGrouper,
    clusterer: ConflictClusterer,
    merger: MetadataMerger,
    mover: QuarantineMover,
    events: EventSender,
    cancel: CancellationToken,
}

impl DedupEngine {
    /// Load persisted state (or start empty) for `config`
    pub fn open(config: EngineConfig) -> Result<Self> {
        let paths = config.state_paths();
        let state = ArchiveState::load(&paths)?;
        tracing::info!(
            "Opened state in {} ({} records, {} quarantined)",
            config.state_dir.display(),
            state.store.len(),
            state.manifest.len()
        );

        Ok(Self {
            hasher: config.hasher(),
            grouper: DuplicateGrouper::new(),
            clusterer: ConflictClusterer::new(config.tolerance),
            merger: MetadataMerger::new(),
            mover: QuarantineMover::new(&config.quarantine_dir).with_retry(config.retry),
            journal: UndoJournal::new(),
            events: null_sender(),
            cancel: CancellationToken::new(),
            paths,
            state,
            config,
        })
    }

    /// Route progress events to `sender`
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.mover = self.mover.with_events(sender.clone());
        self.events = sender;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &ArchiveState {
        &self.state
    }

    pub fn journal(&self) -> &UndoJournal {
        &self.journal
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            records: self.state.store.len(),
            hashed: self
                .state
                .store
                .iter()
                .filter(|r| r.content_hash.is_some())
                .count(),
            quarantined: self.state.manifest.len(),
            duplicate_groups: self.state.grouping.len(),
            undo_depth: self.journal.len(),
        }
    }

    /// Merge externally extracted records into the store and persist
    pub fn ingest<I>(&mut self, records: I) -> Result<IngestStats>
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let stats = self.state.store.ingest(records);
        tracing::info!(
            "Ingested records: {} new, {} updated",
            stats.inserted,
            stats.updated
        );
        self.persist()?;
        Ok(stats)
    }

    /// Discover media under `roots` and ingest it. The state and quarantine
    /// directories are never scanned.
    pub fn scan(&mut self, roots: &[PathBuf], mut config: ScanConfig) -> Result<ScanReport> {
        config.exclude.push(self.config.state_dir.clone());
        config.exclude.push(self.config.quarantine_dir.clone());

        let result = WalkDirScanner::new(config).scan_with_events(roots, &self.events)?;
        let ingest = self.ingest(result.records)?;

        Ok(ScanReport {
            ingest,
            photos: result.photos,
            videos: result.videos,
            errors: result.errors,
        })
    }

    /// Hash what grouping needs, then find every duplicate set.
    ///
    /// New hashes and the rebuilt grouping index are persisted.
    pub fn find_duplicate_sets(&mut self) -> Result<DetectionReport> {
        let mut report = DetectionReport::default();

        self.phase(EnginePhase::Hashing);
        let pending = self.grouper.needs_hashing(self.state.store.iter());
        if !pending.is_empty() {
            tracing::info!("Hashing {} candidate files", pending.len());
            for (path, result) in self.hasher.hash_batch_with_events(&pending, &self.events) {
                match result {
                    Ok(digest) => {
                        self.state.store.set_hash(&path, digest);
                        report.hashed += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Excluding {} from grouping: {}", path.display(), e);
                        report.hash_failures.push((path, e));
                    }
                }
            }
        }

        self.phase(EnginePhase::Grouping);
        let outcome = self.grouper.candidate_sets(self.state.store.iter());
        for path in &outcome.missing {
            self.events
                .send(Event::Group(GroupEvent::MissingFile { path: path.clone() }));
        }

        let files: usize = outcome.sets.iter().map(DuplicateSet::len).sum();
        tracing::info!("Found {} duplicate sets ({} files)", outcome.sets.len(), files);
        self.events.send(Event::Group(GroupEvent::SetsFound {
            sets: outcome.sets.len(),
            files,
        }));

        let grouping = GroupingIndex::from_sets(&outcome.sets);
        if report.hashed > 0 || grouping != self.state.grouping {
            self.state.grouping = grouping;
            self.persist()?;
        }

        report.sets = outcome.sets;
        report.missing = outcome.missing;
        Ok(report)
    }

    /// What would happen to each set, without touching anything
    pub fn plan(&self, sets: &[DuplicateSet]) -> Vec<PendingDecision> {
        sets.iter().map(|set| self.clusterer.decide(set)).collect()
    }

    /// Find and process every duplicate set.
    ///
    /// Single-cluster sets are collapsed automatically; the others go to
    /// `resolver`. Stops early on cancellation or a fatal error.
    pub fn run(&mut self, resolver: &mut dyn Resolver) -> Result<RunSummary> {
        let start = Instant::now();
        self.events.send(Event::Engine(EngineEvent::Started));

        let detection = self.find_duplicate_sets()?;
        let mut summary = RunSummary {
            missing_files: detection.missing,
            hash_failures: detection.hash_failures,
            ..RunSummary::default()
        };
        summary.stats.sets_found = detection.sets.len();

        self.phase(EnginePhase::Resolving);
        for set in &detection.sets {
            if self.cancel.is_cancelled() {
                tracing::info!("Run cancelled, remaining sets left untouched");
                self.events.send(Event::Engine(EngineEvent::Cancelled));
                summary.cancelled = true;
                break;
            }

            let decision = self.clusterer.decide(set);
            match self.process_set(set, decision, resolver) {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    tracing::error!("Stopping run: {}", e);
                    self.events.send(Event::Engine(EngineEvent::Error {
                        message: e.to_string(),
                    }));
                    return Err(e);
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Run complete: {} collapsed, {} failed, {} deferred, {} rejected, {} files quarantined",
            summary.stats.sets_collapsed,
            summary.stats.sets_failed,
            summary.stats.sets_deferred,
            summary.stats.sets_rejected,
            summary.stats.files_quarantined
        );
        self.events.send(Event::Engine(EngineEvent::Completed {
            summary: summary.stats.clone(),
        }));
        Ok(summary)
    }

    /// Revert the most recent set action of this session.
    ///
    /// `Ok(None)` means there was nothing to undo.
    pub fn undo(&mut self) -> Result<Option<ReplayOutcome>> {
        let outcome = self.journal.pop_and_replay(ReplayContext {
            state: &mut self.state,
            mover: &self.mover,
            paths: &self.paths,
            retry: &self.config.retry,
        })?;

        if let Some(outcome) = &outcome {
            self.events.send(Event::Engine(EngineEvent::Undone {
                restored: outcome.restored,
            }));
        }
        Ok(outcome)
    }

    /// Put quarantined files back using the persisted manifest.
    ///
    /// Works across restarts. `only` limits the restore to the given
    /// original or quarantine paths; empty means everything.
    pub fn restore_quarantined(&mut self, only: &[PathBuf]) -> Result<RestoreReport> {
        let wanted = |quarantined: &Path, original: &Path| {
            only.is_empty() || only.iter().any(|p| p == quarantined || p == original)
        };
        let selected: BTreeMap<PathBuf, PathBuf> = self
            .state
            .manifest
            .entries()
            .iter()
            .filter(|(q, o)| wanted(q, o))
            .map(|(q, o)| (q.clone(), o.clone()))
            .collect();

        let report = self.mover.restore(&selected);
        self.state.manifest.forget(report.restored.keys());
        for original in report.restored.values() {
            if let Some(record) = self.state.store.get_mut(original) {
                record.quarantine_path = None;
            }
        }

        if !report.restored.is_empty() {
            self.persist()?;
        }
        Ok(report)
    }

    fn persist(&self) -> Result<()> {
        self.state.save(&self.paths, &self.config.retry)?;
        self.events.send(Event::Engine(EngineEvent::StateSaved));
        Ok(())
    }

    fn phase(&self, phase: EnginePhase) {
        tracing::debug!("Phase: {}", phase);
        self.events
            .send(Event::Engine(EngineEvent::PhaseChanged { phase }));
    }
}
