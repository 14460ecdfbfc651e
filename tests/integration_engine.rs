//! Integration tests for full deduplication runs.
//!
//! These tests drive the engine end to end on a real directory tree:
//! - Automatic collapse of agreeing copies
//! - Deferred and resolved conflicts
//! - Persistence across engine restarts
//! - Undo within a session

use archive_dedup::core::cluster::ConflictCluster;
use archive_dedup::core::engine::{CancellationToken, DedupEngine, EngineConfig};
use archive_dedup::core::record::{FileRecord, GeoTag, Observation, ObservationSource};
use archive_dedup::core::resolver::{DeferResolver, Resolution};
use archive_dedup::core::scanner::ScanConfig;
use archive_dedup::core::store::{ArchiveState, StatePaths};
use archive_dedup::events::{Event, EventChannel, GroupEvent};
use assert_fs::prelude::*;
use assert_fs::TempDir;
use chrono::{NaiveDate, NaiveDateTime};
use predicates::prelude::*;
use std::path::PathBuf;

fn ts(second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, second)
        .unwrap()
}

fn config(temp: &TempDir) -> EngineConfig {
    EngineConfig::builder(temp.path().join("state"))
        .quarantine_dir(temp.path().join("quarantine"))
        .workers(2)
        .build()
        .unwrap()
}

fn put(temp: &TempDir, relative: &str, bytes: &[u8]) -> PathBuf {
    let child = temp.child(relative);
    std::fs::create_dir_all(child.path().parent().unwrap()).unwrap();
    child.write_binary(bytes).unwrap();
    child.path().to_path_buf()
}

/// Write `bytes` under the archive and return a record for it
fn media(temp: &TempDir, relative: &str, bytes: &[u8]) -> FileRecord {
    let path = put(temp, &format!("archive/{relative}"), bytes);
    FileRecord::new(path, bytes.len() as u64)
}

fn exif(record: FileRecord, second: u32) -> FileRecord {
    record.with_observation(ObservationSource::Exif, Observation::at(ts(second)))
}

#[test]
fn agreeing_copies_are_collapsed_automatically() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "2023/x.jpg", b"same pixels"), 0);
    let b = media(&temp, "backup/x.jpg", b"same pixels").with_observation(
        ObservationSource::Tool,
        Observation::new(Some(ts(3)), Some(GeoTag::new(48.8584, 2.2945))),
    );

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();
    let summary = engine.run(&mut DeferResolver).unwrap();

    assert_eq!(summary.stats.sets_found, 1);
    assert_eq!(summary.stats.sets_collapsed, 1);
    assert_eq!(summary.stats.files_quarantined, 1);
    assert_eq!(summary.stats.bytes_reclaimed, 11);

    // First in path order wins a tie on observation count
    temp.child("archive/2023/x.jpg").assert(predicate::path::exists());
    temp.child("archive/backup/x.jpg")
        .assert(predicate::path::missing());
    temp.child("quarantine/x.jpg").assert("same pixels");

    let keeper = engine.state().store.get(&a.path).unwrap();
    assert_eq!(keeper.exif_observations.len(), 1);
    assert_eq!(keeper.tool_observations.len(), 1);
    assert_eq!(keeper.best_geotag(), Some(GeoTag::new(48.8584, 2.2945)));

    let discard = engine.state().store.get(&b.path).unwrap();
    assert_eq!(
        discard.quarantine_path,
        Some(temp.path().join("quarantine").join("x.jpg"))
    );
    assert_eq!(
        engine
            .state()
            .manifest
            .original_of(&temp.path().join("quarantine/x.jpg")),
        Some(&b.path)
    );
}

#[test]
fn conflicting_copies_are_deferred() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 59);

    let (sender, receiver) = EventChannel::new();
    let mut engine = DedupEngine::open(config(&temp)).unwrap().with_events(sender);
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();
    let summary = engine.run(&mut DeferResolver).unwrap();
    drop(engine);

    assert_eq!(summary.stats.sets_deferred, 1);
    assert_eq!(summary.deferred.len(), 1);
    assert!(a.path.exists() && b.path.exists());
    temp.child("quarantine").assert(predicate::path::missing());

    let deferred = receiver
        .iter()
        .filter(|e| matches!(e, Event::Group(GroupEvent::SetDeferred { clusters: 2, .. })))
        .count();
    assert_eq!(deferred, 1);
}

#[test]
fn resolver_choice_keeps_one_cluster_and_its_metadata() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 2);
    let c = exif(media(&temp, "c/x.jpg", b"same"), 40);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a.clone(), b.clone(), c.clone()]).unwrap();

    let mut seen = 0;
    let mut keep_late = |clusters: &[ConflictCluster]| -> Option<Resolution> {
        seen = clusters.len();
        let late = clusters
            .iter()
            .position(|cl| cl.resolved().timestamp == Some(ts(40)))?;
        Resolution::keep_cluster(clusters, late)
    };
    let summary = engine.run(&mut keep_late).unwrap();

    assert_eq!(seen, 2);
    assert_eq!(summary.stats.files_quarantined, 2);
    assert!(c.path.exists());
    assert!(!a.path.exists() && !b.path.exists());
    temp.child("quarantine/x.jpg").assert(predicate::path::exists());
    temp.child("quarantine/x (1).jpg").assert(predicate::path::exists());

    let keeper = engine.state().store.get(&c.path).unwrap();
    assert_eq!(keeper.best_timestamp(), Some(ts(40)));
    assert_eq!(keeper.exif_observations.len(), 3);
}

#[test]
fn invalid_resolution_is_counted_as_rejected() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 30);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();

    let mut discard_everything = |clusters: &[ConflictCluster]| -> Option<Resolution> {
        Some(Resolution {
            discards: clusters.iter().flat_map(|c| c.paths()).collect(),
            ..Resolution::default()
        })
    };
    let summary = engine.run(&mut discard_everything).unwrap();

    assert_eq!(summary.stats.sets_rejected, 1);
    assert_eq!(summary.rejections.len(), 1);
    assert!(a.path.exists() && b.path.exists());
    assert!(engine.journal().is_empty());
}

#[test]
fn state_survives_a_restart() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 1);

    {
        let mut engine = DedupEngine::open(config(&temp)).unwrap();
        engine.ingest(vec![a.clone(), b.clone()]).unwrap();
        engine.run(&mut DeferResolver).unwrap();
    }

    let state = ArchiveState::load(&StatePaths::in_dir(&temp.path().join("state"))).unwrap();
    assert_eq!(state.store.len(), 2);
    assert_eq!(state.manifest.len(), 1);
    assert!(state.store.get(&b.path).unwrap().is_quarantined());
    assert!(state.grouping.is_empty());

    temp.child("state/consolidated_metadata.json")
        .assert(predicate::str::contains("quarantine_path"));

    let reopened = DedupEngine::open(config(&temp)).unwrap();
    assert_eq!(reopened.state(), &state);
    assert_eq!(reopened.status().quarantined, 1);
}

#[test]
fn second_run_finds_nothing_new() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 0);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a, b]).unwrap();
    engine.run(&mut DeferResolver).unwrap();

    let again = engine.run(&mut DeferResolver).unwrap();
    assert_eq!(again.stats.sets_found, 0);
    assert_eq!(again.stats.files_quarantined, 0);
}

#[test]
fn undo_restores_files_and_records() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = media(&temp, "b/x.jpg", b"same")
        .with_observation(ObservationSource::User, Observation::at(ts(1)));

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();
    engine.find_duplicate_sets().unwrap();
    let before = engine.state().clone();

    engine.run(&mut DeferResolver).unwrap();
    assert_eq!(engine.journal().len(), 1);

    let outcome = engine.undo().unwrap().unwrap();
    assert_eq!(outcome.restored, 1);
    assert!(outcome.failures.is_empty());
    assert!(a.path.exists() && b.path.exists());

    assert_eq!(engine.state(), &before);
    assert!(engine.undo().unwrap().is_none());
}

#[test]
fn scanned_archives_collapse_on_filename_dates() {
    let temp = TempDir::new().unwrap();
    put(&temp, "archive/phone/IMG_20230101_120000.jpg", b"pixels");
    put(&temp, "archive/takeout/IMG_20230101_120000.jpg", b"pixels");
    put(&temp, "archive/takeout/notes.txt", b"not media");

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    let scan = engine
        .scan(&[temp.path().join("archive")], ScanConfig::default())
        .unwrap();
    assert_eq!(scan.ingest.inserted, 2);
    assert_eq!(scan.photos, 2);

    let summary = engine.run(&mut DeferResolver).unwrap();
    assert_eq!(summary.stats.sets_collapsed, 1);
    temp.child("quarantine/IMG_20230101_120000.jpg")
        .assert(predicate::path::exists());

    // The quarantine directory is never rescanned
    let rescan = engine
        .scan(&[temp.path().to_path_buf()], ScanConfig::default())
        .unwrap();
    assert_eq!(rescan.ingest.inserted, 0);
}

#[test]
fn different_content_with_same_name_is_not_a_duplicate() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"aaaa"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"bbbb"), 0);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a, b]).unwrap();
    let summary = engine.run(&mut DeferResolver).unwrap();

    assert_eq!(summary.stats.sets_found, 0);
    assert_eq!(engine.status().hashed, 2);
}

#[test]
fn missing_files_are_reported_and_skipped() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 0);
    let gone = exif(FileRecord::new(temp.path().join("archive/c/x.jpg"), 4), 0);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a, b, gone.clone()]).unwrap();
    let summary = engine.run(&mut DeferResolver).unwrap();

    assert_eq!(summary.missing_files, vec![gone.path]);
    assert_eq!(summary.stats.sets_collapsed, 1);
}

#[test]
fn cancelled_run_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 0);

    let token = CancellationToken::new();
    let mut engine = DedupEngine::open(config(&temp))
        .unwrap()
        .with_cancellation(token.clone());
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();

    token.cancel();
    let summary = engine.run(&mut DeferResolver).unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.stats.sets_found, 1);
    assert_eq!(summary.stats.sets_collapsed, 0);
    assert!(a.path.exists() && b.path.exists());
}

#[test]
fn plan_does_not_touch_anything() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 0);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();
    let detection = engine.find_duplicate_sets().unwrap();
    let plan = engine.plan(&detection.sets);

    assert_eq!(plan.len(), 1);
    assert!(plan[0].is_automatic());
    assert!(a.path.exists() && b.path.exists());
    assert_eq!(engine.state().grouping.len(), 1);
    let members: Vec<PathBuf> = vec![a.path, b.path];
    assert_eq!(
        engine.state().grouping.get(&detection.sets[0].key()),
        Some(&members)
    );
}

#[test]
fn same_bytes_under_different_names_form_separate_sets() {
    let temp = TempDir::new().unwrap();
    let ax = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let bx = exif(media(&temp, "b/x.jpg", b"same"), 0);
    let ay = exif(media(&temp, "a/y.jpg", b"same"), 0);
    let by = exif(media(&temp, "b/y.jpg", b"same"), 0);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine
        .ingest(vec![ax.clone(), bx.clone(), ay.clone(), by.clone()])
        .unwrap();
    let detection = engine.find_duplicate_sets().unwrap();
    let before = engine.state().clone();

    assert_eq!(detection.sets.len(), 2);
    assert_eq!(engine.state().grouping.len(), detection.sets.len());
    let x_key = detection.sets[0].key();
    let y_key = detection.sets[1].key();
    assert_ne!(x_key, y_key);

    let summary = engine.run(&mut DeferResolver).unwrap();
    assert_eq!(summary.stats.sets_collapsed, 2);
    assert_eq!(summary.stats.files_quarantined, 2);
    assert!(engine.state().grouping.is_empty());

    // Undoing the y set must not bring back or overwrite the x entry
    engine.undo().unwrap().unwrap();
    assert!(by.path.exists());
    assert!(!bx.path.exists());
    assert_eq!(
        engine.state().grouping.get(&y_key),
        Some(&vec![ay.path.clone(), by.path.clone()])
    );
    assert_eq!(engine.state().grouping.get(&x_key), None);

    engine.undo().unwrap().unwrap();
    assert_eq!(engine.state(), &before);
}

#[test]
fn failed_save_leaves_disk_state_as_before_the_set() {
    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 0);

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine.ingest(vec![a.clone(), b.clone()]).unwrap();
    engine.find_duplicate_sets().unwrap();
    let before = engine.state().clone();

    // The metadata file can still be replaced, the grouping index cannot.
    let grouping = temp.path().join("state").join(StatePaths::GROUPING_FILE);
    std::fs::remove_file(&grouping).unwrap();
    std::fs::create_dir(&grouping).unwrap();
    std::fs::write(grouping.join("occupied"), b"x").unwrap();

    let err = engine.run(&mut DeferResolver).unwrap_err();

    assert!(err.is_fatal());
    assert!(a.path.exists() && b.path.exists());
    temp.child("quarantine/x.jpg").assert(predicate::path::missing());
    assert!(engine.journal().is_empty());
    assert_eq!(engine.state(), &before);

    std::fs::remove_dir_all(&grouping).unwrap();
    let on_disk = ArchiveState::load(&StatePaths::in_dir(&temp.path().join("state"))).unwrap();
    assert_eq!(on_disk.store, before.store);
    assert_eq!(on_disk.manifest, before.manifest);
    assert!(!on_disk.store.get(&b.path).unwrap().is_quarantined());

    let mut reopened = DedupEngine::open(config(&temp)).unwrap();
    let summary = reopened.run(&mut DeferResolver).unwrap();
    assert_eq!(summary.stats.sets_collapsed, 1);
    temp.child("quarantine/x.jpg").assert("same");
}

#[cfg(unix)]
#[test]
fn unreadable_files_are_left_out_and_the_run_continues() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let a = exif(media(&temp, "a/x.jpg", b"same"), 0);
    let b = exif(media(&temp, "b/x.jpg", b"same"), 0);
    let c = exif(media(&temp, "a/y.jpg", b"other"), 0);
    let d = exif(media(&temp, "b/y.jpg", b"other"), 0);

    std::fs::set_permissions(&d.path, std::fs::Permissions::from_mode(0o000)).unwrap();
    if std::fs::File::open(&d.path).is_ok() {
        // Permission bits do not apply to this user (root)
        return;
    }

    let mut engine = DedupEngine::open(config(&temp)).unwrap();
    engine
        .ingest(vec![a.clone(), b.clone(), c.clone(), d.clone()])
        .unwrap();
    let summary = engine.run(&mut DeferResolver).unwrap();

    assert_eq!(summary.hash_failures.len(), 1);
    assert_eq!(summary.hash_failures[0].0, d.path);
    assert_eq!(summary.stats.sets_found, 1);
    assert_eq!(summary.stats.sets_collapsed, 1);
    assert!(!b.path.exists());
    assert!(c.path.exists() && d.path.exists());
    assert!(engine.state().store.get(&d.path).unwrap().content_hash.is_none());

    std::fs::set_permissions(&d.path, std::fs::Permissions::from_mode(0o644)).unwrap();
}
