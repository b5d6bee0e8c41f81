//! End-to-end runs of the mirror-and-prune engine through the driver,
//! the worker pool and the observer channel.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_fs::prelude::*;
use predicates::prelude::*;

use mirrorcast::{
    BackupDriver, BackupEvent, BackupProfile, EventPublisher, EventSubscriber,
    FanOutCopier, MirrorcastError, SourceMap, Walker, WorkerPool,
};

fn run_driver(source: &Path, destinations: Vec<PathBuf>, code: &str) -> Vec<BackupEvent> {
    let (publisher, subscriber) = EventPublisher::channel();
    let driver = BackupDriver::new(
        source.to_path_buf(),
        destinations,
        Some(code.to_string()),
        HashSet::new(),
        publisher,
    );
    driver.execute();
    drain(&subscriber)
}

fn drain(subscriber: &EventSubscriber) -> Vec<BackupEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscriber.try_recv() {
        events.push(event);
    }
    events
}

fn error_events(events: &[BackupEvent]) -> Vec<&mirrorcast::CopyError> {
    events
        .iter()
        .filter_map(|e| match e {
            BackupEvent::Error(err) => Some(err),
            _ => None,
        })
        .collect()
}

/// Scenario: a source with a small file and a zero-byte file mirrors into
/// two destinations under the mapped code.
#[test]
fn mirror_into_two_destinations() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/a.txt").write_binary(&[0x01, 0x02, 0x03]).unwrap();
    temp.child("src/sub/b.txt").write_binary(b"").unwrap();
    temp.child("d1").create_dir_all().unwrap();
    temp.child("d2").create_dir_all().unwrap();

    let events = run_driver(
        temp.child("src").path(),
        vec![
            temp.child("d1").path().to_path_buf(),
            temp.child("d2").path().to_path_buf(),
        ],
        "001",
    );

    assert!(error_events(&events).is_empty());
    assert!(matches!(events.last(), Some(BackupEvent::Finished)));

    for dest in ["d1", "d2"] {
        temp.child(format!("{dest}/001/a.txt"))
            .assert(predicate::path::exists());
        assert_eq!(
            fs::read(temp.child(format!("{dest}/001/a.txt")).path()).unwrap(),
            vec![0x01, 0x02, 0x03]
        );
        let b = temp.child(format!("{dest}/001/sub/b.txt"));
        b.assert(predicate::path::exists());
        assert_eq!(fs::metadata(b.path()).unwrap().len(), 0);
    }
}

/// Mirrored files carry the source's mtime.
#[test]
fn mirror_preserves_mtimes() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/a.txt").write_str("payload").unwrap();
    temp.child("d1").create_dir_all().unwrap();

    let stamp = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(temp.child("src/a.txt").path(), stamp).unwrap();

    run_driver(
        temp.child("src").path(),
        vec![temp.child("d1").path().to_path_buf()],
        "001",
    );

    let copied = fs::metadata(temp.child("d1/001/a.txt").path()).unwrap();
    assert_eq!(filetime::FileTime::from_last_modification_time(&copied), stamp);
}

/// Scenario: an unchanged tree re-runs without a single write.
#[test]
fn second_run_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/a.txt").write_binary(&[0x01, 0x02, 0x03]).unwrap();
    temp.child("src/sub/b.txt").write_binary(b"").unwrap();
    temp.child("d1").create_dir_all().unwrap();

    let destinations = vec![temp.child("d1").path().to_path_buf()];
    let events = run_driver(temp.child("src").path(), destinations.clone(), "001");
    assert!(error_events(&events).is_empty());

    // plant a sentinel: newer than the source and deliberately different.
    // an up-to-date run must leave it untouched.
    let copied = temp.child("d1/001/a.txt");
    fs::write(copied.path(), b"sentinel").unwrap();
    filetime::set_file_mtime(
        copied.path(),
        filetime::FileTime::from_unix_time(4_102_444_800, 0),
    )
    .unwrap();

    let events = run_driver(temp.child("src").path(), destinations, "001");
    assert!(error_events(&events).is_empty());
    assert_eq!(fs::read(copied.path()).unwrap(), b"sentinel");
}

/// Scenario: a file removed from the source disappears from every
/// destination on the next run.
#[test]
fn removed_source_files_are_pruned() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/a.txt").write_binary(&[0x01, 0x02, 0x03]).unwrap();
    temp.child("src/sub/b.txt").write_binary(b"").unwrap();
    temp.child("d1").create_dir_all().unwrap();
    temp.child("d2").create_dir_all().unwrap();

    let destinations = vec![
        temp.child("d1").path().to_path_buf(),
        temp.child("d2").path().to_path_buf(),
    ];
    run_driver(temp.child("src").path(), destinations.clone(), "001");

    fs::remove_file(temp.child("src/a.txt").path()).unwrap();
    run_driver(temp.child("src").path(), destinations, "001");

    temp.child("d1/001/a.txt").assert(predicate::path::missing());
    temp.child("d2/001/a.txt").assert(predicate::path::missing());
    temp.child("d1/001/sub/b.txt").assert(predicate::path::exists());
    temp.child("d2/001/sub/b.txt").assert(predicate::path::exists());
}

/// After a prune, the mirrored subtree holds exactly the source's paths.
#[test]
fn prune_leaves_an_exact_mirror() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/keep.txt").write_str("k").unwrap();
    temp.child("src/sub/inner.txt").write_str("i").unwrap();
    temp.child("d1/001/extra/deep/file.txt").write_str("x").unwrap();
    temp.child("d1/001/stale.txt").write_str("s").unwrap();

    run_driver(
        temp.child("src").path(),
        vec![temp.child("d1").path().to_path_buf()],
        "001",
    );

    let source_root = temp.child("src").path().to_path_buf();
    let mirror_root = temp.child("d1/001").path().to_path_buf();
    let source_set: Vec<PathBuf> = Walker::new(&source_root)
        .map(|p| p.strip_prefix(&source_root).unwrap().to_path_buf())
        .collect();
    let mirror_set: Vec<PathBuf> = Walker::new(&mirror_root)
        .map(|p| p.strip_prefix(&mirror_root).unwrap().to_path_buf())
        .collect();

    let source_sorted: HashSet<PathBuf> = source_set.into_iter().collect();
    let mirror_sorted: HashSet<PathBuf> = mirror_set.into_iter().collect();
    assert_eq!(source_sorted, mirror_sorted);
}

/// Scenario: overlapping source and destination fail construction.
#[test]
fn overlapping_roots_are_rejected() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/inside").create_dir_all().unwrap();

    let inside = FanOutCopier::new(
        temp.child("src").path(),
        &[temp.child("src/inside").path().to_path_buf()],
        None,
        None,
    );
    assert!(matches!(
        inside,
        Err(MirrorcastError::OverlappingPaths { .. })
    ));

    let same = FanOutCopier::new(
        temp.child("src").path(),
        &[temp.child("src").path().to_path_buf()],
        None,
        None,
    );
    assert!(matches!(same, Err(MirrorcastError::SamePath(_))));
}

/// Scenario: synchronize drops removed sources and never renumbers the
/// survivors, with the sidecar stored in the destination roots.
#[test]
fn mapping_survives_source_removal() {
    let temp = assert_fs::TempDir::new().unwrap();
    for name in ["src/x", "src/y", "src/z", "dest"] {
        temp.child(name).create_dir_all().unwrap();
    }

    let mut profile = BackupProfile {
        name: "sync".into(),
        sources: vec![
            temp.child("src/x").path().to_path_buf(),
            temp.child("src/y").path().to_path_buf(),
            temp.child("src/z").path().to_path_buf(),
        ],
        destinations: vec![temp.child("dest").path().to_path_buf()],
        id: 0,
    };

    let first = SourceMap::for_profile(&profile, "mapfile");
    temp.child("dest/mapfile").assert(predicate::path::exists());
    let x = first.get(temp.child("src/x").path()).unwrap().to_string();
    let z = first.get(temp.child("src/z").path()).unwrap().to_string();

    profile.sources.remove(1); // drop y
    let second = SourceMap::for_profile(&profile, "mapfile");

    assert_eq!(second.get(temp.child("src/x").path()).unwrap(), x);
    assert_eq!(second.get(temp.child("src/z").path()).unwrap(), z);
    assert_eq!(second.get(temp.child("src/y").path()), None);
    assert_eq!(second.len(), 2);
}

/// Scenario: four sources through a pool bounded at two; every driver
/// finishes and every mirror is complete.
#[test]
fn pool_runs_every_source_to_completion() {
    let temp = assert_fs::TempDir::new().unwrap();
    let mut sources = Vec::new();
    for i in 0..4 {
        let child = temp.child(format!("src{i}/file{i}.txt"));
        child.write_str(&format!("payload {i}")).unwrap();
        sources.push(temp.child(format!("src{i}")).path().to_path_buf());
    }
    temp.child("dest").create_dir_all().unwrap();
    let destination = temp.child("dest").path().to_path_buf();

    let (publisher, subscriber) = EventPublisher::channel();
    let pool = WorkerPool::new(2);
    for (i, source) in sources.iter().enumerate() {
        let driver = BackupDriver::new(
            source.clone(),
            vec![destination.clone()],
            Some(format!("{:03X}", i + 1)),
            HashSet::new(),
            publisher.clone(),
        );
        pool.submit(move || driver.execute());
    }

    let mut finished = 0;
    let deadline = Instant::now() + Duration::from_secs(30);
    while finished < sources.len() && Instant::now() < deadline {
        match subscriber.receiver().recv_timeout(Duration::from_millis(100)) {
            Ok(BackupEvent::Finished) => finished += 1,
            Ok(_) => {}
            Err(_) => {}
        }
    }
    pool.shutdown();

    assert_eq!(finished, 4);
    for i in 0..4 {
        let mirrored = temp.child(format!("dest/{:03X}/file{i}.txt", i + 1));
        mirrored.assert(predicate::path::exists());
        assert_eq!(
            fs::read_to_string(mirrored.path()).unwrap(),
            format!("payload {i}")
        );
    }
}

/// Orphan pruning deletes mapped folders whose source left the profile
/// and keeps everything that still has a live code.
#[test]
fn orphaned_destination_folders_are_reclaimed() {
    let temp = assert_fs::TempDir::new().unwrap();
    for name in ["src/x", "src/y", "dest"] {
        temp.child(name).create_dir_all().unwrap();
    }

    let mut profile = BackupProfile {
        name: "orphans".into(),
        sources: vec![
            temp.child("src/x").path().to_path_buf(),
            temp.child("src/y").path().to_path_buf(),
        ],
        destinations: vec![temp.child("dest").path().to_path_buf()],
        id: 0,
    };

    let map = SourceMap::for_profile(&profile, "mapfile");
    let code_x = map.get(temp.child("src/x").path()).unwrap().to_string();
    let code_y = map.get(temp.child("src/y").path()).unwrap().to_string();
    temp.child(format!("dest/{code_x}/f.txt")).write_str("x").unwrap();
    temp.child(format!("dest/{code_y}/f.txt")).write_str("y").unwrap();
    // unrelated content in the destination root must never be touched
    temp.child("dest/keepsake/note.txt").write_str("mine").unwrap();

    profile.sources.remove(1); // drop y
    let map = SourceMap::for_profile(&profile, "mapfile");
    mirrorcast::prune_orphans(&profile, &map, &EventPublisher::noop());

    temp.child(format!("dest/{code_x}/f.txt"))
        .assert(predicate::path::exists());
    temp.child(format!("dest/{code_y}"))
        .assert(predicate::path::missing());
    temp.child("dest/keepsake/note.txt")
        .assert(predicate::path::exists());
}

/// One destination failing must not affect the other destination of the
/// same file.
#[test]
fn failing_destination_does_not_poison_siblings() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("src/a.txt").write_str("payload").unwrap();
    temp.child("good").create_dir_all().unwrap();

    // a populated directory squats on the file target in "bad"; it cannot
    // be cleared out of the way, so opening the target for writing fails
    temp.child("bad/001/a.txt/occupied").create_dir_all().unwrap();

    let (publisher, subscriber) = EventPublisher::channel();
    let driver = BackupDriver::new(
        temp.child("src").path().to_path_buf(),
        vec![
            temp.child("good").path().to_path_buf(),
            temp.child("bad").path().to_path_buf(),
        ],
        Some("001".to_string()),
        HashSet::new(),
        publisher,
    );

    driver.execute();
    let events = drain(&subscriber);

    temp.child("good/001/a.txt").assert(predicate::path::exists());
    assert_eq!(
        fs::read_to_string(temp.child("good/001/a.txt").path()).unwrap(),
        "payload"
    );
    assert!(!error_events(&events).is_empty());
}
