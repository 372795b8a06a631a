use dupecache::cache::FingerprintCache;
use dupecache::duplicates::{CoordinatorConfig, DuplicateReport, ReportKind, ScanCoordinator};
use dupecache::pool::{QueueOrder, Task, TaskHandler, TaskQueue, WorkerPool};
use dupecache::scanner::{ScanError, WalkEntry};
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct SlowCounter {
    handled: AtomicUsize,
    max_seen_depth: AtomicUsize,
    queue: Mutex<Option<Arc<TaskQueue>>>,
}

impl TaskHandler for SlowCounter {
    fn handle(&self, _task: &Task) {
        if let Some(queue) = self.queue.lock().unwrap().as_ref() {
            self.max_seen_depth.fetch_max(queue.len(), Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        self.handled.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_queue_depth_never_exceeds_bound() {
    let queue = Arc::new(TaskQueue::new(4, QueueOrder::Lifo));
    let handler = Arc::new(SlowCounter {
        handled: AtomicUsize::new(0),
        max_seen_depth: AtomicUsize::new(0),
        queue: Mutex::new(Some(Arc::clone(&queue))),
    });
    let pool = WorkerPool::new(
        Arc::clone(&queue),
        Arc::clone(&handler) as Arc<dyn TaskHandler>,
        Arc::new(AtomicBool::new(false)),
    );
    pool.start(2).unwrap();

    for i in 0..60 {
        queue.push(Task::new(format!("/virtual/{i}"))).unwrap();
        assert!(queue.len() <= 4);
    }
    assert!(queue.wait_quiescent());
    pool.stop();

    assert_eq!(handler.handled.load(Ordering::SeqCst), 60);
    assert!(queue.high_water_mark() <= 4);
    assert!(handler.max_seen_depth.load(Ordering::SeqCst) <= 4);
}

#[test]
fn test_shutdown_unblocks_full_queue_producer() {
    let flag = Arc::new(AtomicBool::new(false));
    let queue = Arc::new(TaskQueue::new(1, QueueOrder::Fifo).with_shutdown_flag(Arc::clone(&flag)));
    queue.push(Task::new("/first")).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || queue.push(Task::new("/second")))
    };
    std::thread::sleep(Duration::from_millis(50));
    flag.store(true, Ordering::SeqCst);

    let result = producer.join().unwrap();
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().into_task().path, PathBuf::from("/second"));
}

#[test]
fn test_small_queue_scan_completes() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..40 {
        let path = dir.path().join(format!("f{i:02}"));
        fs::write(&path, format!("content {}", i % 5)).unwrap();
        paths.push(path);
    }

    let config = CoordinatorConfig::default()
        .with_min_size(0)
        .with_workers(3)
        .with_max_queue_depth(1);
    let report = ScanCoordinator::new(config, None).run_once_files(paths).unwrap();

    assert_eq!(report.stats.files_scanned, 40);
    assert_eq!(report.groups.len(), 5);
    assert!(report.groups.iter().all(|g| g.paths.len() == 8));
}

#[test]
fn test_background_passes_track_deletions() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let c = dir.path().join("c");
    for p in [&a, &b, &c] {
        fs::write(p, b"identical").unwrap();
    }

    let config = CoordinatorConfig::default()
        .with_min_size(0)
        .with_background_interval(Duration::from_millis(10));
    let cache = Arc::new(FingerprintCache::in_memory());
    let coordinator = ScanCoordinator::new(config, Some(Arc::clone(&cache)));

    let mut complete: Vec<DuplicateReport> = Vec::new();
    let passes = coordinator
        .run_background(
            || {
                [&a, &b, &c]
                    .into_iter()
                    .filter(|p| p.exists())
                    .map(|p| Ok::<_, ScanError>(WalkEntry::file(p)))
                    .collect::<Vec<_>>()
            },
            |report, kind| {
                if kind != ReportKind::PassComplete {
                    return;
                }
                complete.push(report.clone());
                match complete.len() {
                    1 => fs::remove_file(&c).unwrap(),
                    _ => coordinator.stop(),
                }
            },
        )
        .unwrap();

    assert_eq!(passes, 2);
    assert_eq!(complete[0].groups[0].paths.len(), 3);
    assert_eq!(complete[1].groups[0].paths, vec![a.clone(), b.clone()]);
    assert_eq!(complete[1].stats.cache_hits, 2);
    assert!(!coordinator.index().contains(&c));
    assert!(cache.lookup(&c).unwrap().is_none());
}

#[test]
fn test_background_passes_drop_file_shrunk_below_threshold() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, [b'x'; 1024]).unwrap();
    fs::write(&b, [b'x'; 1024]).unwrap();

    let config = CoordinatorConfig::default()
        .with_min_size(512)
        .with_background_passes(Some(2))
        .with_background_interval(Duration::from_millis(10));
    let cache = Arc::new(FingerprintCache::in_memory());
    let coordinator = ScanCoordinator::new(config, Some(Arc::clone(&cache)));

    let mut complete: Vec<DuplicateReport> = Vec::new();
    let passes = coordinator
        .run_background(
            || {
                [&a, &b]
                    .into_iter()
                    .map(|p| Ok::<_, ScanError>(WalkEntry::file(p)))
                    .collect::<Vec<_>>()
            },
            |report, kind| {
                if kind != ReportKind::PassComplete {
                    return;
                }
                complete.push(report.clone());
                if complete.len() == 1 {
                    fs::write(&b, b"tiny").unwrap();
                }
            },
        )
        .unwrap();

    assert_eq!(passes, 2);
    assert_eq!(complete[0].groups.len(), 1);
    assert!(complete[1].groups.is_empty());
    assert_eq!(complete[1].stats.files_skipped, 1);
    assert!(!coordinator.index().contains(&b));
    assert!(coordinator.index().contains(&a));
    assert!(cache.lookup(&b).unwrap().is_none());
    assert!(cache.lookup(&a).unwrap().is_some());
}

#[test]
fn test_background_interim_reports_are_capped() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for (name, content) in [("a1", "x1"), ("a2", "x1"), ("b1", "yy2"), ("b2", "yy2")] {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        paths.push(path);
    }

    let config = CoordinatorConfig::default()
        .with_min_size(0)
        .with_report_interval(Duration::ZERO)
        .with_report_group_limit(Some(1))
        .with_background_passes(Some(1));
    let coordinator = ScanCoordinator::new(config, None);

    let mut interim = 0;
    let mut final_groups = 0;
    coordinator
        .run_background(
            || paths.iter().map(|p| Ok::<_, ScanError>(WalkEntry::file(p))).collect::<Vec<_>>(),
            |report, kind| match kind {
                ReportKind::Interim => {
                    interim += 1;
                    assert!(report.groups.len() <= 1);
                }
                ReportKind::PassComplete => final_groups = report.groups.len(),
            },
        )
        .unwrap();

    assert!(interim >= 1);
    assert_eq!(final_groups, 2);
}

#[test]
fn test_stop_mid_pass_leaves_index_consistent() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..30 {
        let path = dir.path().join(format!("f{i:02}"));
        fs::write(&path, format!("payload {}", i % 3)).unwrap();
        paths.push(path);
    }

    let config = CoordinatorConfig::default()
        .with_min_size(0)
        .with_max_queue_depth(2)
        .with_report_interval(Duration::ZERO);
    let coordinator = ScanCoordinator::new(config, None);

    let passes = coordinator
        .run_background(
            || paths.iter().map(|p| Ok::<_, ScanError>(WalkEntry::file(p))).collect::<Vec<_>>(),
            |_, kind| {
                if kind == ReportKind::Interim {
                    coordinator.stop();
                }
            },
        )
        .unwrap();
    assert_eq!(passes, 0);

    // Every indexed path sits in exactly the bucket its own content implies
    let snapshot = coordinator.index().snapshot();
    for (size, digests) in snapshot.buckets() {
        for (digest, members) in digests {
            assert!(!members.is_empty());
            for path in members {
                let bytes = fs::read(path).unwrap();
                assert_eq!(bytes.len() as u64, *size);
                assert_eq!(&blake3::hash(&bytes).to_hex().to_string(), digest);
            }
        }
    }
}

fn write_corpus(contents: &[u8]) -> (TempDir, Vec<PathBuf>) {
    let dir = tempdir().unwrap();
    let paths = contents
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let path = dir.path().join(format!("file{i:03}"));
            // Content class c; length varies with class so sizes collide too
            fs::write(&path, vec![b'a' + c; 4 + usize::from(c % 3)]).unwrap();
            path
        })
        .collect();
    (dir, paths)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_worker_count_does_not_change_result(
        contents in prop::collection::vec(0u8..6, 1..40),
        workers in 2usize..6,
        depth in 1usize..8,
        fifo in any::<bool>(),
    ) {
        let (_dir, paths) = write_corpus(&contents);
        let order = if fifo { QueueOrder::Fifo } else { QueueOrder::Lifo };

        let serial = ScanCoordinator::new(
            CoordinatorConfig::default().with_min_size(0).with_workers(1),
            None,
        )
        .run_once_files(paths.clone())
        .unwrap();

        let parallel = ScanCoordinator::new(
            CoordinatorConfig::default()
                .with_min_size(0)
                .with_workers(workers)
                .with_max_queue_depth(depth)
                .with_queue_order(order),
            None,
        )
        .run_once_files(paths)
        .unwrap();

        prop_assert_eq!(&serial.groups, &parallel.groups);
        prop_assert_eq!(serial.stats.files_scanned, contents.len());
        prop_assert_eq!(parallel.stats.files_scanned, contents.len());

        // Every path appears in at most one group
        let mut seen = std::collections::HashSet::new();
        for group in &parallel.groups {
            prop_assert!(group.paths.len() >= 2);
            for path in &group.paths {
                prop_assert!(seen.insert(path.clone()));
            }
        }
    }
}
