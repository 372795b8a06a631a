use dupecache::cache::FingerprintCache;
use dupecache::duplicates::{CoordinatorConfig, ScanCoordinator};
use dupecache::scanner::{Walker, WalkerConfig};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn coordinator(cache: &Arc<FingerprintCache>) -> ScanCoordinator {
    ScanCoordinator::new(
        CoordinatorConfig::default().with_min_size(0).with_workers(4),
        Some(Arc::clone(cache)),
    )
}

fn populate(dir: &Path) {
    fs::write(dir.join("a.txt"), b"AAAAAAAAAA").unwrap();
    fs::write(dir.join("b.txt"), b"AAAAAAAAAA").unwrap();
    fs::write(dir.join("c.txt"), b"BBBBBBBBBB").unwrap();
    fs::create_dir(dir.join("sub")).unwrap();
    fs::write(dir.join("sub").join("d.txt"), b"CCCCCCCCCCCC").unwrap();
    fs::write(dir.join("sub").join("e.txt"), b"CCCCCCCCCCCC").unwrap();
}

#[test]
fn test_second_scan_is_all_cache_hits() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let cache = Arc::new(FingerprintCache::in_memory());
    let walker = Walker::new(dir.path(), WalkerConfig::default());

    let first = coordinator(&cache).run_once(walker.walk()).unwrap();
    assert_eq!(first.stats.files_hashed, 5);
    assert_eq!(first.stats.cache_hits, 0);

    let scanner = coordinator(&cache);
    let second = scanner.run_once(walker.walk()).unwrap();
    assert_eq!(second.groups, first.groups);
    assert_eq!(second.stats.files_hashed, 0);
    assert_eq!(second.stats.cache_hits, 5);
    assert_eq!(second.stats.bytes_hashed, 0);
    assert!((second.stats.cache_hit_rate() - 100.0).abs() < f64::EPSILON);
    assert_eq!(scanner.fingerprinter().hashes_computed(), 0);
}

#[test]
fn test_mtime_change_forces_rehash() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let cache = Arc::new(FingerprintCache::in_memory());
    let walker = Walker::new(dir.path(), WalkerConfig::default());
    coordinator(&cache).run_once(walker.walk()).unwrap();

    // Same size, new content, new mtime
    let c = dir.path().join("c.txt");
    fs::write(&c, b"AAAAAAAAAA").unwrap();
    set_file_mtime(&c, FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let report = coordinator(&cache).run_once(walker.walk()).unwrap();
    assert_eq!(report.stats.files_hashed, 1);
    assert_eq!(report.stats.cache_hits, 4);

    let group = report.group_of(&c).expect("c.txt now duplicates a.txt");
    assert_eq!(group.paths.len(), 3);

    let record = cache.lookup(&c).unwrap().unwrap();
    assert_eq!(record.digest, blake3::hash(b"AAAAAAAAAA").to_hex().to_string());
}

#[test]
fn test_unchanged_mtime_trusts_cache() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stable.bin");
    fs::write(&path, b"original!!").unwrap();
    let mtime = FileTime::from_unix_time(1_500_000_000, 0);
    set_file_mtime(&path, mtime).unwrap();

    let cache = Arc::new(FingerprintCache::in_memory());
    coordinator(&cache).run_once_files(vec![path.clone()]).unwrap();
    let before = cache.lookup(&path).unwrap().unwrap().digest;

    // Same size and restored mtime: the cached digest is reused
    fs::write(&path, b"replaced!!").unwrap();
    set_file_mtime(&path, mtime).unwrap();
    let report = coordinator(&cache).run_once_files(vec![path.clone()]).unwrap();

    assert_eq!(report.stats.cache_hits, 1);
    assert_eq!(cache.lookup(&path).unwrap().unwrap().digest, before);
}

#[test]
fn test_cache_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    populate(&data);
    let db = dir.path().join("cache").join("fingerprints.db");
    let walker = Walker::new(&data, WalkerConfig::default());

    {
        let scanner = ScanCoordinator::open(CoordinatorConfig::default().with_min_size(0), &db).unwrap();
        let report = scanner.run_once(walker.walk()).unwrap();
        assert_eq!(report.stats.files_hashed, 5);
    }

    let scanner = ScanCoordinator::open(CoordinatorConfig::default().with_min_size(0), &db).unwrap();
    let report = scanner.run_once(walker.walk()).unwrap();
    assert_eq!(report.stats.files_hashed, 0);
    assert_eq!(report.stats.cache_hits, 5);
    assert_eq!(report.groups.len(), 2);
}

#[test]
fn test_sweep_removes_deleted_files() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let cache = Arc::new(FingerprintCache::in_memory());
    let walker = Walker::new(dir.path(), WalkerConfig::default());
    coordinator(&cache).run_once(walker.walk()).unwrap();
    assert_eq!(cache.len().unwrap(), 5);

    fs::remove_file(dir.path().join("b.txt")).unwrap();
    fs::remove_dir_all(dir.path().join("sub")).unwrap();

    let stats = cache.sweep_deleted().unwrap();
    assert_eq!(stats.checked, 5);
    assert_eq!(stats.removed, 3);
    assert_eq!(stats.failed, 0);

    let known: Vec<_> = cache.list_known_paths().unwrap().collect();
    assert_eq!(known.len(), 2);
}

#[test]
fn test_sweep_on_start_prunes_before_scan() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let cache = Arc::new(FingerprintCache::in_memory());
    let walker = Walker::new(dir.path(), WalkerConfig::default());
    coordinator(&cache).run_once(walker.walk()).unwrap();

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    let report = coordinator(&cache).run_once(walker.walk()).unwrap();

    assert_eq!(cache.len().unwrap(), 4);
    assert_eq!(report.groups.len(), 1);
}

#[test]
fn test_no_cache_hashes_every_time() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let walker = Walker::new(dir.path(), WalkerConfig::default());
    let scanner = ScanCoordinator::new(CoordinatorConfig::default().with_min_size(0), None);

    scanner.run_once(walker.walk()).unwrap();
    let second = scanner.run_once(walker.walk()).unwrap();

    assert_eq!(second.stats.files_hashed, 5);
    assert_eq!(scanner.fingerprinter().hashes_computed(), 10);
}
