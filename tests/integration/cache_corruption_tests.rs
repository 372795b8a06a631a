use dupecache::cache::{CacheErrorKind, FingerprintCache};
use dupecache::duplicates::{CoordinatorConfig, ScanCoordinator};
use dupecache::scanner::ScanError;
use rusqlite::{params, Connection};
use std::fs;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_open_garbage_database_fails() {
    let temp_file = NamedTempFile::new().unwrap();
    fs::write(temp_file.path(), b"this is not an sqlite database, not even close").unwrap();

    let res = FingerprintCache::open(temp_file.path());
    assert!(res.is_err());
}

#[test]
fn test_coordinator_reports_unavailable_cache() {
    let temp_file = NamedTempFile::new().unwrap();
    fs::write(temp_file.path(), b"corrupted garbage corrupted garbage").unwrap();

    let res = ScanCoordinator::open(CoordinatorConfig::default(), temp_file.path());
    assert!(matches!(res, Err(ScanError::CacheUnavailable(_))));
}

#[test]
fn test_recovery_after_deleting_corrupt_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    fs::write(&path, b"corrupted garbage corrupted garbage").unwrap();
    assert!(FingerprintCache::open(&path).is_err());

    fs::remove_file(&path).unwrap();
    let cache = FingerprintCache::open(&path).expect("fresh database after removing corrupt file");
    assert!(cache.is_empty().unwrap());
}

#[test]
fn test_corrupt_row_is_a_miss_and_gets_overwritten() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("fingerprints.db");
    let file = dir.path().join("data.bin");
    fs::write(&file, b"some file content").unwrap();

    // Create the schema, then damage the row behind the cache's back
    {
        let cache = FingerprintCache::open(&db).unwrap();
        cache
            .store(&file, 17, std::time::SystemTime::now(), &"ab".repeat(32))
            .unwrap();
    }
    {
        let conn = Connection::open(&db).unwrap();
        let updated = conn
            .execute(
                "UPDATE fingerprints SET size = ?1, digest = ?2",
                params![-5_i64, "not hex"],
            )
            .unwrap();
        assert_eq!(updated, 1);
    }

    let cache = Arc::new(FingerprintCache::open(&db).unwrap());
    let err = cache.lookup(&file).unwrap_err();
    assert_eq!(err.kind(), CacheErrorKind::CorruptRecord);

    let scanner = ScanCoordinator::new(
        CoordinatorConfig::default().with_min_size(0),
        Some(Arc::clone(&cache)),
    );
    let report = scanner.run_once_files(vec![file.clone()]).unwrap();
    assert_eq!(report.stats.files_hashed, 1);
    assert!(report.stats.errors.is_empty());

    let record = cache.lookup(&file).unwrap().unwrap();
    assert_eq!(record.size, 17);
    assert_eq!(record.digest, blake3::hash(b"some file content").to_hex().to_string());
}

#[test]
fn test_sweep_skips_nothing_on_empty_cache() {
    let dir = tempdir().unwrap();
    let cache = FingerprintCache::open(&dir.path().join("c.db")).unwrap();
    let stats = cache.sweep_deleted().unwrap();
    assert_eq!(stats.checked, 0);
    assert_eq!(stats.removed, 0);
}

#[test]
fn test_sweep_removes_corrupt_rows() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("fingerprints.db");
    let good = dir.path().join("good.bin");
    let bad = dir.path().join("bad.bin");
    fs::write(&good, b"good content").unwrap();
    fs::write(&bad, b"bad content").unwrap();

    {
        let cache = FingerprintCache::open(&db).unwrap();
        let now = std::time::SystemTime::now();
        cache.store(&good, 12, now, &"ab".repeat(32)).unwrap();
        cache.store(&bad, 11, now, &"cd".repeat(32)).unwrap();
    }
    {
        let conn = Connection::open(&db).unwrap();
        let updated = conn
            .execute(
                "UPDATE fingerprints SET digest = ?1 WHERE size = ?2",
                params!["not hex", 11_i64],
            )
            .unwrap();
        assert_eq!(updated, 1);
    }

    let cache = FingerprintCache::open(&db).unwrap();
    assert_eq!(cache.len().unwrap(), 2);
    // The scan skips the bad row, so only one path is visible
    assert_eq!(cache.list_known_paths().unwrap().count(), 1);

    let stats = cache.sweep_deleted().unwrap();
    assert_eq!(stats.corrupt, 1);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.checked, 1);
    assert_eq!(cache.len().unwrap(), 1);
    assert!(cache.lookup(&bad).unwrap().is_none());
    assert!(cache.lookup(&good).unwrap().is_some());
}
