use dupecache::duplicates::{CoordinatorConfig, DuplicateReport, ScanCoordinator};
use dupecache::scanner::{Walker, WalkerConfig};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn scan(dir: &Path, config: WalkerConfig) -> DuplicateReport {
    let coordinator = ScanCoordinator::new(CoordinatorConfig::default().with_min_size(0), None);
    coordinator.run_once(Walker::new(dir, config).walk()).unwrap()
}

fn write(path: &Path, content: &[u8]) {
    File::create(path).unwrap().write_all(content).unwrap();
}

#[test]
fn test_paths_with_quotes() {
    let dir = tempdir().unwrap();

    // Windows does not allow double quotes in filenames.
    if cfg!(not(windows)) {
        write(&dir.path().join("file_with_\"quote\".txt"), b"content");
        write(&dir.path().join("duplicate.txt"), b"content");

        let report = scan(dir.path(), WalkerConfig::default());
        assert_eq!(report.groups.len(), 1);
        assert!(report.groups[0]
            .paths
            .iter()
            .any(|p| p.to_string_lossy().contains('"')));
    }
}

#[test]
fn test_paths_with_newlines() {
    let dir = tempdir().unwrap();

    // Windows does not allow newlines in filenames.
    if cfg!(not(windows)) {
        write(&dir.path().join("file_with\nnewline.txt"), b"content");
        write(&dir.path().join("duplicate.txt"), b"content");

        let report = scan(dir.path(), WalkerConfig::default());
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].paths.len(), 2);
    }
}

#[test]
fn test_unicode_and_spaces() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("résumé final.pdf"), b"same document");
    write(&dir.path().join("日本語 コピー.pdf"), b"same document");

    let report = scan(dir.path(), WalkerConfig::default());
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].paths.len(), 2);
    assert!(report.stats.errors.is_empty());
}

#[test]
fn test_extremely_long_paths() {
    let dir = tempdir().unwrap();

    let mut current_path = dir.path().to_path_buf();
    let folder_name = "a".repeat(50);

    // 6 levels of 50-char folders = 300+ chars
    for i in 0..6 {
        current_path = current_path.join(format!("{}_{}", i, folder_name));
        if let Err(e) = fs::create_dir(&current_path) {
            eprintln!("Skipping extremely long path test: failed to create dir: {}", e);
            return;
        }
    }

    let file_path = current_path.join("file.txt");
    if let Err(e) = File::create(&file_path).and_then(|mut f| f.write_all(b"content")) {
        eprintln!("Skipping extremely long path test: failed to create file: {}", e);
        return;
    }
    write(&dir.path().join("duplicate.txt"), b"content");

    let report = scan(dir.path(), WalkerConfig::default());
    assert_eq!(report.groups.len(), 1);
    assert!(report.group_of(&file_path).is_some());
}

#[test]
fn test_empty_files_group_when_threshold_is_zero() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("empty1"), b"");
    write(&dir.path().join("empty2"), b"");

    let report = scan(dir.path(), WalkerConfig::default());
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].size, 0);
    assert_eq!(report.groups[0].digest, blake3::hash(b"").to_hex().to_string());
}

#[test]
fn test_hidden_files_can_be_skipped() {
    let dir = tempdir().unwrap();
    write(&dir.path().join(".hidden"), b"dotfile content");
    write(&dir.path().join("visible"), b"dotfile content");

    assert_eq!(scan(dir.path(), WalkerConfig::default()).groups.len(), 1);

    let report = scan(dir.path(), WalkerConfig::new(false, true));
    assert!(report.groups.is_empty());
    assert_eq!(report.stats.files_found, 1);
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_followed_by_default() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write(&a, b"linked content");
    write(&b, b"linked content");
    std::os::unix::fs::symlink(&a, dir.path().join("link_to_a")).unwrap();

    let report = scan(dir.path(), WalkerConfig::default());
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].paths, vec![a, b]);
}

#[test]
fn test_single_file_root() {
    let dir = tempdir().unwrap();
    let only = dir.path().join("only.bin");
    write(&only, b"just me");

    let report = scan(&only, WalkerConfig::default());
    assert_eq!(report.stats.files_found, 1);
    assert!(report.groups.is_empty());
}
