use dupecache::duplicates::{CoordinatorConfig, DuplicateReport, ScanCoordinator};
use dupecache::error::ExitCode;
use dupecache::output::{JsonOutput, TextOutput};
use dupecache::scanner::{Walker, WalkerConfig};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn scan(dir: &Path, exclude: &Path) -> DuplicateReport {
    let config = CoordinatorConfig::default()
        .with_min_size(0)
        .with_exclude(exclude);
    let walker = Walker::new(dir, WalkerConfig::default());
    ScanCoordinator::new(config, None).run_once(walker.walk()).unwrap()
}

#[test]
fn test_saved_report_matches_scan() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    let a = data.path().join("a.txt");
    let b = data.path().join("b.txt");
    let c = data.path().join("c.txt");
    let d = data.path().join("d.txt");
    fs::write(&a, b"AAAAAAAAAA").unwrap();
    fs::write(&b, b"AAAAAAAAAA").unwrap();
    fs::write(&c, b"xyz").unwrap();
    fs::write(&d, b"xyz").unwrap();

    let result = out.path().join("Result.txt");
    let report = scan(data.path(), &result);
    TextOutput::new(&report).save(&result).unwrap();

    let expected = format!(
        "Files:\nSize: 10 bytes (10 B)\nDigest: {}\n{}\n{}\nSize: 3 bytes (3 B)\nDigest: {}\n{}\n{}\n",
        hex(b"AAAAAAAAAA"),
        a.display(),
        b.display(),
        hex(b"xyz"),
        c.display(),
        d.display(),
    );
    assert_eq!(fs::read_to_string(&result).unwrap(), expected);
}

#[test]
fn test_report_inside_scanned_tree_is_not_listed() {
    let data = tempdir().unwrap();
    fs::write(data.path().join("one"), b"payload").unwrap();
    fs::write(data.path().join("two"), b"payload").unwrap();
    let result = data.path().join("Result.txt");

    let first = scan(data.path(), &result);
    TextOutput::new(&first).save(&result).unwrap();

    // A second scan walks over the report it just wrote
    let second = scan(data.path(), &result);
    assert_eq!(second.groups, first.groups);
    assert!(second.group_of(&result).is_none());
    assert_eq!(second.stats.files_skipped, 1);
}

#[test]
fn test_save_replaces_previous_report() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    let result = out.path().join("Result.txt");
    fs::write(&result, "stale contents from an older run\n").unwrap();

    let report = scan(data.path(), &result);
    TextOutput::new(&report).save(&result).unwrap();

    assert_eq!(fs::read_to_string(&result).unwrap(), "Files:\n");
    assert!(!out.path().join("Result.txt.tmp").exists());
}

#[test]
fn test_json_report_saved() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(data.path().join("x1"), b"same bytes").unwrap();
    fs::write(data.path().join("x2"), b"same bytes").unwrap();
    fs::write(data.path().join("x3"), b"same bytes").unwrap();

    let json_path = out.path().join("report.json");
    let report = scan(data.path(), &json_path);
    let exit_code = ExitCode::from_report(&report);
    assert_eq!(exit_code, ExitCode::Success);

    JsonOutput::new(&report, exit_code).save(&json_path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();

    let duplicates = value["duplicates"].as_array().unwrap();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0]["size"], 10);
    assert_eq!(duplicates[0]["digest"], hex(b"same bytes"));
    assert_eq!(duplicates[0]["files"].as_array().unwrap().len(), 3);
    assert_eq!(value["summary"]["files_scanned"], 3);
    assert_eq!(value["summary"]["wasted_space"], 20);
    assert_eq!(value["summary"]["exit_code"], 0);
    assert_eq!(value["summary"]["exit_code_name"], "DC000");
    assert!(value["errors"].as_array().unwrap().is_empty());
}

#[test]
fn test_json_reports_no_duplicates_code() {
    let data = tempdir().unwrap();
    fs::write(data.path().join("unique"), b"only one of these").unwrap();
    let out = tempdir().unwrap();

    let report = scan(data.path(), &out.path().join("unused"));
    let exit_code = ExitCode::from_report(&report);
    assert_eq!(exit_code, ExitCode::NoDuplicates);

    let mut buffer = Vec::new();
    JsonOutput::new(&report, exit_code)
        .write_to(&mut buffer, false)
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    assert_eq!(value["summary"]["exit_code"], 2);
    assert_eq!(value["summary"]["duplicate_groups"], 0);
}
