#![allow(missing_docs)]

use std::fs;

use archive_guard::{ExtractError, SecureArchiveExtractor, SecurityError, test::TarFixture};
use common::{is_empty_directory, read_tree};
use shared::test::init_test_logger;

mod common;

fn rejected(result: Result<impl core::fmt::Debug, ExtractError>) -> SecurityError {
    match result {
        Err(ExtractError::Security(error)) => error,
        other => panic!("expected a security error, got {other:?}"),
    }
}

#[test]
fn traversal_member_writes_nothing() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let target = directory.path().join("restore");

    TarFixture::new()
        .file("../../../etc/passwd", b"root:x:0:0")
        .write_tar_gz(&archive)
        .unwrap();

    let extractor = SecureArchiveExtractor::new();
    let error = rejected(extractor.safe_extract(&archive, &target, |_| {}));

    assert!(matches!(error, SecurityError::PathTraversal(_)));
    assert!(is_empty_directory(&target));
    assert!(!directory.path().join("etc").exists());
}

#[test]
fn hostile_member_after_safe_members() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar");
    let target = directory.path().join("restore");

    TarFixture::new()
        .file("safe_file.txt", b"safe content")
        .directory("world/")
        .file("world/level.dat", b"level")
        .file("normal/../../escape.txt", b"escaped")
        .write_tar(&archive)
        .unwrap();

    let extractor = SecureArchiveExtractor::new();
    let error = rejected(extractor.safe_extract(&archive, &target, |_| {}));

    assert!(matches!(error, SecurityError::PathTraversal(_)));
    // The scan rejects the archive before the first member is written.
    assert!(is_empty_directory(&target));
    assert!(!directory.path().join("escape.txt").exists());
}

#[test]
fn hostile_members_are_rejected() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let extractor = SecureArchiveExtractor::new();

    let cases = [
        (
            TarFixture::new().file("..\\..\\windows\\system32\\config", b"x"),
            "backslash traversal",
        ),
        (TarFixture::new().file("/etc/passwd", b"x"), "absolute"),
        (
            TarFixture::new().file("world/../../../../tmp/x", b"x"),
            "nested traversal",
        ),
    ];

    for (fixture, case) in cases {
        fixture.write_tar_gz(&archive).unwrap();
        let error = rejected(extractor.validate_archive_safety(&archive));
        assert!(
            matches!(error, SecurityError::PathTraversal(_)),
            "{case}: {error:?}"
        );
    }

    TarFixture::new()
        .symlink("link", "/etc/passwd")
        .write_tar_gz(&archive)
        .unwrap();
    let error = rejected(extractor.validate_archive_safety(&archive));
    assert!(matches!(error, SecurityError::SymbolicLink(_)));

    TarFixture::new()
        .hard_link("link", "/etc/shadow")
        .write_tar_gz(&archive)
        .unwrap();
    let error = rejected(extractor.validate_archive_safety(&archive));
    assert!(matches!(error, SecurityError::SymbolicLink(_)));

    TarFixture::new()
        .char_device("dev/null")
        .write_tar_gz(&archive)
        .unwrap();
    let error = rejected(extractor.validate_archive_safety(&archive));
    assert!(matches!(error, SecurityError::DeviceFile(_)));

    TarFixture::new()
        .fifo("pipe")
        .write_tar_gz(&archive)
        .unwrap();
    let error = rejected(extractor.validate_archive_safety(&archive));
    assert!(matches!(error, SecurityError::DeviceFile(_)));
}

#[test]
fn safe_archive_extracts() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let target = directory.path().join("restore");

    TarFixture::new()
        .file("safe_file.txt", b"safe content")
        .write_tar_gz(&archive)
        .unwrap();

    let extractor = SecureArchiveExtractor::new();
    let totals = extractor.validate_archive_safety(&archive).unwrap();
    assert_eq!(totals.total_files, 1);
    assert_eq!(totals.total_bytes, 12);

    let budget = extractor.safe_extract(&archive, &target, |_| {}).unwrap();
    assert_eq!(budget.files_processed, 1);
    assert_eq!(budget.bytes_processed, 12);

    let contents = fs::read_to_string(target.join("safe_file.txt")).unwrap();
    assert_eq!(contents, "safe content");
}

#[test]
fn unwritable_member_is_skipped() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let target = directory.path().join("restore");

    TarFixture::new()
        .file("server.properties", b"motd=hello")
        .file("world/level.dat", b"level")
        .file("world/region/r.0.0.mca", b"region")
        .write_tar_gz(&archive)
        .unwrap();

    // A directory already sits where `world/level.dat` goes.
    fs::create_dir_all(target.join("world/level.dat/keep")).unwrap();

    let budget = SecureArchiveExtractor::new()
        .safe_extract(&archive, &target, |_| {})
        .unwrap();
    assert_eq!(budget.files_processed, 3);

    assert_eq!(
        fs::read_to_string(target.join("server.properties")).unwrap(),
        "motd=hello"
    );
    assert_eq!(
        fs::read_to_string(target.join("world/region/r.0.0.mca")).unwrap(),
        "region"
    );
    assert!(target.join("world/level.dat/keep").is_dir());
}

#[cfg(unix)]
#[test]
fn read_only_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let target = directory.path().join("restore");

    TarFixture::new()
        .file("config/locked.yml", b"locked")
        .file("server.properties", b"motd=hello")
        .write_tar_gz(&archive)
        .unwrap();

    let locked = target.join("config");
    fs::create_dir_all(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    // Permissions do not apply to root.
    if fs::write(locked.join("check"), b"").is_ok() {
        return;
    }

    let result = SecureArchiveExtractor::new().safe_extract(&archive, &target, |_| {});
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(result.unwrap().files_processed, 2);
    assert!(!locked.join("locked.yml").exists());
    assert_eq!(
        fs::read_to_string(target.join("server.properties")).unwrap(),
        "motd=hello"
    );
}

#[test]
fn plain_and_gzipped_archives() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let extractor = SecureArchiveExtractor::new();

    let fixture = TarFixture::new()
        .directory("world/")
        .file("world/level.dat", b"level")
        .file("world/region/r.0.0.mca", &[7u8; 2000])
        .file("server.properties", b"motd=hello");

    let plain = directory.path().join("plain.tar");
    let gzipped = directory.path().join("gzipped.tgz");
    fixture.clone().write_tar(&plain).unwrap();
    fixture.write_tar_gz(&gzipped).unwrap();

    let plain_target = directory.path().join("plain");
    let gzipped_target = directory.path().join("gzipped");
    extractor
        .safe_extract(&plain, &plain_target, |_| {})
        .unwrap();
    extractor
        .safe_extract(&gzipped, &gzipped_target, |_| {})
        .unwrap();

    let files = read_tree(&plain_target);
    assert_eq!(files.len(), 3);
    assert_eq!(files["world/level.dat"], b"level");
    assert_eq!(files["world/region/r.0.0.mca"], vec![7u8; 2000]);
    assert_eq!(files["server.properties"], b"motd=hello");
    assert_eq!(files, read_tree(&gzipped_target));
}

#[cfg(unix)]
#[test]
fn symlink_inside_target_is_not_followed() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let target = directory.path().join("restore");

    fs::create_dir_all(&target).unwrap();
    std::os::unix::fs::symlink(outside.path(), target.join("plugins")).unwrap();

    TarFixture::new()
        .file("plugins/evil.jar", b"payload")
        .write_tar_gz(&archive)
        .unwrap();

    let extractor = SecureArchiveExtractor::new();
    let error = rejected(extractor.safe_extract(&archive, &target, |_| {}));

    assert!(matches!(error, SecurityError::PathTraversal(_)));
    assert!(is_empty_directory(outside.path()));
}

#[test]
fn progress_is_reported() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar.gz");
    let target = directory.path().join("restore");

    let mut fixture = TarFixture::new();
    for index in 0..250 {
        fixture = fixture.file(&format!("files/{index}.txt"), b"data");
    }
    fixture.write_tar_gz(&archive).unwrap();

    let mut reports = Vec::new();
    let extractor = SecureArchiveExtractor::new();
    extractor
        .safe_extract(&archive, &target, |budget| {
            reports.push(budget.files_processed);
        })
        .unwrap();

    assert_eq!(reports, vec![100, 200]);
    assert_eq!(read_tree(&target).len(), 250);
}

#[test]
fn corrupt_archive_is_a_read_error() {
    init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let archive = directory.path().join("upload.tar");
    fs::write(&archive, "x".repeat(2048)).unwrap();

    let result = SecureArchiveExtractor::new().validate_archive_safety(&archive);
    assert!(matches!(result, Err(ExtractError::ReadArchive(_))), "{result:?}");
}
