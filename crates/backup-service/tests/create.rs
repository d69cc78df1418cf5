#![allow(missing_docs)]

use std::fs;

use backup_service::BackupError;
use common::{read_tree, test_service, write_server};
use shared::{BackupId, BackupStatus, BackupType, Response, ServerId, test::init_test_logger};

mod common;

#[tokio::test]
async fn create_and_list() {
    init_test_logger();
    let service = test_service();
    write_server(&service.server("survival"));
    let server = ServerId::from("survival");

    let first = service
        .orchestrator
        .create(&server, "nightly", None, BackupType::Scheduled, |_| {})
        .await
        .unwrap();

    assert_eq!(first.id, BackupId(1));
    assert_eq!(first.status(), BackupStatus::Completed);
    assert_eq!(first.backup_type, BackupType::Scheduled);
    assert!(first.file_path.is_file());
    assert_eq!(
        first.file_size_bytes,
        fs::metadata(&first.file_path).unwrap().len()
    );

    let file_name = first.file_path.file_name().unwrap().to_string_lossy();
    assert!(file_name.starts_with("backup_survival_1_"), "{file_name}");
    assert!(file_name.ends_with(".tar.gz"), "{file_name}");

    let second = service
        .orchestrator
        .create(
            &server,
            "before update",
            Some("manual".to_string()),
            BackupType::Manual,
            |_| {},
        )
        .await
        .unwrap();
    assert_eq!(second.id, BackupId(2));
    assert_eq!(second.description.as_deref(), Some("manual"));

    let records = service.orchestrator.list(&server).unwrap();
    assert_eq!(records, vec![second, first]);

    assert!(service
        .orchestrator
        .list(&ServerId::from("creative"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn archive_matches_server() {
    init_test_logger();
    let service = test_service();
    write_server(&service.server("survival"));

    let record = service
        .orchestrator
        .create(
            &ServerId::from("survival"),
            "nightly",
            None,
            BackupType::Manual,
            |_| {},
        )
        .await
        .unwrap();

    let target = service.directory.path().join("inspect");
    archive_guard::SecureArchiveExtractor::new()
        .safe_extract(&record.file_path, &target, |_| {})
        .unwrap();

    assert_eq!(read_tree(&target), read_tree(&service.server("survival")));
}

#[tokio::test]
async fn unsafe_server_ids() {
    init_test_logger();
    let service = test_service();

    for server in ["../etc", "CON", "con", "..", "a b", ""] {
        let error = service
            .orchestrator
            .create(
                &ServerId::from(server),
                "nightly",
                None,
                BackupType::Manual,
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(error.is_security(), "{server}: {error:?}");
        assert_eq!(error.response(), Response::Rejected);
    }

    assert!(!service.config.backup_directory.exists());
}

#[tokio::test]
async fn missing_server() {
    init_test_logger();
    let service = test_service();

    let error = service
        .orchestrator
        .create(
            &ServerId::from("missing"),
            "nightly",
            None,
            BackupType::Manual,
            |_| {},
        )
        .await
        .unwrap_err();

    assert!(matches!(error, BackupError::ServerNotFound(_)), "{error:?}");
    assert_eq!(error.response().status_code(), 404);
    assert!(service
        .orchestrator
        .list(&ServerId::from("missing"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delete_backup() {
    init_test_logger();
    let service = test_service();
    write_server(&service.server("survival"));
    let server = ServerId::from("survival");

    let record = service
        .orchestrator
        .create(&server, "nightly", None, BackupType::Manual, |_| {})
        .await
        .unwrap();

    let deleted = service.orchestrator.delete(record.id).unwrap();
    assert_eq!(deleted, record);
    assert!(!record.file_path.exists());
    assert!(service.orchestrator.list(&server).unwrap().is_empty());

    let error = service.orchestrator.delete(record.id).unwrap_err();
    assert!(matches!(error, BackupError::BackupNotFound(_)), "{error:?}");
}

#[tokio::test]
async fn delete_with_missing_archive() {
    init_test_logger();
    let service = test_service();
    write_server(&service.server("survival"));
    let server = ServerId::from("survival");

    let record = service
        .orchestrator
        .create(&server, "nightly", None, BackupType::Manual, |_| {})
        .await
        .unwrap();
    fs::remove_file(&record.file_path).unwrap();

    service.orchestrator.delete(record.id).unwrap();
    assert!(service.orchestrator.list(&server).unwrap().is_empty());
}
