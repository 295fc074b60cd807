//! Integration tests for CourseResolver
//!
//! Verifies course enumeration against the persisted course map, file
//! listing, authenticated downloads and course renames.

use std::path::PathBuf;

use lmsync_core::domain::{Course, CourseEntry, ProviderError, Settings};
use lmsync_core::ports::{ICourseProvider, ISettingsStore};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn settings(download_path: PathBuf, sync_new_courses: bool) -> Settings {
    Settings {
        download_path,
        sync_new_courses,
        ..Settings::default()
    }
}

#[tokio::test]
async fn test_new_courses_get_derived_names_and_are_persisted() {
    let (server, resolver, store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), false)).await;
    common::mount_site_info(&server).await;
    common::mount_function(
        &server,
        "core_enrol_get_users_courses",
        serde_json::json!([
            {"id": 1, "fullname": "054321 - ALGORITHMS AND PRINCIPLES (PROF. ROSSI)"},
            {"id": 2, "fullname": "054322 - PHYSICS (PROF. A)"},
            {"id": 3, "fullname": "054323 - PHYSICS (PROF. B)"},
            {"id": 4, "fullname": "Seminar"}
        ]),
    )
    .await;

    let courses = resolver
        .list_enrolled_courses()
        .await
        .expect("list_enrolled_courses failed");

    let names: Vec<_> = courses.iter().map(|c| c.local_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "ALGORITHMS AND PRINCIPLES",
            "054322 - PHYSICS (PROF. A)",
            "054323 - PHYSICS (PROF. B)",
            "Seminar"
        ]
    );
    assert!(courses.iter().all(|c| !c.should_sync));

    let persisted = store.courses().await.unwrap();
    assert_eq!(persisted.len(), 4);
    assert_eq!(persisted[&1].name, "ALGORITHMS AND PRINCIPLES");
}

#[tokio::test]
async fn test_persisted_entries_win_over_derived_names() {
    let (server, resolver, store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), true)).await;
    store
        .save_course(
            1,
            &CourseEntry {
                name: "Algo".into(),
                should_sync: false,
            },
        )
        .await
        .unwrap();
    common::mount_site_info(&server).await;
    common::mount_function(
        &server,
        "core_enrol_get_users_courses",
        serde_json::json!([{"id": 1, "fullname": "054321 - ALGORITHMS (PROF. ROSSI)"}]),
    )
    .await;

    let courses = resolver.list_enrolled_courses().await.unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0].local_name, "Algo");
    assert!(!courses[0].should_sync);
    assert_eq!(courses[0].full_name, "054321 - ALGORITHMS (PROF. ROSSI)");
}

#[tokio::test]
async fn test_course_listing_fails_fast_on_network_error() {
    let (server, resolver, _store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), true)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = resolver.list_enrolled_courses().await;
    assert!(matches!(result, Err(ProviderError::Network(_))));
}

fn invalid_token() -> serde_json::Value {
    serde_json::json!({
        "exception": "moodle_exception",
        "errorcode": "invalidtoken",
        "message": "Invalid token - token expired"
    })
}

#[tokio::test]
async fn test_rejected_token_is_an_error_not_an_empty_course_list() {
    let (server, resolver, store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), true)).await;
    common::mount_site_info(&server).await;
    common::mount_function(&server, "core_enrol_get_users_courses", invalid_token()).await;

    let result = resolver.list_enrolled_courses().await;
    assert_eq!(result, Err(ProviderError::ReauthenticationFailed));
    assert!(store.courses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_token_is_an_error_not_an_empty_file_list() {
    let (server, resolver, _store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), true)).await;
    common::mount_function(&server, "core_course_get_contents", invalid_token()).await;

    let course = Course::from_entry(
        7,
        "101 - Algorithms (AY24)",
        &CourseEntry {
            name: "Algorithms".into(),
            should_sync: true,
        },
    );
    let result = resolver.list_files(&course).await;
    assert_eq!(result, Err(ProviderError::ReauthenticationFailed));
    assert!(!resolver.client().is_logged_in());
}

#[tokio::test]
async fn test_list_files_and_download_with_token() {
    let (server, resolver, _store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), true)).await;
    common::mount_function(
        &server,
        "core_course_get_contents",
        serde_json::json!([{
            "id": 1,
            "name": "Materials",
            "modules": [{
                "id": 10,
                "name": "Lecture1",
                "modname": "folder",
                "contents": [common::file_item(&server, "slides.pdf", 11)]
            }]
        }]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/webservice/pluginfile.php/slides.pdf"))
        .and(query_param("token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let course = Course {
        id: 5,
        full_name: "054321 - ALGORITHMS (PROF. ROSSI)".into(),
        local_name: "Algorithms".into(),
        should_sync: true,
    };
    let files = resolver.list_files(&course).await.expect("list_files failed");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, PathBuf::from("Algorithms/Lecture1"));
    assert_eq!(files[0].filename, "slides.pdf");

    let mut stream = resolver
        .open_download(&files[0])
        .await
        .expect("open_download failed");
    assert_eq!(stream.content_length(), Some(11));
    let mut body = Vec::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        body.extend_from_slice(&chunk);
    }
    assert_eq!(body, b"hello world");
}

#[tokio::test]
async fn test_rename_course_moves_folder_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, resolver, store) =
        common::setup_resolver(settings(dir.path().to_path_buf(), true)).await;
    std::fs::create_dir(dir.path().join("Algorithms")).unwrap();
    std::fs::write(dir.path().join("Algorithms").join("a.pdf"), b"x").unwrap();
    store
        .save_course(
            1,
            &CourseEntry {
                name: "Algorithms".into(),
                should_sync: true,
            },
        )
        .await
        .unwrap();

    let entry = resolver
        .rename_course(1, "Algo: part 1")
        .await
        .expect("rename failed");
    assert_eq!(entry.name, "Algo_ part 1");
    assert!(dir.path().join("Algo_ part 1").join("a.pdf").exists());
    assert!(!dir.path().join("Algorithms").exists());
    assert_eq!(store.course(1).await.unwrap().unwrap().name, "Algo_ part 1");

    assert!(resolver.rename_course(1, "a/b").await.is_err());
    assert!(resolver.rename_course(1, "  ..  ").await.is_err());
    assert!(resolver.rename_course(99, "Other").await.is_err());
}

#[tokio::test]
async fn test_set_should_sync_updates_entry() {
    let (_server, resolver, store) =
        common::setup_resolver(settings(PathBuf::from("/unused"), true)).await;
    store
        .save_course(
            3,
            &CourseEntry {
                name: "Physics".into(),
                should_sync: true,
            },
        )
        .await
        .unwrap();

    let entry = resolver.set_should_sync(3, false).await.unwrap();
    assert!(!entry.should_sync);
    assert!(!store.course(3).await.unwrap().unwrap().should_sync);
}
