//! Integration tests for MoodleClient::call policies
//!
//! Covers network retry, connectivity transitions, invalid-token
//! re-authentication and remote exceptions.

use std::sync::Arc;

use lmsync_core::domain::ConnectivityEvent;
use lmsync_moodle::ApiError;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, TestLogin, REST_PATH};

#[tokio::test]
async fn test_call_sends_standard_form_fields() {
    let (server, client) = common::setup_client(Arc::new(TestLogin::logged_in())).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .and(body_string_contains("wstoken=test-token"))
        .and(body_string_contains("wsfunction=core_course_get_contents"))
        .and(body_string_contains("moodlewsrestformat=json"))
        .and(body_string_contains("moodlewssettingfilter=true"))
        .and(body_string_contains("moodlewssettinglang=en"))
        .and(body_string_contains("courseid=7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let value = client
        .call("core_course_get_contents", &[("courseid", "7".to_string())], false)
        .await
        .expect("call failed");
    assert_eq!(value, Some(serde_json::json!([])));
}

#[tokio::test]
async fn test_network_failure_with_retry_resolves_after_recovery() {
    let (server, client) = common::setup_client(Arc::new(TestLogin::logged_in())).await;
    let mut connectivity = client.subscribe_connectivity();

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    common::mount_site_info(&server).await;

    let info = client
        .site_info(true)
        .await
        .expect("retrying call must not fail")
        .expect("logged in");
    assert_eq!(info.user_id, 42);
    assert_eq!(info.full_name, "Ada Lovelace");

    assert_eq!(connectivity.try_recv().unwrap(), ConnectivityEvent::Disconnected);
    assert_eq!(connectivity.try_recv().unwrap(), ConnectivityEvent::Connected);
    assert!(connectivity.try_recv().is_err());
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_network_failure_without_retry_returns_error() {
    let (server, client) = common::setup_client(Arc::new(TestLogin::logged_in())).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.call("core_webservice_get_site_info", &[], false).await;
    assert!(matches!(result, Err(ApiError::Network(_))));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_invalid_token_triggers_single_reauth_and_retry() {
    let login = Arc::new(TestLogin::new(Some("old-token"), Some("new-token")));
    let (server, client) = common::setup_client(login.clone()).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .and(body_string_contains("wstoken=old-token"))
        .and(body_string_contains("wsfunction=core_course_get_contents"))
        .and(body_string_contains("courseid=7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "exception": "moodle_exception",
            "errorcode": "invalidtoken",
            "message": "Invalid token - token not found"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .and(body_string_contains("wstoken=new-token"))
        .and(body_string_contains("wsfunction=core_course_get_contents"))
        .and(body_string_contains("courseid=7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let value = client
        .call("core_course_get_contents", &[("courseid", "7".to_string())], false)
        .await
        .expect("call failed");
    assert_eq!(value, Some(serde_json::json!([])));
    assert_eq!(login.reauth_count(), 1);
}

#[tokio::test]
async fn test_token_rejected_twice_resolves_to_none() {
    let login = Arc::new(TestLogin::new(Some("old-token"), Some("still-bad")));
    let (server, client) = common::setup_client(login.clone()).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "exception": "moodle_exception",
            "errorcode": "invalidtoken",
            "message": "Invalid token"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let value = client
        .call("core_webservice_get_site_info", &[], true)
        .await
        .expect("call failed");
    assert!(value.is_none());
    assert_eq!(login.reauth_count(), 1);
}

#[tokio::test]
async fn test_abandoned_reauth_resolves_to_none() {
    let login = Arc::new(TestLogin::new(Some("old-token"), None));
    let (server, client) = common::setup_client(login.clone()).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "exception": "moodle_exception",
            "errorcode": "invalidtoken",
            "message": "Invalid token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client
        .call("core_webservice_get_site_info", &[], false)
        .await
        .expect("call failed");
    assert!(value.is_none());
    assert!(!client.is_logged_in());
}

#[tokio::test]
async fn test_remote_exception_is_returned_as_remote_error() {
    let (server, client) = common::setup_client(Arc::new(TestLogin::logged_in())).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "exception": "required_capability_exception",
            "errorcode": "nopermissions",
            "message": "Sorry, but you do not currently have permissions to do that"
        })))
        .mount(&server)
        .await;

    match client.call("core_course_get_contents", &[], true).await {
        Err(ApiError::Remote { code, message }) => {
            assert_eq!(code, "nopermissions");
            assert!(message.starts_with("Sorry"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (server, client) = common::setup_client(Arc::new(TestLogin::logged_in())).await;

    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.call("core_webservice_get_site_info", &[], true).await;
    assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
}
