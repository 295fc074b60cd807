//! Shared test helpers for Moodle web-service integration tests
//!
//! Each helper mounts the endpoints a test needs and returns a client or a
//! resolver pointing at the mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lmsync_core::domain::Settings;
use lmsync_core::ports::ILoginProvider;
use lmsync_moodle::client::MoodleClient;
use lmsync_moodle::resolver::CourseResolver;
use lmsync_store::MemoryStore;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REST_PATH: &str = "/webservice/rest/server.php";

/// Login collaborator with a scripted re-authentication result
pub struct TestLogin {
    token: Mutex<Option<String>>,
    refreshed_token: Option<String>,
    reauth_count: AtomicUsize,
}

impl TestLogin {
    pub fn new(token: Option<&str>, refreshed_token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(token.map(str::to_string)),
            refreshed_token: refreshed_token.map(str::to_string),
            reauth_count: AtomicUsize::new(0),
        }
    }

    pub fn logged_in() -> Self {
        Self::new(Some("test-token"), None)
    }

    pub fn reauth_count(&self) -> usize {
        self.reauth_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ILoginProvider for TestLogin {
    fn is_logged_in(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    fn current_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn prompt_reauthentication(&self) -> bool {
        self.reauth_count.fetch_add(1, Ordering::SeqCst);
        match &self.refreshed_token {
            Some(token) => {
                *self.token.lock().unwrap() = Some(token.clone());
                true
            }
            None => {
                *self.token.lock().unwrap() = None;
                false
            }
        }
    }
}

/// Starts a server and a client with a short retry interval
pub async fn setup_client(login: Arc<TestLogin>) -> (MockServer, MoodleClient) {
    let server = MockServer::start().await;
    let client = MoodleClient::with_base_url(server.uri(), login)
        .with_retry_interval(Duration::from_millis(10))
        .with_request_timeout(Duration::from_secs(2));
    (server, client)
}

/// Starts a server and a resolver backed by an in-memory store
pub async fn setup_resolver(
    settings: Settings,
) -> (MockServer, Arc<CourseResolver>, Arc<MemoryStore>) {
    let (server, client) = setup_client(Arc::new(TestLogin::logged_in())).await;
    let store = Arc::new(MemoryStore::new(settings));
    let resolver = Arc::new(CourseResolver::new(Arc::new(client), store.clone()));
    (server, resolver, store)
}

/// Mounts a web-service function answering with `body`
pub async fn mount_function(server: &MockServer, function: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(REST_PATH))
        .and(body_string_contains(format!("wsfunction={function}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts `core_webservice_get_site_info` for user 42
pub async fn mount_site_info(server: &MockServer) {
    mount_function(
        server,
        "core_webservice_get_site_info",
        serde_json::json!({"userid": 42, "fullname": "Ada Lovelace", "sitename": "WeBeep"}),
    )
    .await;
}

/// A `file` content item served by `server`
pub fn file_item(server: &MockServer, name: &str, size: u64) -> serde_json::Value {
    serde_json::json!({
        "type": "file",
        "filename": name,
        "filepath": "/",
        "filesize": size,
        "fileurl": format!("{}/webservice/pluginfile.php/{name}", server.uri()),
        "timecreated": 1_700_000_000,
        "timemodified": 1_700_000_500
    })
}
