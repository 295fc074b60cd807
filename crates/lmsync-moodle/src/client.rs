//! Moodle web-service client
//!
//! Every remote procedure call goes through [`MoodleClient::call`], which
//! layers three policies over a form-encoded POST:
//!
//! 1. **Logged out** - no token means no request; the call resolves to `None`.
//! 2. **Invalid token** - the login collaborator is asked to re-authenticate
//!    once; on success the same call is repeated once with the new token.
//! 3. **Transport failure** - connectivity flips to disconnected. With
//!    `retry_on_network_error` the call is reattempted at a fixed interval
//!    until it goes through and resolves with that result; without it the
//!    error is returned.
//!
//! Connectivity is edge-triggered: observers receive one
//! [`ConnectivityEvent`] per transition, never repeats.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use lmsync_core::config::ApiConfig;
//! # use lmsync_core::ports::ILoginProvider;
//! use lmsync_moodle::client::MoodleClient;
//!
//! # async fn example(login: Arc<dyn ILoginProvider>) -> anyhow::Result<()> {
//! let client = MoodleClient::new(&ApiConfig::default(), login);
//! if let Some(info) = client.site_info(true).await? {
//!     println!("Hello, {}", info.full_name);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lmsync_core::config::ApiConfig;
use lmsync_core::domain::ConnectivityEvent;
use lmsync_core::ports::ILoginProvider;
use lmsync_core::sanitize::generate_uid;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ApiError;

/// Path of the REST web-service endpoint, relative to the base URL
const REST_PATH: &str = "/webservice/rest/server.php";

/// `errorcode` the platform answers with when the token is rejected
const INVALID_TOKEN: &str = "invalidtoken";

/// Capacity of the connectivity broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Response types
// ============================================================================

/// Identity of the logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub user_id: u64,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
struct SiteInfoResponse {
    userid: u64,
    #[serde(default)]
    fullname: String,
}

/// Outcome of a single POST that reached the server
enum Reply {
    Data(Value),
    InvalidToken,
}

// ============================================================================
// MoodleClient
// ============================================================================

/// HTTP client for the Moodle REST web service
///
/// Reads the token from the login collaborator on every request and never
/// stores it.
pub struct MoodleClient {
    http: Client,
    base_url: String,
    login: Arc<dyn ILoginProvider>,
    lang: String,
    request_timeout: Duration,
    retry_interval: Duration,
    connected: AtomicBool,
    connectivity: broadcast::Sender<ConnectivityEvent>,
}

impl MoodleClient {
    /// Creates a client from the `api` section of the configuration
    pub fn new(config: &ApiConfig, login: Arc<dyn ILoginProvider>) -> Self {
        Self::with_base_url(&config.base_url, login)
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs))
            .with_retry_interval(Duration::from_secs(config.retry_interval_secs))
            .with_lang(&config.lang)
    }

    /// Creates a client with default timings against a custom base URL
    /// (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>, login: Arc<dyn ILoginProvider>) -> Self {
        let defaults = ApiConfig::default();
        let (connectivity, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            login,
            lang: defaults.lang,
            request_timeout: Duration::from_secs(defaults.request_timeout_secs),
            retry_interval: Duration::from_secs(defaults.retry_interval_secs),
            connected: AtomicBool::new(true),
            connectivity,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, REST_PATH)
    }

    /// Returns true while the login collaborator holds a token
    pub fn is_logged_in(&self) -> bool {
        self.login.is_logged_in()
    }

    /// Last observed connectivity; starts as connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribes to connectivity transitions
    pub fn subscribe_connectivity(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.connectivity.subscribe()
    }

    fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            let event = if connected {
                info!("Connection to the platform restored");
                ConnectivityEvent::Connected
            } else {
                warn!("Connection to the platform lost");
                ConnectivityEvent::Disconnected
            };
            // No receivers is fine
            let _ = self.connectivity.send(event);
        }
    }

    // ========================================================================
    // call
    // ========================================================================

    /// Calls a web-service function
    ///
    /// Returns `Ok(None)` when logged out or when re-authentication did not
    /// produce an accepted token. With `retry_on_network_error` a transport
    /// failure is never returned: the call is reattempted every retry
    /// interval until one attempt gets through.
    pub async fn call(
        &self,
        function: &str,
        params: &[(&str, String)],
        retry_on_network_error: bool,
    ) -> Result<Option<Value>, ApiError> {
        let call_id = generate_uid();
        debug!(call_id = %call_id, function, ?params, "API call");

        match self.attempt(function, params, &call_id).await {
            Err(ApiError::Network(e)) if retry_on_network_error => {
                debug!(call_id = %call_id, error = %e, "Network error, retrying until connected");
                loop {
                    tokio::time::sleep(self.retry_interval).await;
                    debug!(call_id = %call_id, function, "Retrying API call");
                    match self.attempt(function, params, &call_id).await {
                        Err(ApiError::Network(e)) => {
                            debug!(call_id = %call_id, error = %e, "Retry failed");
                        }
                        other => {
                            debug!(call_id = %call_id, "Retry successful");
                            return other;
                        }
                    }
                }
            }
            Err(ApiError::Network(e)) => {
                debug!(call_id = %call_id, error = %e, "Network error, not retrying");
                Err(ApiError::Network(e))
            }
            other => other,
        }
    }

    /// One logical attempt: a request plus at most one re-authenticated repeat
    async fn attempt(
        &self,
        function: &str,
        params: &[(&str, String)],
        call_id: &str,
    ) -> Result<Option<Value>, ApiError> {
        let Some(token) = self.login.current_token() else {
            debug!(call_id, "Aborting call: logged out");
            return Ok(None);
        };

        match self.post(function, params, &token).await? {
            Reply::Data(value) => {
                debug!(call_id, "API call success");
                Ok(Some(value))
            }
            Reply::InvalidToken => {
                info!(call_id, function, "Invalid token, requesting re-authentication");
                if !self.login.prompt_reauthentication().await {
                    info!(call_id, "Re-authentication abandoned");
                    return Ok(None);
                }
                let Some(token) = self.login.current_token() else {
                    return Ok(None);
                };
                match self.post(function, params, &token).await? {
                    Reply::Data(value) => {
                        debug!(call_id, "API call success after re-authentication");
                        Ok(Some(value))
                    }
                    Reply::InvalidToken => {
                        warn!(call_id, "Token rejected again after re-authentication");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Sends one form-encoded POST
    async fn post(
        &self,
        function: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<Reply, ApiError> {
        let mut form: Vec<(&str, String)> = vec![
            ("wstoken", token.to_string()),
            ("wsfunction", function.to_string()),
            ("moodlewsrestformat", "json".to_string()),
            ("moodlewssettingfilter", "true".to_string()),
            ("moodlewssettinglang", self.lang.clone()),
        ];
        form.extend(params.iter().map(|(key, value)| (*key, value.clone())));

        let sent = self
            .http
            .post(self.endpoint())
            .timeout(self.request_timeout)
            .form(&form)
            .send()
            .await
            .and_then(Response::error_for_status);

        let body = match sent {
            Ok(response) => response.text().await,
            Err(e) => Err(e),
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                self.set_connected(false);
                return Err(ApiError::Network(e));
            }
        };

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("{function}: {e}")))?;

        if let Some(code) = value.get("errorcode").and_then(Value::as_str) {
            if code == INVALID_TOKEN {
                return Ok(Reply::InvalidToken);
            }
            if value.get("exception").is_some() {
                self.set_connected(true);
                return Err(ApiError::Remote {
                    code: code.to_string(),
                    message: value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }

        self.set_connected(true);
        Ok(Reply::Data(value))
    }

    // ========================================================================
    // Typed helpers
    // ========================================================================

    /// Fetches the logged-in user's id and full name
    pub async fn site_info(
        &self,
        retry_on_network_error: bool,
    ) -> Result<Option<SiteInfo>, ApiError> {
        let Some(value) = self
            .call("core_webservice_get_site_info", &[], retry_on_network_error)
            .await?
        else {
            return Ok(None);
        };
        let info: SiteInfoResponse = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("site info: {e}")))?;
        Ok(Some(SiteInfo {
            user_id: info.userid,
            full_name: info.fullname,
        }))
    }

    /// Opens an authenticated streaming GET on a file URL
    ///
    /// The token travels as the `token` query parameter. No timeout applies;
    /// large files are expected.
    pub async fn open_download(&self, url: &str) -> Result<Response, ApiError> {
        let token = self
            .login
            .current_token()
            .ok_or(ApiError::NotAuthenticated)?;

        let response = self
            .http
            .get(url)
            .query(&[("token", token.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }
}
