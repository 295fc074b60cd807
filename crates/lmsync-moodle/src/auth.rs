//! Login collaborator for the Moodle platform
//!
//! The platform hands tokens to mobile apps through a launch handshake: the
//! browser opens [`launch_url`], the user logs in, and the platform redirects
//! to `moodlemobile://token=<base64>`. [`decode_launch_token`] extracts the
//! web-service token from that redirect.
//!
//! ## Components
//!
//! - [`KeyringCredentialStore`] - token storage in the system keyring
//! - [`LoginManager`] - owns the token, emits [`LoginEvent`]s and runs
//!   re-authentication through an [`IReauthPrompt`]
//! - [`decode_launch_token`] / [`launch_url`] - the launch handshake

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use lmsync_core::config::CredentialsConfig;
use lmsync_core::domain::LoginEvent;
use lmsync_core::ports::{ICredentialStore, ILoginProvider, IReauthPrompt};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Path of the mobile-launch page, relative to the base URL
const LAUNCH_PATH: &str = "/admin/tool/mobile/launch.php";

/// Service name the platform expects for mobile tokens
const MOBILE_SERVICE: &str = "moodle_mobile_app";

/// Separator between the fields of the decoded launch payload
const PAYLOAD_SEPARATOR: &str = ":::";

const EVENT_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// KeyringCredentialStore
// ============================================================================

/// Stores the platform token in the system keyring
///
/// Uses the `keyring` crate (GNOME Keyring, KDE Wallet, macOS Keychain);
/// encryption at rest is the keyring's job.
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self::new(&config.service, &config.account)
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account).context("Failed to create keyring entry")
    }
}

impl ICredentialStore for KeyringCredentialStore {
    fn get(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => {
                debug!(account = %self.account, "Loaded token from keyring");
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account = %self.account, "No token found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keyring")?;
        debug!(account = %self.account, "Stored token in keyring");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(account = %self.account, "Cleared token from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// LoginManager
// ============================================================================

/// Owns the platform token
///
/// The token is loaded from the credential store at construction and
/// written back on every change. Concurrent re-authentication requests are
/// serialized; a request that finds the token already replaced by another
/// one returns immediately.
pub struct LoginManager {
    credentials: Arc<dyn ICredentialStore>,
    prompt: Arc<dyn IReauthPrompt>,
    token: RwLock<Option<String>>,
    events: broadcast::Sender<LoginEvent>,
    reauth: Mutex<()>,
}

impl LoginManager {
    /// Creates the manager and loads any stored token
    pub fn new(
        credentials: Arc<dyn ICredentialStore>,
        prompt: Arc<dyn IReauthPrompt>,
    ) -> Result<Self> {
        let token = credentials.get().context("Failed to load stored token")?;
        if token.is_some() {
            info!("Previous token found");
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            credentials,
            prompt,
            token: RwLock::new(token),
            events,
            reauth: Mutex::new(()),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    /// Replaces the token, persists it and emits `TokenRefreshed`
    pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.replace_token(Some(token.clone()));
        let persisted = self.credentials.set(&token);
        let _ = self.events.send(LoginEvent::TokenRefreshed(token));
        persisted
    }

    /// Drops the token, clears the credential store and emits `LoggedOut`
    pub fn logout(&self) -> Result<()> {
        self.replace_token(None);
        let cleared = self.credentials.clear();
        info!("Logged out");
        let _ = self.events.send(LoginEvent::LoggedOut);
        cleared
    }

    fn replace_token(&self, token: Option<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }
}

#[async_trait::async_trait]
impl ILoginProvider for LoginManager {
    fn is_logged_in(&self) -> bool {
        self.current_token().is_some()
    }

    fn current_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn prompt_reauthentication(&self) -> bool {
        let rejected = self.current_token();
        let _guard = self.reauth.lock().await;

        let current = self.current_token();
        if current.is_some() && current != rejected {
            debug!("Token already refreshed by a concurrent re-authentication");
            return true;
        }

        match self.prompt.request_token().await {
            Ok(Some(token)) => {
                if let Err(e) = self.set_token(token) {
                    warn!(error = %format!("{e:#}"), "New token could not be persisted");
                }
                info!("Re-authentication succeeded");
                true
            }
            Ok(None) => {
                info!("Re-authentication abandoned, logging out");
                if let Err(e) = self.logout() {
                    warn!(error = %format!("{e:#}"), "Failed to clear stored token");
                }
                false
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Re-authentication failed, logging out");
                if let Err(e) = self.logout() {
                    warn!(error = %format!("{e:#}"), "Failed to clear stored token");
                }
                false
            }
        }
    }
}

// ============================================================================
// Launch handshake
// ============================================================================

/// Failure to extract a token from a launch redirect
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchTokenError {
    #[error("redirect URL carries no token parameter")]
    MissingToken,

    #[error("token payload is not valid base64")]
    InvalidEncoding,

    #[error("token payload does not contain a web-service token")]
    MissingField,
}

/// Extracts the web-service token from a mobile-launch redirect
///
/// The redirect looks like `moodlemobile://token=<b64>` where `<b64>` decodes
/// to `<passport>:::<token>[:::<private token>]`.
pub fn decode_launch_token(redirect: &str) -> Result<String, LaunchTokenError> {
    let encoded = redirect
        .split_once("token=")
        .map(|(_, rest)| rest)
        .ok_or(LaunchTokenError::MissingToken)?;
    let encoded = encoded
        .split(['&', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('/');
    if encoded.is_empty() {
        return Err(LaunchTokenError::MissingToken);
    }

    let decoded = STANDARD
        .decode(encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(encoded))
        .map_err(|_| LaunchTokenError::InvalidEncoding)?;
    let decoded = String::from_utf8(decoded).map_err(|_| LaunchTokenError::InvalidEncoding)?;

    decoded
        .split(PAYLOAD_SEPARATOR)
        .nth(1)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(LaunchTokenError::MissingField)
}

/// URL the interactive surface opens to start the launch handshake
pub fn launch_url(base_url: &str, passport: &str) -> Result<String, url::ParseError> {
    let base = format!("{}{}", base_url.trim_end_matches('/'), LAUNCH_PATH);
    let url = url::Url::parse_with_params(
        &base,
        &[("service", MOBILE_SERVICE), ("passport", passport)],
    )?;
    Ok(url.to_string())
}
