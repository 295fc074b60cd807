//! Collaborator wiring shared by the commands
//!
//! Every command that talks to the platform or the store builds an
//! [`AppContext`] from the configuration. Re-login requests raised while a
//! command runs go through [`TerminalPrompt`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use lmsync_core::config::Config;
use lmsync_core::domain::Settings;
use lmsync_core::ports::IReauthPrompt;
use lmsync_core::sanitize::generate_uid;
use lmsync_moodle::auth::{decode_launch_token, launch_url, KeyringCredentialStore, LoginManager};
use lmsync_moodle::client::MoodleClient;
use lmsync_moodle::resolver::CourseResolver;
use lmsync_store::JsonStore;
use lmsync_sync::SyncEngine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Loads the configuration from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> (PathBuf, Config) {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&path);
    debug!(config_path = %path.display(), "Loaded configuration");
    (path, config)
}

/// Runs the launch handshake in the terminal
///
/// Opens (or prints) the launch page, then reads the redirect address the
/// user pastes. Returns `None` when nothing is pasted.
pub async fn interactive_login(base_url: &str, open_browser: bool) -> Result<Option<String>> {
    let url = launch_url(base_url, &generate_uid()).context("Invalid base URL")?;
    if open_browser {
        if let Err(e) = webbrowser::open(&url) {
            warn!(error = %e, "Failed to open browser");
        }
    }
    eprintln!("Sign in on this page:\n\n  {url}\n");
    eprintln!("Then paste the address the browser was redirected to (moodlemobile://token=...):");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
        return Ok(None);
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(decode_launch_token(line)?))
}

/// Re-login prompt that runs the handshake in the terminal
pub struct TerminalPrompt {
    base_url: String,
}

#[async_trait::async_trait]
impl IReauthPrompt for TerminalPrompt {
    async fn request_token(&self) -> Result<Option<String>> {
        eprintln!("Your session has expired.");
        interactive_login(&self.base_url, true).await
    }
}

/// Wired collaborators for one command
pub struct AppContext {
    pub login: Arc<LoginManager>,
    pub store: Arc<JsonStore>,
    pub client: Arc<MoodleClient>,
    pub resolver: Arc<CourseResolver>,
}

impl AppContext {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let (_, config) = load_config(config_path);
        let credentials = Arc::new(KeyringCredentialStore::from_config(&config.credentials));
        let prompt = Arc::new(TerminalPrompt {
            base_url: config.api.base_url.clone(),
        });
        let login = Arc::new(
            LoginManager::new(credentials, prompt).context("Failed to initialize login")?,
        );
        let store = Arc::new(JsonStore::new(&config.store.path, Settings::default()));
        let client = Arc::new(MoodleClient::new(&config.api, login.clone()));
        let resolver = Arc::new(CourseResolver::new(client.clone(), store.clone()));
        Ok(Self {
            login,
            store,
            client,
            resolver,
        })
    }

    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(self.resolver.clone(), self.store.clone())
    }
}
