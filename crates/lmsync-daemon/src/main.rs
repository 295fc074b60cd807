//! lmsync Daemon - Background course mirror
//!
//! This binary runs as a user service and handles:
//! - Unattended syncs through the autosync scheduler
//! - Logging of connectivity, login and sync events, optionally to a
//!   per-session log file
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the keyring, the login manager, the Moodle client and
//! resolver, the JSON store and the sync engine, then runs the scheduler
//! until a `CancellationToken` is triggered by a shutdown signal. A running
//! sync is stopped before exit.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use lmsync_core::config::{Config, LoggingConfig};
use lmsync_core::domain::{LoginEvent, NewFilesList, Settings, SyncEvent};
use lmsync_core::ports::{ICredentialStore, ILoginProvider, IReauthPrompt, ISettingsStore};
use lmsync_moodle::auth::{KeyringCredentialStore, LoginManager};
use lmsync_moodle::client::MoodleClient;
use lmsync_moodle::resolver::CourseResolver;
use lmsync_store::JsonStore;
use lmsync_sync::{AutosyncScheduler, SyncEngine};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// How often the daemon looks for a token while logged out
const AUTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How long shutdown waits for a stopped sync to unwind
const STOP_GRACE: Duration = Duration::from_secs(10);

// ============================================================================
// Re-login prompt
// ============================================================================

/// Prompt used without a terminal: logs how to sign in again and gives up
struct LogOnlyPrompt;

#[async_trait::async_trait]
impl IReauthPrompt for LogOnlyPrompt {
    async fn request_token(&self) -> Result<Option<String>> {
        warn!("Session expired. Run 'lmsync auth login' to sign in again.");
        Ok(None)
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service
///
/// Holds the configuration and the collaborators shared by the event tasks.
struct DaemonService {
    config: Config,
    credentials: Arc<KeyringCredentialStore>,
    login: Arc<LoginManager>,
    store: Arc<JsonStore>,
    resolver: Arc<CourseResolver>,
    engine: Arc<SyncEngine>,
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let credentials = Arc::new(KeyringCredentialStore::from_config(&config.credentials));
        let login = Arc::new(
            LoginManager::new(credentials.clone(), Arc::new(LogOnlyPrompt))
                .context("Failed to initialize login")?,
        );
        let store = Arc::new(JsonStore::new(&config.store.path, Settings::default()));
        let client = Arc::new(MoodleClient::new(&config.api, login.clone()));
        let resolver = Arc::new(CourseResolver::new(client, store.clone()));
        let engine = Arc::new(SyncEngine::new(resolver.clone(), store.clone()));

        Ok(Self {
            config,
            credentials,
            login,
            store,
            resolver,
            engine,
            shutdown,
        })
    }

    /// Runs the daemon until shutdown
    ///
    /// 1. Waits for the store to load
    /// 2. Waits for a token if none is stored
    /// 3. Starts the event loggers and the autosync scheduler
    async fn run(&self) -> Result<()> {
        self.store
            .ready()
            .await
            .with_context(|| format!("Failed to load store {}", self.config.store.path.display()))?;
        let settings = self.store.settings().await?;
        info!(
            base_url = %self.config.api.base_url,
            download_path = %settings.download_path.display(),
            autosync = settings.autosync_enabled,
            interval_secs = settings.autosync_interval_secs,
            "Store loaded"
        );

        if !self.login.is_logged_in() && !self.wait_for_auth().await {
            return Ok(());
        }

        self.spawn_event_loggers();

        let scheduler = AutosyncScheduler::new(self.engine.clone(), self.store.clone());
        scheduler.run(self.shutdown.clone()).await;

        self.stop_engine().await;
        Ok(())
    }

    /// Polls the keyring until a token appears; false on shutdown
    async fn wait_for_auth(&self) -> bool {
        warn!("Not logged in. Run 'lmsync auth login' to sign in.");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(AUTH_CHECK_INTERVAL) => {
                    match self.credentials.get() {
                        Ok(Some(token)) => {
                            info!("Token found, starting");
                            if let Err(e) = self.login.set_token(token) {
                                warn!(error = %e, "Failed to persist token");
                            }
                            return true;
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Failed to read keyring"),
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received while waiting for login");
                    return false;
                }
            }
        }
    }

    async fn stop_engine(&self) {
        if !self.engine.is_syncing() {
            return;
        }
        info!("Stopping running sync");
        self.engine.stop();
        let deadline = tokio::time::Instant::now() + STOP_GRACE;
        while self.engine.is_syncing() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.engine.is_syncing() {
            warn!("Sync did not stop in time");
        }
    }

    // ========================================================================
    // Event loggers
    // ========================================================================

    fn spawn_event_loggers(&self) {
        let mut connectivity = self.resolver.client().subscribe_connectivity();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = connectivity.recv() => event,
                };
                match event {
                    Ok(event) => info!(?event, "Connectivity changed"),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut login_events = self.login.subscribe();
        let resolver = self.resolver.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = login_events.recv() => event,
                };
                match event {
                    Ok(LoginEvent::TokenRefreshed(_)) => info!("Token refreshed"),
                    Ok(LoginEvent::LoggedOut) => {
                        warn!("Logged out; syncs will find no courses until the next login");
                        resolver.forget_user();
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut sync_events = self.engine.subscribe();
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = sync_events.recv() => event,
                };
                match event {
                    Ok(SyncEvent::SyncStarted) => info!("Sync started"),
                    Ok(SyncEvent::StateChanged(state)) => debug!(state = %state, "Sync state"),
                    Ok(SyncEvent::SyncStopped(outcome)) if outcome.is_success() => {
                        info!(outcome = %outcome, "Sync stopped");
                    }
                    Ok(SyncEvent::SyncStopped(outcome)) => {
                        warn!(outcome = %outcome, "Sync stopped");
                    }
                    Ok(SyncEvent::NewFiles(files)) => {
                        report_new_files(&files, store.as_ref()).await;
                    }
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Sync events lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Number of files and bytes in a report
fn summarize(files: &NewFilesList) -> (usize, u64) {
    files
        .values()
        .flatten()
        .fold((0, 0), |(count, bytes), file| (count + 1, bytes + file.size))
}

async fn report_new_files(files: &NewFilesList, store: &dyn ISettingsStore) {
    let (count, bytes) = summarize(files);
    if count == 0 {
        return;
    }
    for (course, course_files) in files {
        let updated = course_files.iter().filter(|f| f.updated).count();
        info!(
            course = %course,
            new = course_files.len() - updated,
            updated,
            "Course files downloaded"
        );
    }
    info!(files = count, bytes, "New files downloaded");

    match store.notifications_sent().await {
        Ok(false) => {
            info!(
                "New files are reported here after every sync; \
                 run 'lmsync courses list' to review synced courses"
            );
            if let Err(e) = store.set_notifications_sent(true).await {
                warn!(error = %e, "Failed to record first notification");
            }
        }
        Ok(true) => {}
        Err(e) => warn!(error = %e, "Failed to read notification flag"),
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

/// File name of the session log for a daemon started at `started`
fn session_log_name(started: DateTime<Local>) -> String {
    format!("lmsyncd-{}.log", started.format("%Y%m%d-%H%M%S"))
}

/// Creates `dir` if needed and opens a fresh session log inside it
fn open_session_log(dir: &Path, started: DateTime<Local>) -> std::io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(session_log_name(started));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Installs the global subscriber; `RUST_LOG` overrides the configured level
///
/// Records always go to stderr. With `logging.file_dir` set they are also
/// written, without colours, to a session log in that folder; the result
/// says where, or why it could not be opened.
fn init_tracing(logging: &LoggingConfig) -> Option<std::io::Result<PathBuf>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let json = logging.format == "json";

    let stderr_layer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let session_log = logging
        .file_dir
        .as_deref()
        .map(|dir| open_session_log(dir, Local::now()));
    let (file_layer, opened) = match session_log {
        Some(Ok((path, file))) => {
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            let layer = if json {
                layer.json().boxed()
            } else {
                layer.boxed()
            };
            (Some(layer), Some(Ok(path)))
        }
        Some(Err(e)) => (None, Some(Err(e))),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    opened
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_or_default(&config_path);
    match init_tracing(&config.logging) {
        Some(Ok(path)) => {
            info!(path = %path.display(), level = %config.logging.level, "Writing session log");
        }
        Some(Err(e)) => warn!(error = %e, "Session log unavailable, logging to stderr only"),
        None => {}
    }

    info!(config_path = %config_path.display(), "lmsync daemon starting (lmsyncd)");
    for problem in config.validate() {
        warn!(field = %problem.field, "{}", problem.message);
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token)?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("lmsync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "lmsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
