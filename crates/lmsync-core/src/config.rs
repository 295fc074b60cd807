//! Configuration module for lmsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//!
//! User-editable sync settings (download path, concurrency, autosync) are not
//! part of this file; they live in the persisted store, see
//! [`Settings`](crate::domain::Settings).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for lmsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub credentials: CredentialsConfig,
}

/// Remote platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the learning platform, without the web-service path.
    pub base_url: String,
    /// Timeout applied to every metadata call, in seconds.
    pub request_timeout_secs: u64,
    /// Delay between reattempts while the platform is unreachable, in seconds.
    pub retry_interval_secs: u64,
    /// Language passed to the platform for filtered strings.
    pub lang: String,
}

/// Persisted store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON store file.
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
    /// Folder for per-session log files; stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_dir: Option<PathBuf>,
}

/// OS keyring coordinates for the platform token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub service: String,
    pub account: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/lmsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("lmsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default platform instance.
pub const DEFAULT_BASE_URL: &str = "https://webeep.polimi.it";

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            retry_interval_secs: 2,
            lang: "en".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("lmsync")
                .join("store.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file_dir: None,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            service: "lmsync".to_string(),
            account: "default".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"api.base_url"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- api ---
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError {
                field: "api.base_url".into(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError {
                field: "api.base_url".into(),
                message: format!("invalid URL: {e}"),
            }),
        }
        if self.api.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "api.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.api.retry_interval_secs == 0 {
            errors.push(ValidationError {
                field: "api.retry_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.api.lang.trim().is_empty() {
            errors.push(ValidationError {
                field: "api.lang".into(),
                message: "must not be empty".into(),
            });
        }

        // --- store ---
        if self.store.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "store.path".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if self
            .logging
            .file_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            errors.push(ValidationError {
                field: "logging.file_dir".into(),
                message: "must not be empty when set".into(),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        // --- credentials ---
        if self.credentials.service.is_empty() {
            errors.push(ValidationError {
                field: "credentials.service".into(),
                message: "must not be empty".into(),
            });
        }
        if self.credentials.account.is_empty() {
            errors.push(ValidationError {
                field: "credentials.account".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use lmsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .api_base_url("https://moodle.example.edu")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- api ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn api_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.api.request_timeout_secs = seconds;
        self
    }

    pub fn api_retry_interval_secs(mut self, seconds: u64) -> Self {
        self.config.api.retry_interval_secs = seconds;
        self
    }

    pub fn api_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.api.lang = lang.into();
        self
    }

    // --- store ---

    pub fn store_path(mut self, path: PathBuf) -> Self {
        self.config.store.path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    pub fn logging_file_dir(mut self, dir: PathBuf) -> Self {
        self.config.logging.file_dir = Some(dir);
        self
    }

    // --- credentials ---

    pub fn credentials_service(mut self, service: impl Into<String>) -> Self {
        self.config.credentials.service = service.into();
        self
    }

    pub fn credentials_account(mut self, account: impl Into<String>) -> Self {
        self.config.credentials.account = account.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
