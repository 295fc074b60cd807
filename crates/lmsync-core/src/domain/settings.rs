//! User-editable sync settings
//!
//! [`Settings`] is persisted by the settings store, not by the YAML config.
//! Every field has a typed default, so a partially written or hand-edited
//! store still loads.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Default number of parallel downloads
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: i64 = 5;

/// Default autosync interval (two hours)
pub const DEFAULT_AUTOSYNC_INTERVAL_SECS: u64 = 2 * 60 * 60;

/// Settings consumed by the sync engine and the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root folder of the local mirror
    pub download_path: PathBuf,
    /// Requested worker-pool size; may be out of range, the engine clamps it
    #[serde(deserialize_with = "lenient_i64")]
    pub max_concurrent_downloads: i64,
    /// Default `should_sync` for courses seen for the first time
    pub sync_new_courses: bool,
    /// Whether the autosync scheduler may start unattended syncs
    pub autosync_enabled: bool,
    /// Minimum time between unattended syncs, in seconds
    pub autosync_interval_secs: u64,
}

impl Settings {
    pub fn autosync_interval(&self) -> Duration {
        Duration::from_secs(self.autosync_interval_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: dirs::document_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
                .unwrap_or_else(|| PathBuf::from("~/Documents"))
                .join("lmsync"),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            sync_new_courses: true,
            autosync_enabled: true,
            autosync_interval_secs: DEFAULT_AUTOSYNC_INTERVAL_SECS,
        }
    }
}

/// Reads any JSON value as an integer; anything that is not a finite number reads as 0
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.download_path.ends_with("lmsync"));
        assert_eq!(settings.max_concurrent_downloads, 5);
        assert!(settings.sync_new_courses);
        assert!(settings.autosync_enabled);
        assert_eq!(settings.autosync_interval(), Duration::from_secs(7200));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"download_path": "/srv/mirror"}"#).unwrap();
        assert_eq!(settings.download_path, PathBuf::from("/srv/mirror"));
        assert_eq!(settings.max_concurrent_downloads, 5);
        assert!(settings.autosync_enabled);
    }

    #[test]
    fn test_max_concurrent_downloads_is_lenient() {
        let cases = [
            (r#"{"max_concurrent_downloads": 3}"#, 3),
            (r#"{"max_concurrent_downloads": 2.7}"#, 2),
            (r#"{"max_concurrent_downloads": -4}"#, -4),
            (r#"{"max_concurrent_downloads": "8"}"#, 8),
            (r#"{"max_concurrent_downloads": "NaN"}"#, 0),
            (r#"{"max_concurrent_downloads": null}"#, 0),
            (r#"{"max_concurrent_downloads": [1]}"#, 0),
        ];
        for (json, expected) in cases {
            let settings: Settings = serde_json::from_str(json).unwrap();
            assert_eq!(settings.max_concurrent_downloads, expected, "input {json}");
        }
    }
}
