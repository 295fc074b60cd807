//! Settings commands - Show and Set the persisted sync settings
//!
//! Unlike `config`, which reads the YAML file, these values live in the
//! store next to the course map.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use lmsync_core::domain::Settings;
use lmsync_core::ports::ISettingsStore;
use tracing::info;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Display the current sync settings
    Show,
    /// Change one sync setting
    Set {
        /// Setting name (e.g., "max_concurrent_downloads")
        key: String,
        /// New value
        value: String,
    },
}

impl SettingsCommand {
    pub async fn execute(&self, config: Option<&Path>, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let ctx = AppContext::load(config)?;

        match self {
            SettingsCommand::Show => {
                let settings = ctx.store.settings().await?;
                if format == OutputFormat::Json {
                    fmt.print_json(&serde_json::to_value(&settings)?);
                } else {
                    fmt.success(&format!("Settings ({})", ctx.store.path().display()));
                    fmt.info("");
                    let yaml = serde_yaml::to_string(&settings)
                        .context("Failed to serialize settings to YAML")?;
                    for line in yaml.lines() {
                        fmt.info(line);
                    }
                }
            }
            SettingsCommand::Set { key, value } => {
                let mut settings = ctx.store.settings().await?;
                if let Err(e) = apply_setting(&mut settings, key, value) {
                    fmt.error(&format!("Failed to set '{key}': {e}"));
                    fmt.info("");
                    fmt.info("Supported keys:");
                    fmt.info("  download_path               - Root folder of the mirror");
                    fmt.info("  max_concurrent_downloads    - Parallel downloads (at least 1)");
                    fmt.info("  sync_new_courses            - true|false");
                    fmt.info("  autosync_enabled            - true|false");
                    fmt.info("  autosync_interval_secs      - Seconds between unattended syncs");
                    return Ok(());
                }
                info!(key = %key, value = %value, "Setting sync value");
                ctx.store.save_settings(&settings).await?;
                if format == OutputFormat::Json {
                    fmt.print_json(&serde_json::json!({
                        "success": true,
                        "key": key,
                        "value": value,
                    }));
                } else {
                    fmt.success(&format!("Set {key} = {value}"));
                }
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("expected true or false, got '{value}'"),
    }
}

/// Applies one `key = value` change to `settings`
fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "download_path" => {
            if value.trim().is_empty() {
                bail!("path must not be empty");
            }
            settings.download_path = PathBuf::from(value);
        }
        "max_concurrent_downloads" => {
            let n: i64 = value.parse().context("expected an integer")?;
            if n < 1 {
                bail!("must be at least 1");
            }
            settings.max_concurrent_downloads = n;
        }
        "sync_new_courses" => settings.sync_new_courses = parse_bool(value)?,
        "autosync_enabled" => settings.autosync_enabled = parse_bool(value)?,
        "autosync_interval_secs" => {
            let secs: u64 = value.parse().context("expected a number of seconds")?;
            if secs < 60 {
                bail!("must be at least 60 seconds");
            }
            settings.autosync_interval_secs = secs;
        }
        _ => bail!("unknown setting"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_settings() {
        let mut settings = Settings::default();
        apply_setting(&mut settings, "max_concurrent_downloads", "3").unwrap();
        apply_setting(&mut settings, "autosync_enabled", "off").unwrap();
        apply_setting(&mut settings, "download_path", "/srv/mirror").unwrap();
        apply_setting(&mut settings, "autosync_interval_secs", "3600").unwrap();

        assert_eq!(settings.max_concurrent_downloads, 3);
        assert!(!settings.autosync_enabled);
        assert_eq!(settings.download_path, PathBuf::from("/srv/mirror"));
        assert_eq!(settings.autosync_interval_secs, 3600);
    }

    #[test]
    fn test_rejected_values_leave_settings_untouched() {
        let mut settings = Settings::default();
        assert!(apply_setting(&mut settings, "max_concurrent_downloads", "0").is_err());
        assert!(apply_setting(&mut settings, "sync_new_courses", "maybe").is_err());
        assert!(apply_setting(&mut settings, "autosync_interval_secs", "5").is_err());
        assert!(apply_setting(&mut settings, "theme", "dark").is_err());
        assert_eq!(settings, Settings::default());
    }
}
