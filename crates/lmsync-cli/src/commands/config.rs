//! Config command - View and validate the lmsync configuration file
//!
//! Provides the `lmsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use lmsync_core::config::Config;
use tracing::info;

use crate::context::load_config;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config: Option<&Path>, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config, format),
            ConfigCommand::Validate => execute_validate(config, format),
        }
    }
}

fn execute_show(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format == OutputFormat::Json);
    let (config_path, config) = load_config(path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format == OutputFormat::Json {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn execute_validate(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format == OutputFormat::Json);
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);

    let config = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if !config_path.exists() {
                if format == OutputFormat::Json {
                    formatter.print_json(&serde_json::json!({
                        "valid": true,
                        "config_path": config_path.display().to_string(),
                        "errors": [],
                        "using_defaults": true,
                    }));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.info("Using default configuration.");
                }
                return Ok(());
            }

            if format == OutputFormat::Json {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {}", e)],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {}", e));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();

    if format == OutputFormat::Json {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    Ok(())
}
