//! Auth commands - Login, Logout, and Status
//!
//! `login` runs the launch handshake: the platform's launch page is opened in
//! a browser, the user signs in, and the `moodlemobile://token=...` address
//! the browser is sent to is pasted back (or passed with `--redirect`). The
//! decoded token is kept in the OS keyring.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use lmsync_moodle::auth::decode_launch_token;
use tracing::info;

use crate::context::{interactive_login, AppContext};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in through the platform's launch page
    Login {
        /// Print the launch page address instead of opening a browser
        #[arg(long)]
        no_browser: bool,
        /// Redirect address obtained from an earlier sign-in
        #[arg(long, value_name = "URL")]
        redirect: Option<String>,
    },
    /// Remove the stored token
    Logout,
    /// Check authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, config: Option<&Path>, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let ctx = AppContext::load(config)?;
        match self {
            AuthCommand::Login {
                no_browser,
                redirect,
            } => execute_login(&ctx, *no_browser, redirect.as_deref(), &*fmt).await,
            AuthCommand::Logout => execute_logout(&ctx, &*fmt),
            AuthCommand::Status => execute_status(&ctx, &*fmt, format).await,
        }
    }
}

async fn execute_login(
    ctx: &AppContext,
    no_browser: bool,
    redirect: Option<&str>,
    fmt: &dyn OutputFormatter,
) -> Result<()> {
    let token = match redirect {
        Some(redirect) => decode_launch_token(redirect)?,
        None => match interactive_login(ctx.client.base_url(), !no_browser).await? {
            Some(token) => token,
            None => {
                fmt.error("Login abandoned");
                return Ok(());
            }
        },
    };

    ctx.login
        .set_token(token)
        .context("Failed to store token in keyring")?;
    info!("Token stored");

    match ctx.client.site_info(false).await {
        Ok(Some(info)) => fmt.success(&format!("Signed in as {}", info.full_name)),
        Ok(None) => fmt.error("The platform rejected the token"),
        Err(e) => fmt.warn(&format!(
            "Token saved, but the platform could not be reached: {e}"
        )),
    }
    Ok(())
}

fn execute_logout(ctx: &AppContext, fmt: &dyn OutputFormatter) -> Result<()> {
    ctx.login.logout().context("Failed to clear stored token")?;
    fmt.success("Logged out");
    Ok(())
}

async fn execute_status(
    ctx: &AppContext,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    if !ctx.client.is_logged_in() {
        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({ "logged_in": false }));
        } else {
            fmt.warn("Not logged in. Run 'lmsync auth login'");
        }
        return Ok(());
    }

    let site = ctx.client.site_info(false).await;
    if format == OutputFormat::Json {
        let json = match &site {
            Ok(Some(info)) => serde_json::json!({
                "logged_in": true,
                "connected": true,
                "user_id": info.user_id,
                "full_name": info.full_name,
                "base_url": ctx.client.base_url(),
            }),
            Ok(None) => serde_json::json!({ "logged_in": false }),
            Err(e) => serde_json::json!({
                "logged_in": true,
                "connected": false,
                "error": e.to_string(),
            }),
        };
        fmt.print_json(&json);
        return Ok(());
    }

    match site {
        Ok(Some(info)) => {
            fmt.success(&format!("Signed in as {}", info.full_name));
            fmt.info(&format!("User id: {}", info.user_id));
            fmt.info(&format!("Platform: {}", ctx.client.base_url()));
        }
        Ok(None) => fmt.warn("Stored token was rejected; you have been logged out"),
        Err(e) => {
            fmt.success("Token present");
            fmt.warn(&format!("Platform unreachable: {e}"));
        }
    }
    Ok(())
}
