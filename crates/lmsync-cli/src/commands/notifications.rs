//! Notifications commands - List, Read and ReadAll
//!
//! Only forum-post notifications are shown. Course ids are resolved to the
//! local course names from the store when known.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Subcommand;
use lmsync_core::domain::CourseEntry;
use lmsync_core::ports::ISettingsStore;
use lmsync_moodle::notifications::{Notification, NotificationCenter};

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Upper bound for mark-as-read calls, which retry while offline
const MARK_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Subcommand)]
pub enum NotificationsCommand {
    /// List forum-post notifications
    List {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification as read
    Read {
        /// Notification id
        id: u64,
    },
    /// Mark every notification as read
    ReadAll,
}

impl NotificationsCommand {
    pub async fn execute(&self, config: Option<&Path>, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let ctx = AppContext::load(config)?;
        if !ctx.client.is_logged_in() {
            fmt.error("Not logged in. Run 'lmsync auth login' first");
            return Ok(());
        }
        let center = NotificationCenter::new(Arc::clone(&ctx.resolver));

        match self {
            NotificationsCommand::List { unread } => {
                execute_list(&ctx, &center, *unread, &*fmt, format).await
            }
            NotificationsCommand::Read { id } => {
                tokio::time::timeout(MARK_READ_TIMEOUT, center.mark_read(*id))
                    .await
                    .context("Timed out waiting for the platform")??;
                fmt.success(&format!("Notification {id} marked as read"));
                Ok(())
            }
            NotificationsCommand::ReadAll => {
                tokio::time::timeout(MARK_READ_TIMEOUT, center.mark_all_read())
                    .await
                    .context("Timed out waiting for the platform")??;
                fmt.success("All notifications marked as read");
                Ok(())
            }
        }
    }
}

async fn execute_list(
    ctx: &AppContext,
    center: &NotificationCenter,
    unread_only: bool,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    let notifications: Vec<Notification> = center
        .list_notifications()
        .await
        .into_iter()
        .filter(|n| !unread_only || !n.read)
        .collect();

    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({ "notifications": notifications }));
        return Ok(());
    }

    if notifications.is_empty() {
        fmt.info("No notifications");
        return Ok(());
    }

    let courses = ctx.store.courses().await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    fmt.success(&format!(
        "{} notifications ({unread} unread)",
        notifications.len()
    ));
    for notification in &notifications {
        fmt.info(&format_notification(notification, &courses));
        if !notification.url.is_empty() {
            fmt.info(&format!("      {}", notification.url));
        }
    }
    Ok(())
}

fn format_notification(n: &Notification, courses: &BTreeMap<u64, CourseEntry>) -> String {
    let marker = if n.read { ' ' } else { '*' };
    let course = n
        .course_id
        .as_deref()
        .and_then(|id| id.parse::<u64>().ok())
        .and_then(|id| courses.get(&id))
        .map(|entry| format!("[{}] ", entry.name))
        .unwrap_or_default();
    format!(
        "{marker} {:>8}  {}  {course}{}",
        n.id,
        n.time_created.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        n.title
    )
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn notification(course_id: Option<&str>, read: bool) -> Notification {
        Notification {
            id: 901,
            title: "New post in Announcements".into(),
            html_body: "<p>Exam moved</p>".into(),
            time_created: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            read,
            url: "https://webeep.polimi.it/mod/forum/discuss.php?d=1".into(),
            course_id: course_id.map(String::from),
        }
    }

    #[test]
    fn test_known_course_is_named() {
        let courses = BTreeMap::from([(
            17,
            CourseEntry {
                name: "Algorithms".into(),
                should_sync: true,
            },
        )]);
        let line = format_notification(&notification(Some("17"), false), &courses);
        assert!(line.starts_with("*      901"));
        assert!(line.ends_with("[Algorithms] New post in Announcements"));
    }

    #[test]
    fn test_unknown_course_is_omitted() {
        let line = format_notification(&notification(Some("99"), true), &BTreeMap::new());
        assert!(line.starts_with("  "));
        assert!(!line.contains('['));
    }
}
