//! Forum-post notifications
//!
//! Only notifications with `eventtype == "posts"` are surfaced. The last
//! successful listing is cached; a failed listing returns the cache so the
//! caller always has something to show. Marking as read updates the cache
//! first, then calls the platform.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resolver::CourseResolver;
use crate::ApiError;

/// A forum-post notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub html_body: String,
    pub time_created: DateTime<Utc>,
    pub read: bool,
    pub url: String,
    /// Course the post belongs to, when the platform says so
    pub course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNotifications {
    #[serde(default)]
    notifications: Vec<RawNotification>,
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    id: u64,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    fullmessagehtml: String,
    #[serde(default)]
    contexturl: Option<String>,
    #[serde(default)]
    timecreated: i64,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    eventtype: String,
    #[serde(default)]
    customdata: Option<String>,
}

/// Reads `courseid` out of the JSON-encoded `customdata` field
fn parse_course_id(customdata: Option<&str>) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(customdata?).ok()?;
    match value.get("courseid")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn convert(raw: RawNotifications) -> Vec<Notification> {
    raw.notifications
        .into_iter()
        .filter(|n| n.eventtype == "posts")
        .map(|n| Notification {
            course_id: parse_course_id(n.customdata.as_deref()),
            id: n.id,
            title: n.subject,
            html_body: n.fullmessagehtml,
            time_created: DateTime::from_timestamp(n.timecreated, 0).unwrap_or_default(),
            read: n.read,
            url: n.contexturl.unwrap_or_default(),
        })
        .collect()
}

/// Cached access to the user's popup notifications
pub struct NotificationCenter {
    resolver: Arc<CourseResolver>,
    cache: Mutex<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new(resolver: Arc<CourseResolver>) -> Self {
        Self {
            resolver,
            cache: Mutex::new(Vec::new()),
        }
    }

    /// Last listing, possibly with optimistic read flags applied
    pub fn cached(&self) -> Vec<Notification> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fetches notifications; on any failure returns the cache
    pub async fn list_notifications(&self) -> Vec<Notification> {
        let result = self
            .resolver
            .client()
            .call(
                "message_popup_get_popup_notifications",
                &[("useridto", "0".to_string())],
                false,
            )
            .await;

        let value = match result {
            Ok(Some(value)) => value,
            Ok(None) => return self.cached(),
            Err(e) => {
                debug!(error = %e, "Notification listing failed, serving cache");
                return self.cached();
            }
        };
        let raw: RawNotifications = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Unexpected notification payload, serving cache");
                return self.cached();
            }
        };

        let notifications = convert(raw);
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = notifications.clone();
        notifications
    }

    /// Marks one notification as read
    pub async fn mark_read(&self, id: u64) -> Result<(), ApiError> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for n in cache.iter_mut().filter(|n| n.id == id) {
                n.read = true;
            }
        }
        self.resolver
            .client()
            .call(
                "core_message_mark_notification_read",
                &[("notificationid", id.to_string())],
                true,
            )
            .await?;
        Ok(())
    }

    /// Marks every notification of the user as read
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for n in cache.iter_mut() {
                n.read = true;
            }
        }
        let Some(user_id) = self.resolver.user_id().await? else {
            return Err(ApiError::NotAuthenticated);
        };
        self.resolver
            .client()
            .call(
                "core_message_mark_all_notifications_as_read",
                &[("useridto", user_id.to_string())],
                true,
            )
            .await?;
        Ok(())
    }
}
