//! CourseResolver - ICourseProvider implementation for Moodle
//!
//! Wraps the [`MoodleClient`] and the settings store to turn raw web-service
//! responses into [`Course`] and [`FileDescriptor`] lists.
//!
//! ## Design Notes
//!
//! - Once logged in, a call that yields nothing means the token was rejected
//!   and not replaced; that is reported as
//!   [`ProviderError::ReauthenticationFailed`], never as an empty listing.
//! - Metadata calls are made without network retry so a sync fails fast
//!   with a network outcome instead of hanging until connectivity returns.
//! - The user id needed by `core_enrol_get_users_courses` is fetched once and
//!   cached until [`CourseResolver::forget_user`] is called (on logout).
//! - Persisted course entries win over freshly derived names, so user
//!   renames and sync toggles survive every enumeration.

use std::io::ErrorKind;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lmsync_core::domain::course::assign_local_names;
use lmsync_core::domain::{Course, CourseEntry, DomainError, FileDescriptor, ProviderError};
use lmsync_core::ports::{ICourseProvider, IDownloadStream, ISettingsStore};
use lmsync_core::sanitize::sanitize_path;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::MoodleClient;
use crate::contents::{build_file_descriptors, ContentSection};
use crate::ApiError;

#[derive(Debug, Deserialize)]
struct RawCourse {
    id: u64,
    fullname: String,
}

fn storage_error(e: anyhow::Error) -> ProviderError {
    ProviderError::Storage(format!("{e:#}"))
}

fn invalid_response(function: &str, e: serde_json::Error) -> ProviderError {
    ProviderError::InvalidResponse(format!("{function}: {e}"))
}

// ============================================================================
// CourseResolver
// ============================================================================

/// Course provider backed by the Moodle web service
pub struct CourseResolver {
    client: Arc<MoodleClient>,
    store: Arc<dyn ISettingsStore>,
    user_id: Mutex<Option<u64>>,
}

impl CourseResolver {
    pub fn new(client: Arc<MoodleClient>, store: Arc<dyn ISettingsStore>) -> Self {
        Self {
            client,
            store,
            user_id: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<MoodleClient> {
        &self.client
    }

    /// Drops the cached user id
    pub fn forget_user(&self) {
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Platform id of the logged-in user; `None` when logged out
    pub async fn user_id(&self) -> Result<Option<u64>, ApiError> {
        if let Some(id) = *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) {
            return Ok(Some(id));
        }
        let Some(info) = self.client.site_info(false).await? else {
            return Ok(None);
        };
        debug!(user_id = info.user_id, "Cached user id");
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(info.user_id);
        Ok(Some(info.user_id))
    }

    /// Renames a course folder and persists the new name
    ///
    /// The name is sanitized first. A course folder that does not exist yet
    /// is not an error; any other filesystem failure leaves the store
    /// untouched.
    #[tracing::instrument(skip(self))]
    pub async fn rename_course(&self, id: u64, new_name: &str) -> Result<CourseEntry> {
        let name = sanitize_path(new_name);
        if name.is_empty() || name.contains('/') {
            return Err(DomainError::InvalidCourseName(new_name.to_string()).into());
        }

        let mut entry = self
            .store
            .course(id)
            .await?
            .with_context(|| format!("Unknown course id {id}"))?;
        if entry.name == name {
            return Ok(entry);
        }

        let root = self.store.settings().await?.download_path;
        let from = root.join(&entry.name);
        let to = root.join(&name);
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => info!(from = %from.display(), to = %to.display(), "Renamed course folder"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %from.display(), "Course folder does not exist yet");
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Failed to rename {} to {}",
                    from.display(),
                    to.display()
                )))
            }
        }

        entry.name = name;
        self.store.save_course(id, &entry).await?;
        Ok(entry)
    }

    /// Enables or disables mirroring of one course
    pub async fn set_should_sync(&self, id: u64, should_sync: bool) -> Result<CourseEntry> {
        let mut entry = self
            .store
            .course(id)
            .await?
            .with_context(|| format!("Unknown course id {id}"))?;
        entry.should_sync = should_sync;
        self.store.save_course(id, &entry).await?;
        Ok(entry)
    }
}

#[async_trait::async_trait]
impl ICourseProvider for CourseResolver {
    #[tracing::instrument(skip(self))]
    async fn list_enrolled_courses(&self) -> Result<Vec<Course>, ProviderError> {
        if !self.client.is_logged_in() {
            debug!("Not logged in, no courses");
            return Ok(Vec::new());
        }
        let Some(user_id) = self.user_id().await? else {
            return Err(ProviderError::ReauthenticationFailed);
        };

        const FUNCTION: &str = "core_enrol_get_users_courses";
        let Some(value) = self
            .client
            .call(FUNCTION, &[("userid", user_id.to_string())], false)
            .await?
        else {
            return Err(ProviderError::ReauthenticationFailed);
        };
        let raw: Vec<RawCourse> =
            serde_json::from_value(value).map_err(|e| invalid_response(FUNCTION, e))?;

        let known = self.store.courses().await.map_err(storage_error)?;
        let settings = self.store.settings().await.map_err(storage_error)?;
        let full_names: Vec<&str> = raw.iter().map(|c| c.fullname.as_str()).collect();
        let derived = assign_local_names(&full_names);

        let mut new_entries = Vec::new();
        let courses: Vec<Course> = raw
            .iter()
            .zip(derived)
            .map(|(course, local_name)| {
                let entry = known.get(&course.id).cloned().unwrap_or_else(|| {
                    let entry = CourseEntry {
                        name: local_name.trim().to_string(),
                        should_sync: settings.sync_new_courses,
                    };
                    new_entries.push((course.id, entry.clone()));
                    entry
                });
                Course::from_entry(course.id, &course.fullname, &entry)
            })
            .collect();

        if !new_entries.is_empty() {
            info!(count = new_entries.len(), "New courses found");
            self.store
                .save_courses(&new_entries)
                .await
                .map_err(storage_error)?;
        }

        Ok(courses)
    }

    #[tracing::instrument(skip(self, course), fields(course = %course.local_name))]
    async fn list_files(&self, course: &Course) -> Result<Vec<FileDescriptor>, ProviderError> {
        const FUNCTION: &str = "core_course_get_contents";
        let Some(value) = self
            .client
            .call(FUNCTION, &[("courseid", course.id.to_string())], false)
            .await?
        else {
            warn!("Token rejected while listing contents");
            return Err(ProviderError::ReauthenticationFailed);
        };
        let sections: Vec<ContentSection> =
            serde_json::from_value(value).map_err(|e| invalid_response(FUNCTION, e))?;

        let files = build_file_descriptors(&course.local_name, &sections);
        debug!(files = files.len(), "Listed course files");
        Ok(files)
    }

    async fn open_download(
        &self,
        file: &FileDescriptor,
    ) -> Result<Box<dyn IDownloadStream>, ProviderError> {
        let response = self.client.open_download(&file.download_url).await?;
        Ok(Box::new(MoodleDownload { response }))
    }
}

// ============================================================================
// MoodleDownload
// ============================================================================

/// Streaming body of an authenticated file download
pub struct MoodleDownload {
    response: reqwest::Response,
}

#[async_trait::async_trait]
impl IDownloadStream for MoodleDownload {
    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProviderError> {
        self.response
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| ProviderError::Network(e.to_string()))
    }
}
