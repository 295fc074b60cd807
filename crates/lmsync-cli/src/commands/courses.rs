//! Courses commands - List, Rename, Enable and Disable
//!
//! Listing enumerates the enrolled courses on the platform, which also
//! registers courses seen for the first time. When the platform cannot be
//! reached the persisted course map is shown instead.

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use lmsync_core::domain::{Course, CourseEntry};
use lmsync_core::ports::{ICourseProvider, ISettingsStore};
use tracing::warn;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum CoursesCommand {
    /// List enrolled courses and their local folders
    List,
    /// Rename a course folder
    Rename {
        /// Course id, as shown by `courses list`
        id: u64,
        /// New folder name
        name: String,
    },
    /// Include a course in syncs
    Enable {
        /// Course id
        id: u64,
    },
    /// Exclude a course from syncs
    Disable {
        /// Course id
        id: u64,
    },
}

impl CoursesCommand {
    pub async fn execute(&self, config: Option<&Path>, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let ctx = AppContext::load(config)?;
        match self {
            CoursesCommand::List => execute_list(&ctx, &*fmt, format).await,
            CoursesCommand::Rename { id, name } => {
                let entry = ctx.resolver.rename_course(*id, name).await?;
                print_entry(*id, &entry, &*fmt, format, &format!("Course {id} renamed"));
                Ok(())
            }
            CoursesCommand::Enable { id } => {
                let entry = ctx.resolver.set_should_sync(*id, true).await?;
                print_entry(*id, &entry, &*fmt, format, &format!("Course {id} will be synced"));
                Ok(())
            }
            CoursesCommand::Disable { id } => {
                let entry = ctx.resolver.set_should_sync(*id, false).await?;
                print_entry(*id, &entry, &*fmt, format, &format!("Course {id} will be skipped"));
                Ok(())
            }
        }
    }
}

async fn execute_list(
    ctx: &AppContext,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    let courses = match ctx.resolver.list_enrolled_courses().await {
        Ok(courses) if !courses.is_empty() => courses,
        Ok(_) => known_courses(ctx).await?,
        Err(e) => {
            warn!(error = %e, "Enrolled courses unavailable, showing saved courses");
            fmt.warn(&format!("Showing saved courses: {e}"));
            known_courses(ctx).await?
        }
    };

    if format == OutputFormat::Json {
        let list: Vec<_> = courses
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "full_name": c.full_name,
                    "name": c.local_name,
                    "should_sync": c.should_sync,
                })
            })
            .collect();
        fmt.print_json(&serde_json::json!({ "courses": list }));
        return Ok(());
    }

    if courses.is_empty() {
        fmt.info("No courses known yet");
        return Ok(());
    }
    fmt.success(&format!("{} courses", courses.len()));
    for course in &courses {
        fmt.info(&format_course_line(course));
    }
    Ok(())
}

/// Courses from the store; platform names are unknown offline
async fn known_courses(ctx: &AppContext) -> Result<Vec<Course>> {
    Ok(ctx
        .store
        .courses()
        .await?
        .iter()
        .map(|(id, entry)| Course::from_entry(*id, "", entry))
        .collect())
}

fn format_course_line(course: &Course) -> String {
    let marker = if course.should_sync { "[x]" } else { "[ ]" };
    if course.full_name.is_empty() || course.full_name == course.local_name {
        format!("{marker} {:>6}  {}", course.id, course.local_name)
    } else {
        format!(
            "{marker} {:>6}  {}  ({})",
            course.id, course.local_name, course.full_name
        )
    }
}

fn print_entry(
    id: u64,
    entry: &CourseEntry,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
    message: &str,
) {
    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({
            "id": id,
            "name": entry.name,
            "should_sync": entry.should_sync,
        }));
    } else {
        fmt.success(message);
        fmt.info(&format!("Folder: {}", entry.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_line_shows_sync_flag_and_full_name() {
        let entry = CourseEntry {
            name: "Algorithms".into(),
            should_sync: false,
        };
        let line = format_course_line(&Course::from_entry(
            17,
            "ALGORITHMS AND PRINCIPLES [2026-27]",
            &entry,
        ));
        assert!(line.starts_with("[ ]"));
        assert!(line.contains("    17  Algorithms"));
        assert!(line.ends_with("(ALGORITHMS AND PRINCIPLES [2026-27])"));

        let offline = format_course_line(&Course::from_entry(17, "", &entry));
        assert!(offline.ends_with("Algorithms"));
    }
}
