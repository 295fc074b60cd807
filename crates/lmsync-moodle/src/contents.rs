//! Course content tree traversal
//!
//! `core_course_get_contents` returns sections, each holding modules, each
//! holding content items. [`build_file_descriptors`] flattens that tree into
//! the files the sync engine mirrors, applying the folder-naming rules:
//!
//! 1. modules of an excluded type are skipped, as are modules with no contents
//! 2. only items of type `file` are kept
//! 3. a `resource` module with exactly one item names the file after the
//!    module (keeping the item's extension); otherwise the module title
//!    becomes a folder
//! 4. path separators inside the filename become `_`
//! 5. the section title becomes a folder unless it is a "materials" section
//! 6. the course folder is prepended, then everything is sanitized
//! 7. a `(folder, filename)` pair already produced gets a ` (n)` suffix

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lmsync_core::domain::FileDescriptor;
use lmsync_core::sanitize::{extension_with_dot, numbered_filename, sanitize_path};
use serde::Deserialize;

/// Module types that never carry course material
pub const EXCLUDED_MODNAMES: &[&str] = &[
    "page", "forum", "url", "wooclap", "choice", "feedback", "label", "lesson",
];

/// Lowercased marker of the generic materials section
const MATERIALS_MARKER: &str = "material";

// ============================================================================
// Raw response types
// ============================================================================

/// A content section of a course
#[derive(Debug, Clone, Deserialize)]
pub struct ContentSection {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<ContentModule>,
}

/// A module inside a section
#[derive(Debug, Clone, Deserialize)]
pub struct ContentModule {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modname: String,
    pub contents: Option<Vec<ContentItem>>,
}

/// One item of a module
#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub filesize: u64,
    #[serde(default)]
    pub fileurl: String,
    #[serde(default)]
    pub timecreated: Option<i64>,
    #[serde(default)]
    pub timemodified: i64,
}

// ============================================================================
// Traversal
// ============================================================================

fn join(parent: &str, child: &str) -> String {
    format!("{parent}/{child}")
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Sanitized filename that is never empty
///
/// Falls back to the item's own name, then to `file_<module id>`.
fn safe_filename(preferred: &str, item_filename: &str, module_id: u64) -> String {
    [preferred, item_filename]
        .into_iter()
        .map(|name| sanitize_path(&name.replace(['/', '\\'], "_")))
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| format!("file_{module_id}"))
}

/// Flattens a course content tree into file descriptors
///
/// `course_name` is the course's local folder name.
pub fn build_file_descriptors(
    course_name: &str,
    sections: &[ContentSection],
) -> Vec<FileDescriptor> {
    let mut files = Vec::new();
    let mut taken: HashSet<(String, String)> = HashSet::new();

    for section in sections {
        let elide_section = section.name.to_lowercase().contains(MATERIALS_MARKER);

        for module in &section.modules {
            if EXCLUDED_MODNAMES.contains(&module.modname.as_str()) {
                continue;
            }
            let Some(contents) = module.contents.as_ref() else {
                continue;
            };
            let single_resource = module.modname == "resource" && contents.len() == 1;

            for item in contents.iter().filter(|item| item.kind == "file") {
                let item_path = item.filepath.as_deref().unwrap_or("/");

                let (filename, folder) = if single_resource {
                    (
                        format!("{}{}", module.name, extension_with_dot(&item.filename)),
                        item_path.to_string(),
                    )
                } else {
                    (item.filename.clone(), join(&module.name, item_path))
                };

                let folder = if elide_section {
                    folder
                } else {
                    join(&section.name, &folder)
                };
                let folder = sanitize_path(&join(course_name, &folder));
                let base_filename = safe_filename(&filename, &item.filename, module.id);

                let mut filename = base_filename.clone();
                let mut n = 1;
                while taken.contains(&(folder.clone(), filename.clone())) {
                    filename = numbered_filename(&base_filename, n);
                    n += 1;
                }
                taken.insert((folder.clone(), filename.clone()));

                files.push(FileDescriptor {
                    course_name: course_name.to_string(),
                    filename,
                    relative_path: PathBuf::from(folder),
                    size_bytes: item.filesize,
                    download_url: item.fileurl.clone(),
                    created_at: timestamp(item.timecreated.unwrap_or(item.timemodified)),
                    modified_at: timestamp(item.timemodified),
                    is_update: false,
                });
            }
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: serde_json::Value) -> Vec<ContentSection> {
        serde_json::from_value(value).unwrap()
    }

    fn file(name: &str, path: &str, size: u64) -> serde_json::Value {
        json!({
            "type": "file",
            "filename": name,
            "filepath": path,
            "filesize": size,
            "fileurl": format!("https://example.org/pluginfile.php/{name}"),
            "timecreated": 1_700_000_000,
            "timemodified": 1_700_000_500
        })
    }

    #[test]
    fn test_materials_section_is_elided() {
        let sections = parse(json!([{
            "id": 1,
            "name": "Materiali",
            "modules": [{
                "id": 10,
                "name": "Lecture1",
                "modname": "folder",
                "contents": [file("slides.pdf", "/", 1000)]
            }]
        }]));

        let files = build_file_descriptors("Algorithms", &sections);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("Algorithms/Lecture1"));
        assert_eq!(files[0].filename, "slides.pdf");
        assert_eq!(files[0].size_bytes, 1000);
        assert_eq!(files[0].modified_at.timestamp(), 1_700_000_500);
        assert_eq!(files[0].created_at.timestamp(), 1_700_000_000);
        assert!(!files[0].is_update);
    }

    #[test]
    fn test_other_sections_become_folders() {
        let sections = parse(json!([{
            "name": "Week 2: Graphs",
            "modules": [{
                "name": "Exercises",
                "modname": "folder",
                "contents": [file("ex1.pdf", "/solutions/", 10)]
            }]
        }]));

        let files = build_file_descriptors("Algorithms", &sections);
        assert_eq!(
            files[0].relative_path,
            PathBuf::from("Algorithms/Week 2_ Graphs/Exercises/solutions")
        );
    }

    #[test]
    fn test_single_resource_takes_module_name() {
        let sections = parse(json!([{
            "name": "Materials",
            "modules": [{
                "name": "Lecture 3 / recap",
                "modname": "resource",
                "contents": [file("L03_final_v2.pdf", "/", 5)]
            }]
        }]));

        let files = build_file_descriptors("Physics", &sections);
        assert_eq!(files[0].filename, "Lecture 3 _ recap.pdf");
        assert_eq!(files[0].relative_path, PathBuf::from("Physics"));
    }

    #[test]
    fn test_excluded_modules_and_non_files_are_skipped() {
        let sections = parse(json!([{
            "name": "General",
            "modules": [
                {"name": "Announcements", "modname": "forum", "contents": [file("a.pdf", "/", 1)]},
                {"name": "Link", "modname": "url", "contents": [file("b.pdf", "/", 1)]},
                {"name": "Empty", "modname": "folder"},
                {"name": "Mixed", "modname": "folder", "contents": [
                    {"type": "url", "filename": "site", "fileurl": "https://example.org"},
                    file("c.pdf", "/", 1)
                ]}
            ]
        }]));

        let files = build_file_descriptors("Course", &sections);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "c.pdf");
        assert_eq!(files[0].relative_path, PathBuf::from("Course/General/Mixed"));
    }

    #[test]
    fn test_collisions_get_numbered_suffix() {
        let sections = parse(json!([{
            "name": "Materiale didattico",
            "modules": [
                {"name": "Notes", "modname": "resource", "contents": [file("a.pdf", "/", 1)]},
                {"name": "Notes", "modname": "resource", "contents": [file("b.pdf", "/", 2)]},
                {"name": "Notes", "modname": "resource", "contents": [file("c.pdf", "/", 3)]}
            ]
        }]));

        let names: Vec<_> = build_file_descriptors("Course", &sections)
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, vec!["Notes.pdf", "Notes (1).pdf", "Notes (2).pdf"]);
    }

    #[test]
    fn test_sanitizes_course_and_filename() {
        let sections = parse(json!([{
            "name": "Materials",
            "modules": [{
                "name": "Lab",
                "modname": "folder",
                "contents": [file("what?.txt", "/", 1)]
            }]
        }]));

        let files = build_file_descriptors(" Course: A ", &sections);
        assert_eq!(files[0].relative_path, PathBuf::from("Course_ A/Lab"));
        assert_eq!(files[0].filename, "what_.txt");
    }

    #[test]
    fn test_filename_never_sanitizes_to_empty() {
        let sections = parse(json!([{
            "name": "Materiali",
            "modules": [
                {
                    "id": 11,
                    "name": "...",
                    "modname": "resource",
                    "contents": [file("README", "/", 5)]
                },
                {"id": 12, "name": "Lab", "modname": "folder", "contents": [file(".", "/", 1)]}
            ]
        }]));

        let files = build_file_descriptors("Algorithms", &sections);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "README");
        assert_eq!(files[0].relative_path, PathBuf::from("Algorithms"));
        assert_eq!(files[1].filename, "file_12");
        assert_eq!(files[1].relative_path, PathBuf::from("Algorithms/Lab"));
        assert!(files.iter().all(|f| f.local_relative_path() != f.relative_path));
    }
}
