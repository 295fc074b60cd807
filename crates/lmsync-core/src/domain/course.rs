//! Course domain entity
//!
//! A [`Course`] is one enrollment on the remote platform, mapped to one local
//! folder named after its `local_name`. The folder name is derived once from
//! the platform's full name and persisted as a [`CourseEntry`]; afterwards the
//! persisted entry wins over anything derived.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// An enrolled course as seen by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Platform course id
    pub id: u64,
    /// Full name as reported by the platform, e.g. `"101 - Algorithms (AY24)"`
    pub full_name: String,
    /// Folder name on disk; user-renamable
    pub local_name: String,
    /// Whether files of this course are mirrored
    pub should_sync: bool,
}

impl Course {
    /// Builds a course from its platform identity and persisted entry
    pub fn from_entry(id: u64, full_name: impl Into<String>, entry: &CourseEntry) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            local_name: entry.name.clone(),
            should_sync: entry.should_sync,
        }
    }

    /// Returns the persisted part of this course
    pub fn entry(&self) -> CourseEntry {
        CourseEntry {
            name: self.local_name.clone(),
            should_sync: self.should_sync,
        }
    }
}

/// Persisted per-course record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEntry {
    /// Folder name on disk
    pub name: String,
    /// Whether files of this course are mirrored
    pub should_sync: bool,
}

fn course_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+ - (.+) \(.+\)").expect("static pattern"))
}

/// Derives the short folder name from a platform full name
///
/// Strips the numeric course-code prefix and the trailing parenthetical:
/// `"101 - Algorithms (AY24)"` becomes `"Algorithms"`. Names that do not follow
/// that shape are returned unchanged.
pub fn derive_local_name(full_name: &str) -> String {
    course_name_pattern()
        .captures(full_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| full_name.to_string())
}

/// Assigns a folder name to every course in one enumeration
///
/// Each course gets its derived short name unless another course in the same
/// list derives the same short name, in which case every colliding course uses
/// its full name verbatim.
pub fn assign_local_names<S: AsRef<str>>(full_names: &[S]) -> Vec<String> {
    let derived: Vec<String> = full_names
        .iter()
        .map(|name| derive_local_name(name.as_ref()))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &derived {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    derived
        .iter()
        .zip(full_names)
        .map(|(short, full)| {
            if counts.get(short.as_str()).copied().unwrap_or(0) > 1 {
                full.as_ref().to_string()
            } else {
                short.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_local_name() {
        assert_eq!(derive_local_name("101 - Algorithms (AY24)"), "Algorithms");
        assert_eq!(
            derive_local_name("054321 - Fondamenti di Informatica (Prof. Rossi)"),
            "Fondamenti di Informatica"
        );
        assert_eq!(derive_local_name("Orientation week"), "Orientation week");
        assert_eq!(derive_local_name(""), "");
    }

    #[test]
    fn test_assign_local_names_collision_uses_full_name() {
        let names = [
            "101 - Physics (Section A)",
            "102 - Physics (Section B)",
            "103 - Chemistry (AY24)",
        ];
        let assigned = assign_local_names(&names);
        assert_eq!(
            assigned,
            vec![
                "101 - Physics (Section A)".to_string(),
                "102 - Physics (Section B)".to_string(),
                "Chemistry".to_string(),
            ]
        );
    }

    #[test]
    fn test_assign_local_names_empty() {
        let names: [&str; 0] = [];
        assert!(assign_local_names(&names).is_empty());
    }

    #[test]
    fn test_course_entry_roundtrip_through_course() {
        let entry = CourseEntry {
            name: "Algorithms".into(),
            should_sync: false,
        };
        let course = Course::from_entry(7, "101 - Algorithms (AY24)", &entry);
        assert_eq!(course.id, 7);
        assert_eq!(course.local_name, "Algorithms");
        assert!(!course.should_sync);
        assert_eq!(course.entry(), entry);
    }
}
