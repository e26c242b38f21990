//! Last-seen modification times of source directories
//!
//! The loader records the mtime of every child entry it lists, keyed by the
//! entry's path relative to the originals root. When a subdirectory is
//! later scheduled, its recorded mtime decides whether its snapshot is stale.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One listed child of a directory
#[derive(Debug, Clone)]
pub struct ListedEntry {
    /// File name (no directory part)
    pub name: String,
    /// True for regular files; everything else is walked as a directory
    pub is_file: bool,
    /// Filesystem modification time
    pub modified: DateTime<Utc>,
}

/// Map of relative path → modification time
#[derive(Debug, Default)]
pub struct FileTimes {
    times: HashMap<String, DateTime<Utc>>,
}

impl FileTimes {
    pub fn new() -> Self {
        Self {
            times: HashMap::with_capacity(1000),
        }
    }

    /// Record the time of a single path
    pub fn record_one(&mut self, rel_path: &str, time: DateTime<Utc>) {
        self.times.insert(rel_path.to_string(), time);
    }

    /// Record the times of every entry listed under `parent`
    pub fn record(&mut self, parent: &str, entries: &[ListedEntry]) {
        for entry in entries {
            self.times.insert(join_rel(parent, &entry.name), entry.modified);
        }
    }

    /// Last recorded time of `rel_path`, if it was ever listed
    pub fn mod_time(&self, rel_path: &str) -> Option<DateTime<Utc>> {
        self.times.get(rel_path).copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Join a relative directory path and a child name with `/`.
///
/// The root is the empty string, so its children have no leading separator.
pub fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
