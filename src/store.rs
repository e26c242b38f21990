//! Persisted per-directory snapshots
//!
//! Every source directory has a mirror directory under the index root holding:
//! - `index.bin`: the snapshot, bincode encoded (the only form read back)
//! - `index.json`: the same snapshot as pretty JSON, for humans and tooling
//!
//! Timestamps are milliseconds since the epoch, always whole seconds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Binary snapshot file name
pub const INDEX_BIN: &str = "index.bin";

/// Human-readable mirror file name
pub const INDEX_JSON: &str = "index.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredStereo {
    pub dx: f32,
    pub dy: f32,
    pub ana_dx: f32,
    pub ana_dy: f32,
}

/// Image-only attributes of an item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub rotate_degrees: Option<i32>,
    pub stereo: Option<StoredStereo>,
}

/// Marks an item as a video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMarker {}

/// One file of a directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub name: String,
    pub file_timestamp: Option<i64>,
    pub item_timestamp: Option<i64>,
    pub keywords: Vec<String>,
    pub image: Option<StoredImage>,
    pub video: Option<VideoMarker>,
}

impl StoredItem {
    pub fn image(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: Some(StoredImage::default()),
            ..Default::default()
        }
    }

    pub fn video(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            video: Some(VideoMarker {}),
            ..Default::default()
        }
    }

    pub fn is_video(&self) -> bool {
        self.video.is_some()
    }
}

/// Snapshot of one source directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDirectory {
    /// Modification time of the source directory when this snapshot was taken
    pub directory_timestamp: Option<i64>,
    pub items: Vec<StoredItem>,
    pub sub_directories: Vec<String>,
}

/// Reads and writes directory snapshots below an index root
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Mirror directory holding the snapshot of `rel_pat`
    pub fn dir_path(&self, rel_pat: &str) -> PathBuf {
        if rel_pat.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel_pat)
        }
    }

    /// Read the snapshot of `rel_pat`.
    ///
    /// A missing file is an empty snapshot. A file that cannot be decoded is
    /// logged and also treated as empty, so the directory is rebuilt.
    pub fn read(&self, rel_pat: &str) -> StoredDirectory {
        let path = self.dir_path(rel_pat).join(INDEX_BIN);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No snapshot for {:?}", rel_pat);
                return StoredDirectory::default();
            }
            Err(e) => {
                log::warn!("Cannot read snapshot {:?}: {}", path, e);
                return StoredDirectory::default();
            }
        };

        match bincode::deserialize::<StoredDirectory>(&bytes) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Corrupt snapshot {:?}, rebuilding: {}", path, e);
                StoredDirectory::default()
            }
        }
    }

    /// Write both forms of the snapshot of `rel_pat`, creating directories
    pub fn write(&self, rel_pat: &str, stored: &StoredDirectory) -> Result<()> {
        let dir = self.dir_path(rel_pat);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory {:?}", dir))?;

        let bytes = bincode::serialize(stored).context("Failed to encode snapshot")?;
        let bin_path = dir.join(INDEX_BIN);
        std::fs::write(&bin_path, bytes)
            .with_context(|| format!("Failed to write {:?}", bin_path))?;

        let json = serde_json::to_string_pretty(stored).context("Failed to encode snapshot JSON")?;
        let json_path = dir.join(INDEX_JSON);
        std::fs::write(&json_path, json)
            .with_context(|| format!("Failed to write {:?}", json_path))?;

        log::debug!("Wrote snapshot for {:?} ({} items)", rel_pat, stored.items.len());
        Ok(())
    }
}
