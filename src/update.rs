//! Per-directory rebuild
//!
//! Diffs a live directory listing against the previous snapshot. Unchanged
//! files keep their stored metadata, new or changed files go through the
//! metadata extractor and are merged field by field with what was stored.

use chrono::FixedOffset;
use std::collections::HashMap;
use std::path::Path;

use crate::file_times::ListedEntry;
use crate::metadata::MetadataExtractor;
use crate::models::{epoch, millis_to_time, round_to_second, time_to_millis, Directory, Image, Stereo};
use crate::store::{StoredDirectory, StoredImage, StoredItem};

const IMAGE_SUFFIXES: &[&str] = &[".jpg", ".JPG", ".jpeg", ".BMP", ".TIF", ".gif", ".GIF"];
const VIDEO_SUFFIXES: &[&str] = &[".webm", ".WEBM"];

/// Entries that are never indexed nor walked
const IGNORED_NAMES: &[&str] = &[
    ".minis",
    ".comments",
    "Data",
    "Albums",
    "Desktop",
    "Originals",
    "Thumbs",
];

/// What a listed entry is, as far as the index cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Ignored,
    SubDirectory,
    Image,
    Video,
    Other,
}

pub fn classify(entry: &ListedEntry) -> EntryKind {
    if IGNORED_NAMES.contains(&entry.name.as_str()) {
        EntryKind::Ignored
    } else if !entry.is_file {
        EntryKind::SubDirectory
    } else if IMAGE_SUFFIXES.iter().any(|s| entry.name.ends_with(s)) {
        EntryKind::Image
    } else if VIDEO_SUFFIXES.iter().any(|s| entry.name.ends_with(s)) {
        EntryKind::Video
    } else {
        EntryKind::Other
    }
}

/// Rebuild the snapshot of one directory from its live listing.
///
/// `dir_path` is the absolute source directory, used to hand file paths to
/// the extractor. The directory timestamp of the result is left unset; the
/// loader stamps it.
pub fn update_directory(
    dir_path: &Path,
    entries: &[ListedEntry],
    old: &StoredDirectory,
    extractor: &dyn MetadataExtractor,
    force: bool,
) -> StoredDirectory {
    let old_items: HashMap<&str, &StoredItem> =
        old.items.iter().map(|item| (item.name.as_str(), item)).collect();

    let mut sorted: Vec<&ListedEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut updated = StoredDirectory::default();
    for entry in sorted {
        let kind = classify(entry);
        match kind {
            EntryKind::SubDirectory => updated.sub_directories.push(entry.name.clone()),
            EntryKind::Image | EntryKind::Video => {
                let file_ts = time_to_millis(round_to_second(entry.modified));
                let previous = old_items.get(entry.name.as_str()).copied();
                let item = update_item(
                    &dir_path.join(&entry.name),
                    &entry.name,
                    file_ts,
                    kind == EntryKind::Video,
                    previous,
                    extractor,
                    force,
                );
                updated.items.push(item);
            }
            EntryKind::Ignored | EntryKind::Other => {}
        }
    }

    updated
}

fn update_item(
    path: &Path,
    name: &str,
    file_ts: i64,
    is_video: bool,
    previous: Option<&StoredItem>,
    extractor: &dyn MetadataExtractor,
    force: bool,
) -> StoredItem {
    if let Some(old) = previous {
        if !force && old.file_timestamp == Some(file_ts) && old.is_video() == is_video {
            return old.clone();
        }
    }

    let mut item = if is_video {
        StoredItem::video(name)
    } else {
        StoredItem::image(name)
    };
    item.file_timestamp = Some(file_ts);

    if let Err(e) = extractor.extract(path, &mut item) {
        log::warn!("Metadata extraction failed for {:?}: {:#}", path, e);
    }

    if let Some(old) = previous {
        if is_video {
            merge_video(&mut item, old);
        } else {
            merge_image(&mut item, old);
        }
    }
    item
}

/// Fill the gaps of a freshly extracted image from its previous record
pub fn merge_image(item: &mut StoredItem, old: &StoredItem) {
    if item.keywords.is_empty() {
        item.keywords = clean_keywords(&old.keywords);
    }
    if item.item_timestamp.is_none() {
        item.item_timestamp = old.item_timestamp;
    }

    let Some(old_image) = old.image.as_ref() else {
        return;
    };
    let image = item.image.get_or_insert_with(StoredImage::default);
    if image.height.is_none() {
        image.height = old_image.height;
    }
    if image.width.is_none() {
        image.width = old_image.width;
    }
    if image.rotate_degrees.is_none() {
        image.rotate_degrees = old_image.rotate_degrees;
    }
    if image.stereo.is_none() {
        image.stereo = old_image.stereo;
    }
}

/// Videos carry no extracted metadata worth trusting over the stored one
pub fn merge_video(item: &mut StoredItem, old: &StoredItem) {
    item.keywords = old.keywords.clone();
    item.item_timestamp = old.item_timestamp;
}

/// Strip embedded newlines and drop keywords that end up empty
pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.replace('\n', ""))
        .filter(|k| !k.is_empty())
        .collect()
}

/// Turn a snapshot into an in-memory directory.
///
/// Videos are dropped. Images lacking an item timestamp fall back to their
/// file time.
pub fn materialize(rel_pat: &str, stored: &StoredDirectory, offset: FixedOffset) -> Directory {
    let index_time = stored
        .directory_timestamp
        .map(millis_to_time)
        .unwrap_or_else(epoch);

    let images: Vec<Image> = stored
        .items
        .iter()
        .filter(|item| !item.is_video())
        .map(|item| {
            let file_time = item.file_timestamp.map(millis_to_time).unwrap_or_else(epoch);
            let item_time = item.item_timestamp.map(millis_to_time).unwrap_or(file_time);
            let mut image = Image::new(item.name.clone(), item.keywords.clone(), file_time, item_time);
            if let Some(attrs) = item.image.as_ref() {
                image.rotate_degrees = attrs.rotate_degrees.unwrap_or(0);
                if let Some(s) = attrs.stereo {
                    image = image.with_stereo(Stereo {
                        dx: s.dx,
                        dy: s.dy,
                        ana_dx: s.ana_dx,
                        ana_dy: s.ana_dy,
                    });
                }
            }
            image
        })
        .collect();

    for image in &images {
        if image.keywords.first().is_none_or(|k| k.is_empty()) {
            log::debug!("No keywords for {}/{}", rel_pat, image.name);
        }
    }

    Directory::new(rel_pat, index_time, images, offset)
}
