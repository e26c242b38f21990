//! Collaborators the loader delegates to
//!
//! Reading EXIF/IPTC metadata and producing reduced-size copies of images are
//! outside the index itself. The loader only sees these two traits.

use anyhow::Result;
use std::path::Path;

use crate::database::Database;
use crate::store::StoredItem;

/// Fills the metadata of a new or changed file.
///
/// `item` arrives with its name and file timestamp set. Implementations set
/// keywords, the item timestamp and image dimensions where they can; fields
/// they leave empty are merged from the previous snapshot by the caller.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path, item: &mut StoredItem) -> Result<()>;
}

/// Extractor used when no metadata reader is installed.
///
/// The capture time becomes the file time and no keywords are found.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTimeExtractor;

impl MetadataExtractor for FileTimeExtractor {
    fn extract(&self, _path: &Path, item: &mut StoredItem) -> Result<()> {
        item.item_timestamp = item.file_timestamp;
        Ok(())
    }
}

/// Produces reduced copies of indexed images after a load.
///
/// Returns the number of images it processed.
pub trait Minifier: Send + Sync {
    fn minify(&self, db: &Database) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_time_extractor() {
        let mut item = StoredItem::image("a.jpg");
        item.file_timestamp = Some(42_000);

        FileTimeExtractor.extract(Path::new("/tmp/a.jpg"), &mut item).unwrap();

        assert_eq!(item.item_timestamp, Some(42_000));
        assert!(item.keywords.is_empty());
    }
}
