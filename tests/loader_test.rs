//! Loader tests against real directory trees
//!
//! Each test builds a throwaway `originals/` tree, loads it through a
//! [`Library`] and checks what ends up in memory and under `index/`.


use photoidx::models::LoadOptions;
use photoidx::store::{INDEX_BIN, INDEX_JSON};
use photoidx::{Config, Library, ParseOptions, SnapshotStore, StoredItem};
use std::fs;
use std::sync::Arc;
use test_helpers::*;

fn opts() -> LoadOptions {
    LoadOptions {
        update_disk: true,
        minify: false,
        force_reload: false,
    }
}

fn paris_tree() -> (PhotoTree, Arc<TableExtractor>) {
    let tree = PhotoTree::new();
    tree.add("2015-06 Paris/a.jpg")
        .add("2015-06 Paris/b.jpg")
        .add("2015-06 Paris/clip.webm")
        .add("2015-06 Paris/notes.txt")
        .add("Thumbs/t.jpg")
        .add("misc/c.JPG");

    let extractor = TableExtractor::new()
        .with("a.jpg", &["paris", "tour eiffel"], "2015-06-10T10:00:00Z")
        .with("b.jpg", &["louvre"], "2015-06-11T10:00:00Z")
        .with("c.JPG", &["julien devin"], "2019-07-14T20:00:00Z");
    (tree, Arc::new(extractor))
}

fn library(tree: &PhotoTree, extractor: &Arc<TableExtractor>) -> Library {
    Library::new(Config::new(tree.root())).with_extractor(extractor.clone())
}

#[test]
fn test_load_indexes_images_and_persists_snapshots() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.directories, 3, "root, album and misc; Thumbs is never walked");
    assert_eq!(stats.images, 3, "videos and other files are not images");
    assert_eq!(stats.rebuilt, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(extractor.calls(), 4, "three images and one video");

    let album = tree.index().join("2015-06 Paris");
    assert!(album.join(INDEX_BIN).exists());
    assert!(album.join(INDEX_JSON).exists());
    assert!(tree.index().join(INDEX_BIN).exists());
    assert!(!tree.index().join("Thumbs").exists());

    let stored = SnapshotStore::new(tree.index()).read("2015-06 Paris");
    let stored_names: Vec<&str> = stored.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(stored_names, vec!["a.jpg", "b.jpg", "clip.webm"]);
    assert!(stored.items[2].is_video());
    assert!(stored.directory_timestamp.is_some());

    let db = lib.snapshot();
    let paris: Vec<&str> = db.images("paris").iter().map(|i| i.name.as_str()).collect();
    assert_eq!(paris, vec!["a.jpg"]);
    assert_eq!(db.images("devin").len(), 1, "sub-keyword of 'julien devin'");
}

#[test]
fn test_second_load_reuses_fresh_snapshots() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);
    lib.load(opts()).unwrap();
    let calls = extractor.calls();

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.rebuilt, 0);
    assert_eq!(stats.images, 3);
    assert_eq!(extractor.calls(), calls);
}

#[test]
fn test_stale_directory_reuses_unchanged_files() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);
    lib.load(opts()).unwrap();
    let calls = extractor.calls();

    let store = SnapshotStore::new(tree.index());
    let mut stored = store.read("2015-06 Paris");
    stored.directory_timestamp = Some(0);
    store.write("2015-06 Paris", &stored).unwrap();

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.rebuilt, 1);
    assert_eq!(extractor.calls(), calls, "file times did not change");

    let db = lib.snapshot();
    assert_eq!(db.images("louvre").len(), 1);
    assert!(store.read("2015-06 Paris").directory_timestamp.unwrap_or(0) > 0);
}

#[test]
fn test_force_reload_extracts_everything_again() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);
    lib.load(opts()).unwrap();

    let stats = lib
        .load(LoadOptions {
            force_reload: true,
            ..opts()
        })
        .unwrap();
    assert_eq!(stats.rebuilt, 3);
    assert_eq!(extractor.calls(), 8);
}

#[test]
fn test_corrupt_snapshot_is_rebuilt() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);
    lib.load(opts()).unwrap();
    let calls = extractor.calls();

    fs::write(tree.index().join("misc").join(INDEX_BIN), b"\x01garbage").unwrap();

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.rebuilt, 1);
    assert_eq!(extractor.calls(), calls + 1);
    assert_eq!(lib.snapshot().images("julien devin").len(), 1);
}

#[test]
fn test_without_update_disk_nothing_is_written() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);

    let stats = lib
        .load(LoadOptions {
            update_disk: false,
            ..opts()
        })
        .unwrap();
    assert_eq!(stats.images, 3);
    assert!(!tree.index().exists());
}

#[test]
fn test_failed_extraction_keeps_image() {
    let tree = PhotoTree::new();
    tree.add("album/a.jpg").add("album/b.jpg");
    let extractor = Arc::new(
        TableExtractor::new()
            .with("a.jpg", &["chat"], "2012-01-01T00:00:00Z")
            .failing_on("b.jpg"),
    );
    let lib = library(&tree, &extractor);

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.images, 2);
    assert_eq!(stats.failed, 0);

    let db = lib.snapshot();
    let album = &db.directories()[db.directory_index("album").unwrap()];
    let b = album.images.iter().find(|i| i.name == "b.jpg").unwrap();
    assert!(b.keywords.is_empty());
    assert_eq!(b.item_time, b.file_time, "capture time falls back to file time");
}

#[test]
fn test_directories_ranked_by_index_time() {
    let tree = PhotoTree::new();
    tree.add_dir("a").add_dir("b");
    let extractor = Arc::new(TableExtractor::new());

    // Snapshots stamped in the future are fresh; they are trusted as is
    let store = SnapshotStore::new(tree.index());
    let stamped = |year: i32, name: &str, kwd: &str| {
        let mut item = StoredItem::image(name);
        item.file_timestamp = Some(1_000_000);
        item.keywords = vec![kwd.to_string()];
        photoidx::StoredDirectory {
            directory_timestamp: Some(at(&format!("{}-01-01T00:00:00Z", year)).timestamp_millis()),
            items: vec![item],
            sub_directories: Vec::new(),
        }
    };
    store.write("a", &stamped(2101, "y.jpg", "later")).unwrap();
    store.write("b", &stamped(2100, "x.jpg", "sooner")).unwrap();

    let lib = library(&tree, &extractor);
    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.rebuilt, 1, "only the root had no snapshot");
    assert_eq!(extractor.calls(), 0);

    let db = lib.snapshot();
    let order: Vec<&str> = db.directories().iter().map(|d| d.rel_pat.as_str()).collect();
    assert_eq!(order, vec!["", "b", "a"]);

    let all = names(lib.query("sooner, later", &ParseOptions::default()));
    assert!(all.is_empty(), "no image has both keywords");
    assert_eq!(names(lib.query("x.jpg", &ParseOptions::default())), vec!["b/x.jpg"]);
    assert_eq!(db.image_at(0).map(|i| i.name.as_str()), Some("x.jpg"));
    assert_eq!(db.image_at(1).map(|i| i.name.as_str()), Some("y.jpg"));
}

#[test]
fn test_reload_swaps_snapshot() {
    let (tree, extractor) = paris_tree();
    let lib = library(&tree, &extractor);
    lib.load(opts()).unwrap();
    let before = lib.snapshot();

    tree.add("new album/d.jpg");
    lib.reload().unwrap();
    let after = lib.snapshot();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.image_count(), 3, "readers keep the snapshot they hold");
    assert_eq!(after.image_count(), 4);
}

#[test]
fn test_missing_originals_fails() {
    let tree = PhotoTree::new();
    fs::remove_dir(tree.originals()).unwrap();
    let lib = Library::new(Config::new(tree.root()));
    assert!(lib.load(opts()).is_err());
    assert_eq!(lib.snapshot().image_count(), 0);
}

#[cfg(unix)]
#[test]
fn test_unlistable_entry_is_skipped() {
    let (tree, extractor) = paris_tree();
    // Not a regular file, so it is walked like an album and fails to list
    std::os::unix::fs::symlink("/dev/null", tree.originals().join("broken")).unwrap();
    let lib = library(&tree, &extractor);

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.directories, 3);
    assert_eq!(stats.images, 3);

    let db = lib.snapshot();
    assert!(db.directory_index("broken").is_none());
    assert_eq!(db.images("paris").len(), 1);
}

#[test]
fn test_single_worker_walks_wide_tree() {
    let tree = PhotoTree::new();
    for i in 0..40 {
        tree.add(&format!("album {:02}/img{:02}.jpg", i, i))
            .add_dir(&format!("album {:02}/nested", i));
    }
    let extractor = Arc::new(TableExtractor::new());
    let mut config = Config::new(tree.root());
    config.loader.workers = 1;
    let lib = Library::new(config).with_extractor(extractor.clone());

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.directories, 81, "root, 40 albums and 40 nested directories");
    assert_eq!(stats.images, 40);
    assert_eq!(stats.failed, 0);
    assert_eq!(extractor.calls(), 40);

    let db = lib.snapshot();
    assert_eq!(db.image_count(), 40);
    assert!(db.directory_index("album 39/nested").is_some());
}

#[test]
fn test_failed_persistence_keeps_loading() {
    let (tree, extractor) = paris_tree();
    // Snapshots cannot be written below a plain file
    fs::write(tree.index(), b"not a directory").unwrap();
    let lib = library(&tree, &extractor);

    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.images, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(lib.snapshot().images("louvre").len(), 1);

    // Nothing was persisted, so the next load rebuilds again
    let stats = lib.load(opts()).unwrap();
    assert_eq!(stats.rebuilt, 3);
    assert!(tree.index().is_file());
}
