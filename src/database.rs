//! Database snapshots and the live library handle
//!
//! A [`Database`] is immutable once built: the sorted directory list, the
//! index over it and the alias table. A [`Library`] holds the current
//! snapshot behind one pointer; a reload builds a complete new database and
//! replaces the pointer in a single store, so readers see either the old or
//! the new snapshot and never a mix.

use anyhow::Result;
use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::config::Config;
use crate::indexer::{Indexer, Location};
use crate::loader::{LoadStats, Loader};
use crate::metadata::{FileTimeExtractor, MetadataExtractor, Minifier};
use crate::models::{Directory, Image, ImageId, LoadOptions, Rank};
use crate::query::{parse_query, ParseOptions, Query};
use crate::store::SnapshotStore;
use crate::synonyms::Synonyms;

/// Images kept per keyword in the recent keywords summary
const RECENT_IMAGES_PER_KEYWORD: usize = 4;

/// One fully built, read-only index
#[derive(Debug, Default)]
pub struct Database {
    directories: Vec<Directory>,
    indexer: Indexer,
    synonyms: Synonyms,
}

impl Database {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index `directories` in the order given
    pub fn from_directories(mut directories: Vec<Directory>, synonyms: Synonyms) -> Self {
        let (indexer, _) = Indexer::build(&mut directories);
        Self {
            directories,
            indexer,
            synonyms,
        }
    }

    /// Load the source tree described by `config` and index it.
    ///
    /// `minifier` runs after indexing when `opts.minify` is set; its failure
    /// is logged and does not fail the load.
    pub fn load(
        config: &Config,
        opts: LoadOptions,
        extractor: Arc<dyn MetadataExtractor>,
        minifier: Option<&dyn Minifier>,
        show_progress: bool,
    ) -> Result<(Self, LoadStats)> {
        let loader = Loader::new(config.originals_dir(), SnapshotStore::new(config.index_dir()))
            .with_workers(config.loader.workers)
            .with_offset(config.query.offset())
            .with_extractor(extractor)
            .with_progress(show_progress);
        let (directories, stats) = loader.load(opts)?;

        let synonyms = match Synonyms::load(&config.static_dir()) {
            Ok(synonyms) => synonyms,
            Err(e) => {
                log::warn!("Ignoring synonyms: {:#}", e);
                Synonyms::new()
            }
        };

        let start = Instant::now();
        let db = Self::from_directories(directories, synonyms);
        log::info!(
            "Database ready: {} directories, {} images ({} ms to index)",
            db.directories.len(),
            db.image_count(),
            start.elapsed().as_millis()
        );

        if opts.minify {
            match minifier {
                Some(minifier) => match minifier.minify(&db) {
                    Ok(n) => log::info!("Minified {} images", n),
                    Err(e) => log::warn!("Minify failed: {:#}", e),
                },
                None => log::info!("Minify requested but no minifier is installed"),
            }
        }

        Ok((db, stats))
    }

    /// Directories in rank order
    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn synonyms(&self) -> &Synonyms {
        &self.synonyms
    }

    pub fn image_count(&self) -> usize {
        self.indexer.image_count()
    }

    fn at(&self, location: Location) -> Option<&Image> {
        self.directories
            .get(location.directory as usize)
            .and_then(|d| d.images.get(location.position as usize))
    }

    /// Image of `rank`
    pub fn image_at(&self, rank: Rank) -> Option<&Image> {
        self.indexer.location(rank).and_then(|loc| self.at(loc))
    }

    /// Image with identity `id`
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.indexer.rank_of(id).and_then(|rank| self.image_at(rank))
    }

    /// Images under `kwd`, literal matches first (see [`Indexer::images`])
    pub fn images(&self, kwd: &str) -> Vec<&Image> {
        self.indexer
            .images(kwd)
            .into_iter()
            .filter_map(|rank| self.image_at(rank))
            .collect()
    }

    pub fn matching_keywords(&self, pattern: &str, include_subkeywords: bool) -> Vec<String> {
        self.indexer.matching_keywords(pattern, include_subkeywords)
    }

    /// Position of the directory named `rel_pat`
    pub fn directory_index(&self, rel_pat: &str) -> Option<usize> {
        self.directories.iter().position(|d| d.rel_pat == rel_pat)
    }

    /// Keywords used in directories modified during the month before `now`.
    ///
    /// Sorted by use count, most used first, then by keyword.
    pub fn recent_keywords(&self, now: DateTime<Utc>) -> Vec<RecentKeyword<'_>> {
        let since = now
            .checked_sub_months(Months::new(1))
            .unwrap_or(now - Duration::days(30));

        let mut by_keyword: HashMap<&str, (usize, Vec<&Image>)> = HashMap::new();
        for dir in self.directories.iter().filter(|d| d.last_modified > since) {
            for img in &dir.images {
                for kwd in img.keywords.iter().chain(img.sub_keywords.iter()) {
                    if kwd.is_empty() {
                        continue;
                    }
                    let entry = by_keyword.entry(kwd.as_str()).or_default();
                    entry.0 += 1;
                    entry.1.push(img);
                }
            }
        }

        let mut recent: Vec<RecentKeyword<'_>> = by_keyword
            .into_iter()
            .map(|(keyword, (count, mut images))| {
                images.sort_by(|a, b| b.item_time.cmp(&a.item_time));
                images.truncate(RECENT_IMAGES_PER_KEYWORD);
                RecentKeyword {
                    keyword: keyword.to_string(),
                    count,
                    images,
                }
            })
            .collect();
        recent.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
        recent
    }
}

/// One entry of the recent keywords summary
#[derive(Debug, Serialize)]
pub struct RecentKeyword<'a> {
    pub keyword: String,
    pub count: usize,
    /// Most recent images first
    pub images: Vec<&'a Image>,
}

/// A handle on one image that keeps its database snapshot alive
#[derive(Debug, Clone)]
pub struct ImageRef {
    db: Arc<Database>,
    location: Location,
}

impl ImageRef {
    pub fn new(db: Arc<Database>, rank: Rank) -> Option<Self> {
        let location = db.indexer.location(rank)?;
        db.at(location)?;
        Some(Self { db, location })
    }

    pub fn rank(&self) -> Rank {
        self.image().rank
    }

    pub fn image(&self) -> &Image {
        &self.db.directories[self.location.directory as usize].images[self.location.position as usize]
    }

    pub fn directory(&self) -> &Directory {
        &self.db.directories[self.location.directory as usize]
    }
}

impl Deref for ImageRef {
    type Target = Image;

    fn deref(&self) -> &Image {
        self.image()
    }
}

impl PartialEq for ImageRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.db, &other.db) && self.location == other.location
    }
}

/// The live database of a library, replaced wholesale on reload
pub struct Library {
    config: Config,
    extractor: Arc<dyn MetadataExtractor>,
    minifier: Option<Arc<dyn Minifier>>,
    show_progress: bool,
    current: RwLock<Arc<Database>>,
}

impl Library {
    /// A library over `config`, starting with an empty database
    pub fn new(config: Config) -> Self {
        Self {
            config,
            extractor: Arc::new(FileTimeExtractor),
            minifier: None,
            show_progress: false,
            current: RwLock::new(Arc::new(Database::empty())),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_minifier(mut self, minifier: Arc<dyn Minifier>) -> Self {
        self.minifier = Some(minifier);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current snapshot. Holding it keeps it alive across reloads.
    pub fn snapshot(&self) -> Arc<Database> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install `db` as the current snapshot, returning the previous one
    pub fn swap(&self, db: Database) -> Arc<Database> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(db))
    }

    /// Build a fresh database and swap it in
    pub fn load(&self, opts: LoadOptions) -> Result<LoadStats> {
        let (db, stats) = Database::load(
            &self.config,
            opts,
            Arc::clone(&self.extractor),
            self.minifier.as_deref(),
            self.show_progress,
        )?;
        self.swap(db);
        Ok(stats)
    }

    /// Reload with disk updates and minification
    pub fn reload(&self) -> Result<LoadStats> {
        self.load(LoadOptions {
            update_disk: true,
            minify: true,
            force_reload: false,
        })
    }

    /// Parse `text` against the current snapshot
    pub fn query(&self, text: &str, opts: &ParseOptions) -> Query {
        parse_query(self.snapshot(), text, opts)
    }
}
