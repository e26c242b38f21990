//! Concurrent directory loader
//!
//! A fixed pool of worker threads loads directories handed out by a single
//! coordinator. Requests and results travel over two bounded channels whose
//! capacity equals the pool size. The coordinator alternates between a
//! non-blocking hand-off of the next pending directory and a blocking wait
//! for one result, so neither side can fill both channels and stall.
//!
//! Directories are discovered breadth first but complete in any order; the
//! final list is sorted by index time before it is handed to the indexer.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use crossbeam_channel::{bounded, TrySendError};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::file_times::{join_rel, FileTimes, ListedEntry};
use crate::metadata::{FileTimeExtractor, MetadataExtractor};
use crate::models::{millis_to_time, offset_hours, round_to_second, time_to_millis, Directory, LoadOptions};
use crate::store::SnapshotStore;
use crate::update::{classify, materialize, update_directory, EntryKind};

/// Default number of loader workers
pub const DEFAULT_WORKERS: usize = 3;

/// One unit of loader work
#[derive(Debug, Clone)]
struct LoadRequest {
    rel_pat: String,
    /// Last seen modification time of the directory
    mod_time: Option<DateTime<Utc>>,
}

/// A successfully loaded directory
#[derive(Debug)]
struct Loaded {
    directory: Directory,
    entries: Vec<ListedEntry>,
    sub_directories: Vec<String>,
    rebuilt: bool,
}

struct LoadResult {
    rel_pat: String,
    outcome: Result<Loaded>,
}

/// Summary of one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub directories: usize,
    pub images: usize,
    /// Directories whose snapshot was stale and got rebuilt
    pub rebuilt: usize,
    /// Directories that could not be listed
    pub failed: usize,
    pub elapsed_ms: u128,
}

/// Walks a source tree into a list of directories
pub struct Loader {
    originals: PathBuf,
    store: SnapshotStore,
    workers: usize,
    offset: FixedOffset,
    extractor: Arc<dyn MetadataExtractor>,
    show_progress: bool,
}

impl Loader {
    /// Create a loader reading from `originals` and keeping snapshots in `store`
    pub fn new(originals: impl AsRef<Path>, store: SnapshotStore) -> Self {
        Self {
            originals: originals.as_ref().to_path_buf(),
            store,
            workers: DEFAULT_WORKERS,
            offset: offset_hours(-8),
            extractor: Arc::new(FileTimeExtractor),
            show_progress: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fixed offset used to read dates out of directory names
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Load every directory below the originals root.
    ///
    /// Fails only if the root itself cannot be stat'ed. Directories that
    /// cannot be listed are logged and left out.
    pub fn load(&self, opts: LoadOptions) -> Result<(Vec<Directory>, LoadStats)> {
        let start = Instant::now();
        log::info!(
            "Loading {:?} with {} workers (update_disk={}, force_reload={})",
            self.originals,
            self.workers,
            opts.update_disk,
            opts.force_reload
        );

        let root_meta = std::fs::metadata(&self.originals)
            .with_context(|| format!("Cannot read originals directory {:?}", self.originals))?;
        let root_time = root_meta
            .modified()
            .with_context(|| format!("No modification time for {:?}", self.originals))?;

        let mut file_times = FileTimes::new();
        file_times.record_one("", DateTime::<Utc>::from(root_time));

        let pb = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_draw_target(ProgressDrawTarget::stderr());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {pos} directories {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let (req_tx, req_rx) = bounded::<LoadRequest>(self.workers);
        let (res_tx, res_rx) = bounded::<LoadResult>(self.workers);
        let mut directories = Vec::new();
        let mut stats = LoadStats::default();

        std::thread::scope(|s| {
            for worker in 0..self.workers {
                let req_rx = req_rx.clone();
                let res_tx = res_tx.clone();
                s.spawn(move || {
                    for req in req_rx.iter() {
                        let outcome = self.handle_load(&req, opts);
                        if res_tx
                            .send(LoadResult {
                                rel_pat: req.rel_pat,
                                outcome,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    log::trace!("Loader worker {} done", worker);
                });
            }
            drop(req_rx);
            drop(res_tx);

            let mut pending: VecDeque<LoadRequest> = VecDeque::new();
            pending.push_back(LoadRequest {
                rel_pat: String::new(),
                mod_time: file_times.mod_time(""),
            });
            let mut outstanding = 1usize;

            while outstanding > 0 {
                if let Some(req) = pending.pop_front() {
                    match req_tx.try_send(req) {
                        Ok(()) => continue,
                        Err(TrySendError::Full(req)) => pending.push_front(req),
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }

                let Ok(result) = res_rx.recv() else {
                    break;
                };
                outstanding -= 1;
                pb.inc(1);

                match result.outcome {
                    Ok(loaded) => {
                        file_times.record(&result.rel_pat, &loaded.entries);
                        for name in &loaded.sub_directories {
                            let rel_pat = join_rel(&result.rel_pat, name);
                            let mod_time = file_times.mod_time(&rel_pat);
                            pending.push_back(LoadRequest { rel_pat, mod_time });
                            outstanding += 1;
                        }
                        if loaded.rebuilt {
                            stats.rebuilt += 1;
                        }
                        stats.images += loaded.directory.images.len();
                        directories.push(loaded.directory);
                    }
                    Err(e) => {
                        log::warn!("Skipping directory {:?}: {:#}", result.rel_pat, e);
                        stats.failed += 1;
                    }
                }
            }
            drop(req_tx);
        });

        pb.finish_and_clear();

        directories.sort_by(|a, b| {
            a.index_time
                .cmp(&b.index_time)
                .then_with(|| a.rel_pat.cmp(&b.rel_pat))
        });

        stats.directories = directories.len();
        stats.elapsed_ms = start.elapsed().as_millis();
        log::info!(
            "Loaded {} directories ({} images, {} rebuilt, {} failed) from {} entries in {} ms",
            stats.directories,
            stats.images,
            stats.rebuilt,
            stats.failed,
            file_times.len(),
            stats.elapsed_ms
        );
        Ok((directories, stats))
    }

    /// Load one directory, rebuilding its snapshot when stale
    fn handle_load(&self, req: &LoadRequest, opts: LoadOptions) -> Result<Loaded> {
        let mod_time = req
            .mod_time
            .map(round_to_second)
            .with_context(|| format!("No recorded time for {:?}", req.rel_pat))?;

        let abs_path = if req.rel_pat.is_empty() {
            self.originals.clone()
        } else {
            self.originals.join(&req.rel_pat)
        };
        let entries = list_directory(&abs_path)?;

        let mut stored = self.store.read(&req.rel_pat);
        let stale = match stored.directory_timestamp {
            None => true,
            Some(ts) => millis_to_time(ts) < mod_time,
        } || opts.force_reload;

        if stale {
            log::debug!("Rebuilding {:?}", req.rel_pat);
            stored = update_directory(
                &abs_path,
                &entries,
                &stored,
                self.extractor.as_ref(),
                opts.force_reload,
            );
            stored.directory_timestamp = Some(time_to_millis(mod_time));

            if opts.update_disk {
                if let Err(e) = self.store.write(&req.rel_pat, &stored) {
                    log::warn!("Failed to persist {:?}: {:#}", req.rel_pat, e);
                }
            }
        }

        let sub_directories = entries
            .iter()
            .filter(|e| classify(e) == EntryKind::SubDirectory)
            .map(|e| e.name.clone())
            .collect();

        Ok(Loaded {
            directory: materialize(&req.rel_pat, &stored, self.offset),
            entries,
            sub_directories,
            rebuilt: stale,
        })
    }
}

/// List the children of a directory with their modification times.
///
/// Entries whose metadata cannot be read, or whose names are not UTF-8, are
/// logged and skipped.
pub fn list_directory(path: &Path) -> Result<Vec<ListedEntry>> {
    let read_dir =
        std::fs::read_dir(path).with_context(|| format!("Failed to list directory {:?}", path))?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.with_context(|| format!("Failed to list directory {:?}", path))?;
        let Ok(name) = entry.file_name().into_string() else {
            log::warn!("Skipping non UTF-8 name in {:?}", path);
            continue;
        };

        // Follow symlinks so linked albums are walked like real ones
        let meta = match std::fs::metadata(entry.path()) {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("Cannot stat {:?}: {}", entry.path(), e);
                continue;
            }
        };
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        entries.push(ListedEntry {
            name,
            is_file: meta.is_file(),
            modified,
        });
    }
    Ok(entries)
}
