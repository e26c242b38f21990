//! Rank-ordered stream operators
//!
//! Every query node is a pull-based stream of ranks. Leaves read postings or
//! scan the database; `And` and `Or` merge their children. All nodes of one
//! query share a [`CancelToken`]: once it is set every node reports
//! exhaustion on its next pull.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::database::Database;
use crate::models::{Image, Rank};

/// A single-pass stream of ranks, ascending unless documented otherwise
pub trait RankStream: Send {
    fn next_rank(&mut self) -> Option<Rank>;
}

pub type BoxStream = Box<dyn RankStream>;

/// Shared stop flag for all nodes of one query
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Streams a postings list in its stored order
pub struct PostingsStream {
    ranks: Arc<[Rank]>,
    pos: usize,
    cancel: CancelToken,
}

impl PostingsStream {
    pub fn new(ranks: Arc<[Rank]>, cancel: CancelToken) -> Self {
        Self {
            ranks,
            pos: 0,
            cancel,
        }
    }
}

impl RankStream for PostingsStream {
    fn next_rank(&mut self) -> Option<Rank> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let rank = self.ranks.get(self.pos).copied()?;
        self.pos += 1;
        Some(rank)
    }
}

/// First image of every non-empty directory, in directory order
pub struct DirectoriesStream {
    db: Arc<Database>,
    next_dir: usize,
    cancel: CancelToken,
}

impl DirectoriesStream {
    pub fn new(db: Arc<Database>, cancel: CancelToken) -> Self {
        Self {
            db,
            next_dir: 0,
            cancel,
        }
    }
}

impl RankStream for DirectoriesStream {
    fn next_rank(&mut self) -> Option<Rank> {
        while !self.cancel.is_cancelled() {
            let dir = self.db.directories().get(self.next_dir)?;
            self.next_dir += 1;
            if let Some(first) = dir.images.first() {
                return Some(first.rank);
            }
        }
        None
    }
}

/// Every image of one directory
pub struct DirectoryStream {
    db: Arc<Database>,
    dir: usize,
    pos: usize,
    cancel: CancelToken,
}

impl DirectoryStream {
    pub fn new(db: Arc<Database>, dir: usize, cancel: CancelToken) -> Self {
        Self {
            db,
            dir,
            pos: 0,
            cancel,
        }
    }
}

impl RankStream for DirectoryStream {
    fn next_rank(&mut self) -> Option<Rank> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let img = self.db.directories().get(self.dir)?.images.get(self.pos)?;
        self.pos += 1;
        Some(img.rank)
    }
}

pub type ImageFilter = Box<dyn Fn(&Image) -> bool + Send>;

/// Linear scan of the whole database in rank order
pub struct FilteredStream {
    db: Arc<Database>,
    next: Rank,
    filter: ImageFilter,
    cancel: CancelToken,
}

impl FilteredStream {
    pub fn new(db: Arc<Database>, filter: ImageFilter, cancel: CancelToken) -> Self {
        Self {
            db,
            next: 0,
            filter,
            cancel,
        }
    }
}

impl RankStream for FilteredStream {
    fn next_rank(&mut self) -> Option<Rank> {
        while !self.cancel.is_cancelled() {
            let img = self.db.image_at(self.next)?;
            self.next += 1;
            if (self.filter)(img) {
                return Some(img.rank);
            }
        }
        None
    }
}

/// Intersection of ascending streams.
///
/// The first stream drives; every other stream keeps one buffered rank and
/// is advanced until it catches up with the driver. A driver rank is emitted
/// when all buffered ranks equal it. Any stream running dry ends the result.
pub struct AndStream {
    driver: BoxStream,
    others: Vec<BoxStream>,
    buffered: Vec<Rank>,
    started: bool,
    done: bool,
    cancel: CancelToken,
}

impl AndStream {
    pub fn new(mut streams: Vec<BoxStream>, cancel: CancelToken) -> Option<Self> {
        if streams.is_empty() {
            return None;
        }
        let driver = streams.remove(0);
        Some(Self {
            driver,
            buffered: Vec::with_capacity(streams.len()),
            others: streams,
            started: false,
            done: false,
            cancel,
        })
    }

    fn fill(&mut self) -> bool {
        for stream in &mut self.others {
            match stream.next_rank() {
                Some(rank) => self.buffered.push(rank),
                None => return false,
            }
        }
        true
    }
}

impl RankStream for AndStream {
    fn next_rank(&mut self) -> Option<Rank> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if !self.fill() {
                self.done = true;
                return None;
            }
        }

        while !self.cancel.is_cancelled() {
            let Some(rank) = self.driver.next_rank() else {
                break;
            };

            let mut same = true;
            for (stream, current) in self.others.iter_mut().zip(self.buffered.iter_mut()) {
                while *current < rank {
                    match stream.next_rank() {
                        Some(next) => *current = next,
                        None => {
                            self.done = true;
                            return None;
                        }
                    }
                }
                if *current != rank {
                    same = false;
                }
            }
            if same {
                return Some(rank);
            }
        }

        self.done = true;
        None
    }
}

/// Union of ascending streams, each rank emitted once
pub struct OrStream {
    streams: Vec<BoxStream>,
    heads: Vec<Option<Rank>>,
    started: bool,
    cancel: CancelToken,
}

impl OrStream {
    pub fn new(streams: Vec<BoxStream>, cancel: CancelToken) -> Self {
        Self {
            heads: Vec::with_capacity(streams.len()),
            streams,
            started: false,
            cancel,
        }
    }
}

impl RankStream for OrStream {
    fn next_rank(&mut self) -> Option<Rank> {
        if self.cancel.is_cancelled() {
            return None;
        }
        if !self.started {
            self.started = true;
            self.heads = self.streams.iter_mut().map(|s| s.next_rank()).collect();
        }

        let min = self.heads.iter().flatten().min().copied()?;
        for (stream, head) in self.streams.iter_mut().zip(self.heads.iter_mut()) {
            if *head == Some(min) {
                *head = stream.next_rank();
            }
        }
        Some(min)
    }
}
