//! Query engine
//!
//! A [`Query`] is a lazy, single-pass sequence of images in ascending rank
//! order, backed by a tree of [`RankStream`] nodes built with a
//! [`QueryBuilder`]. Builder methods return a [`Node`]: `None` stands for a
//! node that produces nothing (a malformed date, an unknown album). `and`
//! treats such a child as empty, `or` skips it.
//!
//! Dropping a `Query`, or cancelling its token, stops every node.

pub mod ops;
pub mod parser;
pub mod tokenizer;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::database::{Database, ImageRef};
use crate::models::{Image, Rank};

pub use ops::{BoxStream, CancelToken, RankStream};
pub use parser::{parse_query, ParseOptions, SubKeywordMode};
pub use tokenizer::tokenize;

use ops::{AndStream, DirectoriesStream, DirectoryStream, FilteredStream, ImageFilter, OrStream, PostingsStream};

/// A query tree node, `None` when it produces nothing
pub type Node = Option<BoxStream>;

/// Builds query nodes over one database snapshot
pub struct QueryBuilder {
    db: Arc<Database>,
    cancel: CancelToken,
    mode: SubKeywordMode,
    offset: FixedOffset,
}

impl QueryBuilder {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cancel: CancelToken::new(),
            mode: SubKeywordMode::default(),
            offset: crate::models::offset_hours(-8),
        }
    }

    /// How keyword leaves treat sub-keyword postings
    pub fn with_subkeyword_mode(mut self, mode: SubKeywordMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fixed offset used to turn date tokens into time ranges
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn postings(&self, ranks: Arc<[Rank]>) -> Node {
        Some(Box::new(PostingsStream::new(ranks, self.cancel.clone())))
    }

    /// A node that is known to produce nothing
    pub fn nothing(&self) -> Node {
        self.postings(Arc::from(Vec::new()))
    }

    /// Images registered under `kwd`
    pub fn keyword(&self, kwd: &str) -> Node {
        let indexer = self.db.indexer();
        let ranks: Option<Arc<[Rank]>> = match self.mode {
            SubKeywordMode::Literal => indexer.postings(kwd),
            SubKeywordMode::RankMerged => match (indexer.postings(kwd), indexer.sub_postings(kwd)) {
                (Some(literal), None) => Some(literal),
                (None, Some(sub)) => Some(sub),
                (None, None) => None,
                (Some(_), Some(_)) => Some(Arc::from(indexer.images_ranked(kwd))),
            },
            SubKeywordMode::PriorityMerged => Some(Arc::from(indexer.images(kwd))),
        };
        self.postings(ranks.unwrap_or_else(|| Arc::from(Vec::new())))
    }

    /// Images registered under `kwd` as a whole keyword, never a sub-keyword
    pub fn full_keyword(&self, kwd: &str) -> Node {
        self.postings(
            self.db
                .indexer()
                .postings(kwd)
                .unwrap_or_else(|| Arc::from(Vec::new())),
        )
    }

    /// The first image of every non-empty directory
    pub fn directories(&self) -> Node {
        Some(Box::new(DirectoriesStream::new(
            Arc::clone(&self.db),
            self.cancel.clone(),
        )))
    }

    /// Every image of the directory whose relative path is exactly `name`
    pub fn directory_by_name(&self, name: &str) -> Node {
        let dir = self.db.directory_index(name)?;
        Some(Box::new(DirectoryStream::new(
            Arc::clone(&self.db),
            dir,
            self.cancel.clone(),
        )))
    }

    /// Scan of every image, keeping those `filter` accepts
    pub fn filtered(&self, filter: ImageFilter) -> Node {
        Some(Box::new(FilteredStream::new(
            Arc::clone(&self.db),
            filter,
            self.cancel.clone(),
        )))
    }

    /// Images taken in `[start, end)`
    pub fn time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Node {
        self.filtered(Box::new(move |img: &Image| img.item_time >= start && img.item_time < end))
    }

    /// `YYYY`
    pub fn year(&self, token: &str) -> Node {
        let year: i32 = token.parse().ok()?;
        let start = self.local_day(NaiveDate::from_ymd_opt(year, 1, 1)?)?;
        let end = self.local_day(NaiveDate::from_ymd_opt(year + 1, 1, 1)?)?;
        self.time_range(start, end)
    }

    /// `YYYY--YYYY`, from the start of the first year to the start of the second
    pub fn year_range(&self, token: &str) -> Node {
        let (from, to) = token.split_once("--")?;
        let from = self.local_day(NaiveDate::from_ymd_opt(from.parse().ok()?, 1, 1)?)?;
        let to = self.local_day(NaiveDate::from_ymd_opt(to.parse().ok()?, 1, 1)?)?;
        self.time_range(from, to)
    }

    /// `YYYY-MM`
    pub fn month(&self, token: &str) -> Node {
        let first = NaiveDate::parse_from_str(&format!("{}-01", token), "%Y-%m-%d").ok()?;
        let next = first.checked_add_months(Months::new(1))?;
        self.time_range(self.local_day(first)?, self.local_day(next)?)
    }

    /// `YYYY-MM-DD`
    pub fn day(&self, token: &str) -> Node {
        let day = NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()?;
        let start = self.local_day(day)?;
        self.time_range(start, start + Duration::days(1))
    }

    fn local_day(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.offset
            .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Images with exactly `token` keywords
    pub fn keyword_count(&self, token: &str) -> Node {
        let count: usize = token.trim().parse().ok()?;
        self.filtered(Box::new(move |img: &Image| img.keywords.len() == count))
    }

    /// Images with stereo offsets
    pub fn stereo(&self) -> Node {
        self.filtered(Box::new(|img: &Image| img.stereo.is_some()))
    }

    /// Images with none of `excluded` among their keywords and sub-keywords
    pub fn not_keywords(&self, excluded: HashSet<String>) -> Node {
        self.filtered(Box::new(move |img: &Image| {
            !excluded.iter().any(|k| img.has_keyword(k))
        }))
    }

    /// Intersection. An empty child makes the whole result empty.
    pub fn and(&self, nodes: Vec<Node>) -> Node {
        let streams: Vec<BoxStream> = nodes.into_iter().collect::<Option<Vec<_>>>()?;
        match streams.len() {
            0 => None,
            1 => streams.into_iter().next(),
            _ => AndStream::new(streams, self.cancel.clone()).map(|s| Box::new(s) as BoxStream),
        }
    }

    /// Union. Empty children are skipped.
    pub fn or(&self, nodes: Vec<Node>) -> Node {
        let mut streams: Vec<BoxStream> = nodes.into_iter().flatten().collect();
        match streams.len() {
            0 => None,
            1 => streams.pop(),
            _ => Some(Box::new(OrStream::new(streams, self.cancel.clone()))),
        }
    }

    /// Keyword lookup that expands known person names.
    ///
    /// For a name in the alias table this is an `or` over every alias of
    /// (the alias as a whole keyword, the `and` of its words). Other keywords
    /// give a plain keyword node.
    pub fn synonyms(&self, kwd: &str) -> Node {
        let Some(aliases) = self.db.synonyms().aliases(kwd) else {
            return self.keyword(kwd);
        };

        let mut nodes = Vec::with_capacity(2 * aliases.len());
        for alias in aliases {
            nodes.push(self.full_keyword(alias));
            let words = alias.split_whitespace().map(|w| self.full_keyword(w)).collect();
            nodes.push(self.and(words));
        }
        self.or(nodes)
    }

    /// Turn `root` into a query
    pub fn build(self, root: Node) -> Query {
        Query {
            db: self.db,
            root,
            cancel: self.cancel,
        }
    }
}

/// A lazy, single-pass, rank-ordered image sequence
pub struct Query {
    db: Arc<Database>,
    root: Node,
    cancel: CancelToken,
}

impl Query {
    /// A query producing nothing
    pub fn empty(db: Arc<Database>) -> Self {
        QueryBuilder::new(db).build(None)
    }

    /// Token that stops this query from any thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Database snapshot the query reads
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Next matching rank without resolving the image
    pub fn next_rank(&mut self) -> Option<Rank> {
        self.root.as_mut()?.next_rank()
    }
}

impl Iterator for Query {
    type Item = ImageRef;

    fn next(&mut self) -> Option<ImageRef> {
        loop {
            let rank = self.next_rank()?;
            if let Some(img) = ImageRef::new(Arc::clone(&self.db), rank) {
                return Some(img);
            }
            log::warn!("Query produced unknown rank {}", rank);
        }
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
