//! photoidx: keyword index over a tree of photo directories
//!
//! photoidx walks a photo tree, keeps a per-directory snapshot of image
//! metadata next to it, and builds an in-memory index answering keyword,
//! album and date queries in a stable, deterministic order.
//!
//! # Architecture
//!
//! - **Loader**: walks the tree with a small worker pool; rebuilds stale snapshots
//! - **Indexer**: ranks every image and builds keyword postings in rank order
//! - **Query Engine**: compiles query text into lazy, rank-ordered stream operators
//! - **Library**: holds the live database and swaps in a new one on reload
//!
//! # Example Usage
//!
//! ```no_run
//! use photoidx::{Config, Library, ParseOptions};
//!
//! let config = Config::load("/srv/photos", None).unwrap();
//! let library = Library::new(config);
//! library.load(library.config().loader.load_options()).unwrap();
//!
//! for image in library.query("\"paris\" 2019", &ParseOptions::default()) {
//!     println!("{}/{}", image.directory().rel_pat, image.name);
//! }
//! ```

pub mod accents;
pub mod cli;
pub mod config;
pub mod database;
pub mod file_times;
pub mod indexer;
pub mod loader;
pub mod metadata;
pub mod models;
pub mod output;
pub mod query;
pub mod store;
pub mod synonyms;
pub mod update;

// Re-export commonly used types
pub use config::Config;
pub use database::{Database, ImageRef, Library, RecentKeyword};
pub use indexer::Indexer;
pub use loader::{LoadStats, Loader};
pub use metadata::{FileTimeExtractor, MetadataExtractor, Minifier};
pub use models::{Directory, Image, ImageId, LoadOptions, Rank, Stereo};
pub use query::{parse_query, ParseOptions, Query, QueryBuilder, SubKeywordMode};
pub use store::{SnapshotStore, StoredDirectory, StoredItem};
pub use synonyms::Synonyms;
