//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Config;
use crate::database::{ImageRef, Library};
use crate::models::{ImageId, LoadOptions, Rank};
use crate::output;
use crate::query::SubKeywordMode;

/// photoidx: keyword search over a photo directory tree
#[derive(Parser, Debug)]
#[command(
    name = "photoidx",
    version,
    about = "Keyword, album and date search over a tree of photo directories",
    long_about = "photoidx walks a photo tree, keeps per-directory metadata snapshots \
                  under the index directory and answers keyword, album and date \
                  queries in a stable order.\n\n\
                  Paths and defaults come from config.toml in the library root."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Library root holding config.toml (defaults to current directory)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Explicit config file (defaults to <root>/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default config.toml into the library root
    Init,

    /// Walk the photo tree, refresh stale snapshots and build the index
    Load {
        /// Rebuild every directory, ignoring snapshot timestamps
        #[arg(short, long)]
        force: bool,

        /// Do not write refreshed snapshots back to the index directory
        #[arg(long)]
        no_update_disk: bool,

        /// Suppress the progress spinner and summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Search images
    ///
    /// Tokens are and-ed together. Each token is, in order of precedence:
    ///   count:N          images with exactly N keywords
    ///   stereo:          images with stereo offsets
    ///   album:PATH       every image of one album
    ///   albums:          the first image of every album
    ///   2019, 2019-07, 2019-07-14
    ///                    taken in that period, or tagged with that word
    ///   2015--2019       taken from the start of 2015 to the start of 2019
    ///   "julien devin"   exact keyword
    ///   anything else    any keyword containing the word
    ///
    /// Examples:
    ///   photoidx query '"paris" 2019'
    ///   photoidx query 'julien devin, 2017'
    Query {
        /// Query text
        text: String,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,

        /// Maximum number of results to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Expand known person names on quoted tokens (synonyms.txt)
        #[arg(long)]
        synonyms: bool,

        /// Drop images carrying this keyword (repeatable)
        #[arg(long, value_name = "KEYWORD")]
        exclude: Vec<String>,

        /// Feed keyword lookups the literal-first merge (results may be unordered)
        #[arg(long)]
        compat_subkeywords: bool,
    },

    /// List indexed keywords containing a pattern, shortest first
    Keywords {
        /// Substring to look for (case-sensitive)
        pattern: String,

        /// Maximum number of keywords to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only whole keywords, not words split out of them
        #[arg(long)]
        no_subkeywords: bool,
    },

    /// Show one image by id
    Image {
        /// Image id as printed by `query`
        id: ImageId,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keywords used in albums modified during the last month
    Recent {
        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Show keyword and image counts
    Stats {
        /// Also list every keyword with its image count
        #[arg(long)]
        keywords: bool,
    },
}

/// Image as shown to users
#[derive(Debug, Serialize)]
struct ImageView {
    id: ImageId,
    rank: Rank,
    album: String,
    name: String,
    keywords: Vec<String>,
    item_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stereo: bool,
}

impl From<&ImageRef> for ImageView {
    fn from(img: &ImageRef) -> Self {
        Self {
            id: img.id,
            rank: img.rank,
            album: img.directory().rel_pat.clone(),
            name: img.name.clone(),
            keywords: img.keywords.clone(),
            item_time: img.item_time,
            stereo: img.stereo.is_some(),
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",  // Default: only warnings and errors
            1 => "info",  // -v: show info messages
            2 => "debug", // -vv: show debug messages
            _ => "trace", // -vvv: show trace messages
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        if let Command::Init = self.command {
            return handle_init(&self.root);
        }

        let config = Config::load(&self.root, self.config.as_deref())
            .context("Failed to load configuration")?;

        match self.command {
            Command::Init => Ok(()),
            Command::Load {
                force,
                no_update_disk,
                quiet,
            } => handle_load(config, force, no_update_disk, quiet),
            Command::Query {
                text,
                json,
                pretty,
                limit,
                synonyms,
                exclude,
                compat_subkeywords,
            } => handle_query(config, &text, json, pretty, limit, synonyms, exclude, compat_subkeywords),
            Command::Keywords {
                pattern,
                limit,
                no_subkeywords,
            } => handle_keywords(config, &pattern, limit, no_subkeywords),
            Command::Image { id, json } => handle_image(config, id, json),
            Command::Recent { json, pretty } => handle_recent(config, json, pretty),
            Command::Stats { keywords } => handle_stats(config, keywords),
        }
    }
}

/// Load the library with the configured options
fn open_library(config: Config, show_progress: bool) -> Result<Library> {
    let opts = config.loader.load_options();
    let library = Library::new(config).with_progress(show_progress);
    library.load(opts)?;
    Ok(library)
}

/// Handle the `init` subcommand
fn handle_init(root: &Path) -> Result<()> {
    if Config::write_default(root)? {
        output::success(&format!("Wrote {}", root.join(crate::config::CONFIG_TOML).display()));
    } else {
        output::warn("config.toml already exists; left unchanged.");
    }
    Ok(())
}

/// Handle the `load` subcommand
fn handle_load(config: Config, force: bool, no_update_disk: bool, quiet: bool) -> Result<()> {
    let opts = LoadOptions {
        update_disk: config.loader.update_disk && !no_update_disk,
        minify: config.loader.minify,
        force_reload: config.loader.force_reload || force,
    };
    log::info!("Loading library from {:?}", config.originals_dir());

    let start = Instant::now();
    let library = Library::new(config).with_progress(!quiet);
    let stats = library.load(opts)?;

    if !quiet {
        println!(
            "Loaded {} albums, {} images ({} rebuilt, {} skipped) in {} ms",
            stats.directories,
            stats.images,
            stats.rebuilt,
            stats.failed,
            start.elapsed().as_millis()
        );
        if stats.failed > 0 {
            output::warn(&format!(
                "{} directories could not be listed; run with -v for details.",
                stats.failed
            ));
        }
    }
    Ok(())
}

/// Handle the `query` subcommand
#[allow(clippy::too_many_arguments)]
fn handle_query(
    config: Config,
    text: &str,
    json: bool,
    pretty: bool,
    limit: Option<usize>,
    synonyms: bool,
    exclude: Vec<String>,
    compat_subkeywords: bool,
) -> Result<()> {
    let mut opts = config.query.parse_options();
    opts.expand_synonyms = synonyms;
    opts.exclude = exclude;
    if compat_subkeywords {
        opts.subkeyword_mode = SubKeywordMode::PriorityMerged;
    }

    let library = open_library(config, false)?;
    let start = Instant::now();
    let results: Vec<ImageView> = library
        .query(text, &opts)
        .take(limit.unwrap_or(usize::MAX))
        .map(|img| ImageView::from(&img))
        .collect();
    log::info!("Query returned {} images in {} ms", results.len(), start.elapsed().as_millis());

    if json {
        let json_output = if pretty {
            serde_json::to_string_pretty(&results)?
        } else {
            serde_json::to_string(&results)?
        };
        println!("{}", json_output);
        return Ok(());
    }

    if results.is_empty() {
        output::warn("No images matched.");
        return Ok(());
    }
    for img in &results {
        println!(
            "{:>10}  {}  {}/{}  [{}]",
            img.id,
            img.item_time.format("%Y-%m-%d %H:%M"),
            img.album,
            img.name,
            img.keywords.join(", ")
        );
    }
    Ok(())
}

/// Handle the `keywords` subcommand
fn handle_keywords(config: Config, pattern: &str, limit: Option<usize>, no_subkeywords: bool) -> Result<()> {
    let library = open_library(config, false)?;
    let db = library.snapshot();
    for kwd in db
        .matching_keywords(pattern, !no_subkeywords)
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
    {
        println!("{}", kwd);
    }
    Ok(())
}

/// Handle the `image` subcommand
fn handle_image(config: Config, id: ImageId, json: bool) -> Result<()> {
    let library = open_library(config, false)?;
    let db = library.snapshot();
    let Some(rank) = db.indexer().rank_of(id) else {
        anyhow::bail!("No image with id {}", id);
    };
    let img = ImageRef::new(db, rank).with_context(|| format!("Image {} vanished from the index", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*img)?);
        return Ok(());
    }

    println!("Id:         {}", img.id);
    println!("Rank:       {}", img.rank);
    println!("Album:      {}", img.directory().rel_pat);
    println!("Name:       {}", img.name);
    println!("Keywords:   {}", img.keywords.join(", "));
    if !img.sub_keywords.is_empty() {
        println!("Words:      {}", img.sub_keywords.join(", "));
    }
    println!("Taken:      {}", img.item_time.to_rfc3339());
    println!("Modified:   {}", img.file_time.to_rfc3339());
    if img.rotate_degrees != 0 {
        println!("Rotation:   {}", img.rotate_degrees);
    }
    if let Some(stereo) = img.stereo {
        println!(
            "Stereo:     dx={} dy={} ana_dx={} ana_dy={}",
            stereo.dx, stereo.dy, stereo.ana_dx, stereo.ana_dy
        );
    }
    Ok(())
}

/// Handle the `recent` subcommand
fn handle_recent(config: Config, json: bool, pretty: bool) -> Result<()> {
    let library = open_library(config, false)?;
    let db = library.snapshot();
    let recent = db.recent_keywords(Utc::now());

    if json {
        let json_output = if pretty {
            serde_json::to_string_pretty(&recent)?
        } else {
            serde_json::to_string(&recent)?
        };
        println!("{}", json_output);
        return Ok(());
    }

    if recent.is_empty() {
        output::info("No album was modified during the last month.");
        return Ok(());
    }
    for entry in &recent {
        let names: Vec<&str> = entry.images.iter().map(|img| img.name.as_str()).collect();
        println!("{:>5}  {}  ({})", entry.count, entry.keyword, names.join(", "));
    }
    Ok(())
}

/// Handle the `stats` subcommand
fn handle_stats(config: Config, keywords: bool) -> Result<()> {
    let library = open_library(config, false)?;
    let db = library.snapshot();

    println!("photoidx Index Statistics");
    println!("=========================");
    println!("Albums:         {}", db.directories().len());
    println!("Images:         {}", db.image_count());
    println!("Keywords:       {}", db.indexer().keyword_count());
    println!("People:         {}", db.synonyms().len());

    if keywords {
        println!();
        print!("{}", db.indexer());
    }
    Ok(())
}
