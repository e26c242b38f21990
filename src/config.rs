//! Library configuration (`config.toml`)
//!
//! Every section is optional. A missing file or section falls back to the
//! defaults below, so an empty library root works out of the box.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::loader::DEFAULT_WORKERS;
use crate::models::{offset_hours, LoadOptions};
use crate::query::{ParseOptions, SubKeywordMode};

/// Config file name inside the library root
pub const CONFIG_TOML: &str = "config.toml";

/// Where sources, snapshots and static files live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the photo tree
    #[serde(default = "default_originals")]
    pub originals: PathBuf,

    /// Root of the per-directory snapshots
    #[serde(default = "default_index")]
    pub index: PathBuf,

    /// Directory holding synonyms.txt
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,
}

fn default_originals() -> PathBuf {
    PathBuf::from("originals")
}

fn default_index() -> PathBuf {
    PathBuf::from("index")
}

fn default_static_root() -> PathBuf {
    PathBuf::from("static")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            originals: default_originals(),
            index: default_index(),
            static_root: default_static_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_true")]
    pub update_disk: bool,

    #[serde(default)]
    pub minify: bool,

    #[serde(default)]
    pub force_reload: bool,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_true() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            update_disk: true,
            minify: false,
            force_reload: false,
        }
    }
}

impl LoaderConfig {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            update_disk: self.update_disk,
            minify: self.minify,
            force_reload: self.force_reload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Fixed offset for date tokens and dates in album names
    #[serde(default = "default_timezone_offset_hours")]
    pub timezone_offset_hours: i32,

    /// Fuzzy keyword expansion keeps at most this many matches per token character
    #[serde(default = "default_fuzzy_expansion_factor")]
    pub fuzzy_expansion_factor: usize,

    #[serde(default = "default_true")]
    pub include_subkeywords: bool,
}

fn default_timezone_offset_hours() -> i32 {
    -8
}

fn default_fuzzy_expansion_factor() -> usize {
    10
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timezone_offset_hours: default_timezone_offset_hours(),
            fuzzy_expansion_factor: default_fuzzy_expansion_factor(),
            include_subkeywords: true,
        }
    }
}

impl QueryConfig {
    pub fn offset(&self) -> FixedOffset {
        offset_hours(self.timezone_offset_hours)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            expand_synonyms: false,
            subkeyword_mode: if self.include_subkeywords {
                SubKeywordMode::RankMerged
            } else {
                SubKeywordMode::Literal
            },
            fuzzy_expansion_factor: self.fuzzy_expansion_factor,
            offset: self.offset(),
            exclude: Vec::new(),
        }
    }
}

/// Full configuration of one library root
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory relative paths are resolved against
    pub root: PathBuf,
    pub paths: PathsConfig,
    pub loader: LoaderConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Default configuration rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            paths: PathsConfig::default(),
            loader: LoaderConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Load `config_path`, or `<root>/config.toml` when `None`.
    ///
    /// Falls back to defaults if the file doesn't exist or a section is missing.
    pub fn load(root: impl AsRef<Path>, config_path: Option<&Path>) -> Result<Self> {
        let root = root.as_ref();
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(CONFIG_TOML));

        let mut config = Self::new(root);
        if !config_path.exists() {
            log::debug!("No config file at {:?}, using defaults", config_path);
            return Ok(config);
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {:?}", config_path))?;
        let toml_value: toml::Value = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {:?}", config_path))?;

        config.paths = section(&toml_value, "paths")?;
        config.loader = section(&toml_value, "loader")?;
        config.query = section(&toml_value, "query")?;
        log::debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Write a commented default config to `<root>/config.toml`.
    ///
    /// An existing file is left alone; returns whether a file was written.
    pub fn write_default(root: impl AsRef<Path>) -> Result<bool> {
        let root = root.as_ref();
        let config_path = root.join(CONFIG_TOML);
        if config_path.exists() {
            return Ok(false);
        }

        let default_config = r#"[paths]
originals = "originals"  # Photo tree to index
index = "index"          # Per-directory snapshots (index.bin + index.json)
static_root = "static"   # Holds synonyms.txt

[loader]
workers = 3
update_disk = true   # Persist rebuilt snapshots
minify = false
force_reload = false # Rebuild every directory on each load

[query]
timezone_offset_hours = -8  # Fixed offset for date tokens
fuzzy_expansion_factor = 10 # Max fuzzy matches per token character
include_subkeywords = true
"#;

        std::fs::create_dir_all(root).with_context(|| format!("Failed to create {:?}", root))?;
        std::fs::write(&config_path, default_config)
            .with_context(|| format!("Failed to write {:?}", config_path))?;

        log::debug!("Created default {:?}", config_path);
        Ok(true)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.resolve(&self.paths.originals)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.resolve(&self.paths.index)
    }

    pub fn static_dir(&self) -> PathBuf {
        self.resolve(&self.paths.static_root)
    }
}

fn section<T: DeserializeOwned + Default>(value: &toml::Value, name: &str) -> Result<T> {
    match value.get(name) {
        Some(table) => table
            .clone()
            .try_into()
            .with_context(|| format!("Failed to parse [{}] section", name)),
        None => {
            log::debug!("No [{}] section in config.toml, using defaults", name);
            Ok(T::default())
        }
    }
}
