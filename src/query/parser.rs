//! Query text compilation
//!
//! Each token is matched against an ordered list of rules; the first rule
//! whose predicate accepts the token builds its node. Several rules can
//! accept the same token (a year is also a plain word), so the order is part
//! of the language. The per-token nodes are and-ed together.

use chrono::FixedOffset;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use super::tokenizer::tokenize;
use super::{Node, Query, QueryBuilder};
use crate::database::Database;
use crate::models::offset_hours;

/// How keyword leaves use the sub-keyword table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubKeywordMode {
    /// Whole keywords only
    Literal,
    /// Whole keywords and sub-keywords, merged in rank order
    #[default]
    RankMerged,
    /// Whole keywords first, then sub-keywords ([`crate::Indexer::images`]).
    ///
    /// The result is not rank ordered, so `and`/`or` over such leaves can
    /// miss or repeat images. Kept for compatibility.
    PriorityMerged,
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Expand person names on exact (quoted) keyword tokens
    pub expand_synonyms: bool,
    pub subkeyword_mode: SubKeywordMode,
    /// Fuzzy expansion keeps at most this many keywords per token character
    pub fuzzy_expansion_factor: usize,
    /// Fixed offset date tokens are read in
    pub offset: FixedOffset,
    /// Keywords no result may carry
    pub exclude: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            expand_synonyms: false,
            subkeyword_mode: SubKeywordMode::default(),
            fuzzy_expansion_factor: 10,
            offset: offset_hours(-8),
            exclude: Vec::new(),
        }
    }
}

/// A token and its lowercase form
struct Token<'a> {
    raw: &'a str,
    lower: String,
}

impl<'a> Token<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            lower: raw.to_lowercase(),
        }
    }

    /// Raw text after a prefix matched on the lowercase form
    fn after(&self, prefix: &str) -> &'a str {
        self.raw.get(prefix.len()..).unwrap_or("")
    }
}

struct Compiler<'o> {
    builder: QueryBuilder,
    opts: &'o ParseOptions,
}

struct Rule {
    name: &'static str,
    accepts: fn(&Token) -> bool,
    build: fn(&Compiler, &Token) -> Node,
}

struct DateShapes {
    year: Regex,
    month: Regex,
    day: Regex,
    year_range: Regex,
}

impl DateShapes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            year: Regex::new(r"^\d{4}$")?,
            month: Regex::new(r"^\d{4}-\d\d$")?,
            day: Regex::new(r"^\d{4}-\d\d-\d\d$")?,
            year_range: Regex::new(r"^\d{4}--\d{4}$")?,
        })
    }
}

fn date_shapes() -> Option<&'static DateShapes> {
    static SHAPES: OnceLock<Option<DateShapes>> = OnceLock::new();
    SHAPES
        .get_or_init(|| match DateShapes::compile() {
            Ok(shapes) => Some(shapes),
            Err(e) => {
                log::warn!("Date patterns unavailable: {}", e);
                None
            }
        })
        .as_ref()
}

#[derive(Clone, Copy)]
enum Shape {
    Year,
    Month,
    Day,
    YearRange,
}

fn shape_matches(token: &Token, shape: Shape) -> bool {
    date_shapes().is_some_and(|shapes| {
        let re = match shape {
            Shape::Year => &shapes.year,
            Shape::Month => &shapes.month,
            Shape::Day => &shapes.day,
            Shape::YearRange => &shapes.year_range,
        };
        re.is_match(token.raw)
    })
}

const RULES: &[Rule] = &[
    Rule {
        name: "count",
        accepts: |t| t.lower.starts_with("count:"),
        build: |c, t| c.builder.keyword_count(t.after("count:")),
    },
    Rule {
        name: "stereo",
        accepts: |t| t.lower.starts_with("stereo:"),
        build: |c, _| c.builder.stereo(),
    },
    Rule {
        name: "quoted album",
        accepts: |t| t.lower.starts_with("\"album:"),
        build: |c, t| c.builder.directory_by_name(t.after("\"album:")),
    },
    Rule {
        name: "album",
        accepts: |t| t.lower.starts_with("album:"),
        build: |c, t| c.builder.directory_by_name(t.after("album:")),
    },
    Rule {
        name: "albums",
        accepts: |t| t.raw == "albums:",
        build: |c, _| c.builder.directories(),
    },
    Rule {
        name: "year",
        accepts: |t| shape_matches(t, Shape::Year),
        build: |c, t| c.builder.or(vec![c.builder.year(t.raw), c.builder.keyword(t.raw)]),
    },
    Rule {
        name: "month",
        accepts: |t| shape_matches(t, Shape::Month),
        build: |c, t| c.builder.or(vec![c.builder.month(t.raw), c.builder.keyword(t.raw)]),
    },
    Rule {
        name: "day",
        accepts: |t| shape_matches(t, Shape::Day),
        build: |c, t| c.builder.or(vec![c.builder.day(t.raw), c.builder.keyword(t.raw)]),
    },
    Rule {
        name: "year range",
        accepts: |t| shape_matches(t, Shape::YearRange),
        build: |c, t| c.builder.year_range(t.raw),
    },
    Rule {
        name: "exact",
        accepts: |t| t.lower.starts_with('"'),
        build: |c, t| c.exact(&t.lower[1..]),
    },
    Rule {
        name: "fuzzy",
        accepts: |_| true,
        build: |c, t| c.fuzzy(&t.lower),
    },
];

impl Compiler<'_> {
    fn compile(&self, raw: &str) -> Node {
        let token = Token::new(raw);
        let rule = RULES.iter().find(|r| (r.accepts)(&token))?;
        log::trace!("Token {:?} -> {}", raw, rule.name);
        (rule.build)(self, &token)
    }

    fn exact(&self, kwd: &str) -> Node {
        if self.opts.expand_synonyms {
            self.builder.synonyms(kwd)
        } else {
            self.builder.keyword(kwd)
        }
    }

    /// Or of every keyword containing `pattern`, capped by the pattern length
    fn fuzzy(&self, pattern: &str) -> Node {
        let include_sub = self.opts.subkeyword_mode != SubKeywordMode::Literal;
        let mut kwds = self.builder.db().matching_keywords(pattern, include_sub);
        if kwds.is_empty() {
            return self.builder.nothing();
        }

        let cap = self.opts.fuzzy_expansion_factor * pattern.chars().count();
        kwds.truncate(cap.max(1));
        let nodes = kwds.iter().map(|k| self.builder.keyword(k)).collect();
        self.builder.or(nodes)
    }
}

/// Compile `text` into a query over `db`.
///
/// Never fails: a token no specific rule accepts becomes a fuzzy keyword
/// search, and malformed dates or counts match nothing.
pub fn parse_query(db: Arc<Database>, text: &str, opts: &ParseOptions) -> Query {
    let builder = QueryBuilder::new(db)
        .with_subkeyword_mode(opts.subkeyword_mode)
        .with_offset(opts.offset);
    let compiler = Compiler { builder, opts };

    let mut nodes: Vec<Node> = tokenize(text).iter().map(|t| compiler.compile(t)).collect();
    if !opts.exclude.is_empty() && !nodes.is_empty() {
        let excluded: HashSet<String> = opts.exclude.iter().cloned().collect();
        nodes.push(compiler.builder.not_keywords(excluded));
    }

    let root = compiler.builder.and(nodes);
    compiler.builder.build(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Directory, Image, Rank};
    use crate::synonyms::Synonyms;
    use chrono::{DateTime, Utc};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn img(name: &str, kwds: &[&str], taken: &str) -> Image {
        let t = at(taken);
        Image::new(name, kwds.iter().map(|s| s.to_string()).collect(), t, t)
    }

    fn db() -> Arc<Database> {
        Arc::new(Database::from_directories(
            vec![
                Directory::new(
                    "trips/rome",
                    at("2000-01-01T00:00:00Z"),
                    vec![
                        img("a.jpg", &["rome", "colisée"], "2015-06-01T12:00:00Z"),
                        img("b.jpg", &["rome", "2016"], "2015-06-02T12:00:00Z"),
                    ],
                    offset_hours(0),
                ),
                Directory::new(
                    "trips/romans",
                    at("2001-01-01T00:00:00Z"),
                    vec![
                        img("a.jpg", &["romans sur isere"], "2016-03-01T12:00:00Z"),
                        img("b.jpg", &["x", "y", "z"], "2016-03-02T12:00:00Z"),
                    ],
                    offset_hours(0),
                ),
            ],
            Synonyms::parse("rome,roma\n"),
        ))
    }

    fn run(text: &str) -> Vec<Rank> {
        let opts = ParseOptions {
            offset: offset_hours(0),
            ..Default::default()
        };
        parse_query(db(), text, &opts).map(|i| i.rank).collect()
    }

    #[test]
    fn test_rule_precedence() {
        // A year token is both a date range and a literal keyword
        assert_eq!(run("2016"), vec![1, 2, 3]);
        assert_eq!(run("2015--2016"), vec![0, 1]);
        assert_eq!(run("2016-03"), vec![2, 3]);
        assert_eq!(run("2016-03-02"), vec![3]);
        assert_eq!(run("count:3"), vec![3]);
        assert_eq!(run("COUNT:1"), vec![2]);
        assert_eq!(run("album:trips/romans"), vec![2, 3]);
        assert_eq!(run("\"album:trips/rome\""), vec![0, 1]);
        assert_eq!(run("albums:"), vec![0, 2]);
        assert!(run("stereo:").is_empty());
    }

    #[test]
    fn test_exact_and_fuzzy() {
        assert_eq!(run("\"rome\""), vec![0, 1]);
        assert_eq!(run("\"ROME"), vec![0, 1]);
        // Fuzzy "rom" also finds "romans sur isere" and its sub-keyword
        assert_eq!(run("rom"), vec![0, 1, 2]);
        assert_eq!(run("colis"), vec![0]);
        assert!(run("nothing-like-this").is_empty());
    }

    #[test]
    fn test_tokens_are_anded() {
        assert_eq!(run("rome 2016"), vec![1]);
        assert_eq!(run("rome, 2015"), vec![0, 1]);
        assert!(run("rome 2016-03").is_empty());
        assert!(run("").is_empty());
    }

    #[test]
    fn test_malformed_date_falls_back_to_keyword() {
        // Not a valid month, and not a keyword either
        assert!(run("2016-13").is_empty());
        // An invalid month in a conjunction empties it
        assert!(run("rome 2016-13").is_empty());
    }

    #[test]
    fn test_fuzzy_cap() {
        let opts = ParseOptions {
            fuzzy_expansion_factor: 0,
            ..Default::default()
        };
        // The cap never drops below one keyword; the shortest wins
        let ranks: Vec<Rank> = parse_query(db(), "rom", &opts).map(|i| i.rank).collect();
        assert_eq!(ranks, vec![0, 1]);
    }

    #[test]
    fn test_synonyms_opt_in() {
        let opts = ParseOptions {
            expand_synonyms: true,
            ..Default::default()
        };
        let ranks: Vec<Rank> = parse_query(db(), "\"roma", &opts).map(|i| i.rank).collect();
        assert_eq!(ranks, vec![0, 1]);

        let plain: Vec<Rank> = parse_query(db(), "\"roma", &ParseOptions::default())
            .map(|i| i.rank)
            .collect();
        assert!(plain.is_empty());
    }

    #[test]
    fn test_exclude() {
        let opts = ParseOptions {
            exclude: vec!["colisée".to_string()],
            ..Default::default()
        };
        let ranks: Vec<Rank> = parse_query(db(), "rome", &opts).map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1]);
    }
}
