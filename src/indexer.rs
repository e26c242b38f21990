//! Indexing engine for loaded directories
//!
//! The indexer walks the directory list once, in order, assigning every image
//! its id and rank and registering it under its keywords. Because images are
//! visited in rank order, every postings list comes out sorted ascending by
//! rank without an explicit sort.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::accents::AccentFolder;
use crate::models::{time_to_millis, Directory, ImageId, Rank};

/// Compute the identity of an image from where it lives and when it changed
pub fn image_id(rel_pat: &str, name: &str, file_millis: i64) -> ImageId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(rel_pat.as_bytes());
    hasher.update(name.as_bytes());
    hasher.update(file_millis.to_string().as_bytes());
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Position of an image inside the directory list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub directory: u32,
    pub position: u32,
}

/// Keyword postings and rank lookups for one build
#[derive(Debug, Default)]
pub struct Indexer {
    images_by_keyword: HashMap<String, Arc<[Rank]>>,
    images_by_subkeyword: HashMap<String, Arc<[Rank]>>,
    images_by_id: HashMap<ImageId, Rank>,
    /// rank → id
    ids: Vec<ImageId>,
    /// rank → location
    locations: Vec<Location>,
}

/// Postings under construction, preallocated from the keyword counts
struct PostingsBuilder {
    postings: HashMap<String, Vec<Rank>>,
}

impl PostingsBuilder {
    fn with_counts(counts: HashMap<String, usize>) -> Self {
        let postings = counts
            .into_iter()
            .map(|(kwd, n)| (kwd, Vec::with_capacity(n)))
            .collect();
        Self { postings }
    }

    fn add(&mut self, kwd: &str, rank: Rank) {
        let list = match self.postings.get_mut(kwd) {
            Some(list) => list,
            None => {
                log::debug!("Unregistered keyword: {:?}", kwd);
                self.postings.entry(kwd.to_string()).or_default()
            }
        };
        // The same image can reach a key twice, e.g. through a keyword and
        // its folded spelling
        if list.last() != Some(&rank) {
            list.push(rank);
        }
    }

    fn finish(self) -> HashMap<String, Arc<[Rank]>> {
        self.postings
            .into_iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(kwd, list)| (kwd, Arc::from(list)))
            .collect()
    }
}

/// Visit every key an image is registered under.
///
/// `keyword` receives the folded file name, each literal keyword and each
/// folded keyword that differs; `sub` receives sub-keywords both ways.
fn for_each_key(
    folder: &mut AccentFolder,
    name: &str,
    keywords: &[String],
    sub_keywords: &[String],
    mut keyword: impl FnMut(&str),
    mut sub: impl FnMut(&str),
) {
    keyword(&folder.fold(name));
    for kwd in keywords {
        keyword(kwd);
        let folded = folder.fold(kwd);
        if *folded != **kwd {
            keyword(&folded);
        }
    }
    for kwd in sub_keywords {
        sub(kwd);
        let folded = folder.fold(kwd);
        if *folded != **kwd {
            sub(&folded);
        }
    }
}

impl Indexer {
    /// Build the index over `directories`, in order.
    ///
    /// Sets the id and rank of every image and returns the image count.
    pub fn build(directories: &mut [Directory]) -> (Self, usize) {
        let start = Instant::now();
        let mut folder = AccentFolder::with_capacity(4096);

        // Keyword interning: count occurrences so postings can be preallocated
        let mut keyword_counts: HashMap<String, usize> = HashMap::new();
        let mut subkeyword_counts: HashMap<String, usize> = HashMap::new();
        for img in directories.iter().flat_map(|d| d.images.iter()) {
            for_each_key(
                &mut folder,
                &img.name,
                &img.keywords,
                &img.sub_keywords,
                |k| *keyword_counts.entry(k.to_string()).or_insert(0) += 1,
                |k| *subkeyword_counts.entry(k.to_string()).or_insert(0) += 1,
            );
        }

        let mut keywords = PostingsBuilder::with_counts(keyword_counts);
        let mut subkeywords = PostingsBuilder::with_counts(subkeyword_counts);
        let mut ids = Vec::new();
        let mut locations = Vec::new();
        let mut rank: Rank = 0;

        for (dir_index, dir) in directories.iter_mut().enumerate() {
            for (position, img) in dir.images.iter_mut().enumerate() {
                img.id = image_id(&dir.rel_pat, &img.name, time_to_millis(img.file_time));
                img.rank = rank;
                ids.push(img.id);
                locations.push(Location {
                    directory: dir_index as u32,
                    position: position as u32,
                });

                for_each_key(
                    &mut folder,
                    &img.name,
                    &img.keywords,
                    &img.sub_keywords,
                    |k| keywords.add(k, rank),
                    |k| subkeywords.add(k, rank),
                );
                rank += 1;
            }
        }

        let mut images_by_id = HashMap::with_capacity(ids.len());
        for (rank, id) in ids.iter().enumerate() {
            images_by_id.insert(*id, rank as Rank);
        }

        let count = ids.len();
        let indexer = Self {
            images_by_keyword: keywords.finish(),
            images_by_subkeyword: subkeywords.finish(),
            images_by_id,
            ids,
            locations,
        };

        log::info!(
            "Indexed {} images, {} keywords in {} ms",
            count,
            indexer.keyword_count(),
            start.elapsed().as_millis()
        );
        (indexer, count)
    }

    /// Literal keyword postings, rank ordered
    pub fn postings(&self, kwd: &str) -> Option<Arc<[Rank]>> {
        self.images_by_keyword.get(kwd).cloned()
    }

    /// Sub-keyword postings, rank ordered
    pub fn sub_postings(&self, kwd: &str) -> Option<Arc<[Rank]>> {
        self.images_by_subkeyword.get(kwd).cloned()
    }

    /// Ranks registered under `kwd`, literal matches first.
    ///
    /// Sub-keyword matches follow, skipping ids already produced. Each half is
    /// rank ordered but the whole is not.
    pub fn images(&self, kwd: &str) -> Vec<Rank> {
        let literal = self.images_by_keyword.get(kwd);
        let sub = self.images_by_subkeyword.get(kwd);

        let mut seen: HashSet<ImageId> = HashSet::new();
        let mut result = Vec::with_capacity(
            literal.map_or(0, |l| l.len()) + sub.map_or(0, |s| s.len()),
        );
        for &rank in literal.into_iter().chain(sub).flat_map(|list| list.iter()) {
            if seen.insert(self.ids[rank as usize]) {
                result.push(rank);
            }
        }
        result
    }

    /// Ranks registered under `kwd` in either table, as one ascending list
    pub fn images_ranked(&self, kwd: &str) -> Vec<Rank> {
        let literal = self.images_by_keyword.get(kwd).map_or(&[][..], |l| &l[..]);
        let sub = self.images_by_subkeyword.get(kwd).map_or(&[][..], |s| &s[..]);
        merge_sorted(literal, sub)
    }

    /// Registered keywords containing `pattern`, shortest first
    pub fn matching_keywords(&self, pattern: &str, include_subkeywords: bool) -> Vec<String> {
        let mut matches: Vec<&String> = self
            .images_by_keyword
            .keys()
            .filter(|k| k.contains(pattern))
            .collect();

        if include_subkeywords {
            let known: HashSet<&String> = matches.iter().copied().collect();
            let extra: Vec<&String> = self
                .images_by_subkeyword
                .keys()
                .filter(|k| k.contains(pattern) && !known.contains(k))
                .collect();
            matches.extend(extra);
        }

        matches.sort_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)));
        matches.into_iter().cloned().collect()
    }

    /// Rank of the image with `id`
    pub fn rank_of(&self, id: ImageId) -> Option<Rank> {
        self.images_by_id.get(&id).copied()
    }

    /// Where the image of `rank` lives
    pub fn location(&self, rank: Rank) -> Option<Location> {
        self.locations.get(rank as usize).copied()
    }

    pub fn id_of(&self, rank: Rank) -> Option<ImageId> {
        self.ids.get(rank as usize).copied()
    }

    pub fn image_count(&self) -> usize {
        self.ids.len()
    }

    /// Number of distinct keys across both tables
    pub fn keyword_count(&self) -> usize {
        let extra = self
            .images_by_subkeyword
            .keys()
            .filter(|k| !self.images_by_keyword.contains_key(*k))
            .count();
        self.images_by_keyword.len() + extra
    }

    /// `(keyword, postings length)` for the literal table, most used first
    pub fn keyword_histogram(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .images_by_keyword
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts
    }
}

impl fmt::Display for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (kwd, n) in self.keyword_histogram() {
            writeln!(f, "{}: {}", kwd, n)?;
        }
        Ok(())
    }
}

/// Union of two ascending rank lists, without duplicates
fn merge_sorted(a: &[Rank], b: &[Rank]) -> Vec<Rank> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{offset_hours, Image};
    use chrono::{TimeZone, Utc};

    fn img(name: &str, kwds: &[&str]) -> Image {
        let t = Utc.timestamp_opt(1_000, 0).unwrap();
        Image::new(name, kwds.iter().map(|s| s.to_string()).collect(), t, t)
    }

    fn dir(rel: &str, images: Vec<Image>) -> Directory {
        Directory::new(rel, Utc.timestamp_opt(0, 0).unwrap(), images, offset_hours(0))
    }

    fn fixture() -> Vec<Directory> {
        vec![
            dir(
                "a",
                vec![
                    img("1.jpg", &["paris", "julien devin"]),
                    img("2.jpg", &["Été", "devin"]),
                    img("3.jpg", &["été", "paris"]),
                ],
            ),
            dir("b", vec![img("1.jpg", &["devin", "julien"]), img("2.jpg", &["parisien"])]),
        ]
    }

    #[test]
    fn test_ranks_are_a_permutation_in_order() {
        let mut dirs = fixture();
        let (indexer, count) = Indexer::build(&mut dirs);

        assert_eq!(count, 5);
        assert_eq!(indexer.image_count(), 5);
        let ranks: Vec<Rank> = dirs.iter().flat_map(|d| d.images.iter().map(|i| i.rank)).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);

        for d in &dirs {
            for i in &d.images {
                assert_eq!(indexer.rank_of(i.id), Some(i.rank));
                assert_eq!(indexer.id_of(i.rank), Some(i.id));
            }
        }
        assert_eq!(
            indexer.location(3),
            Some(Location {
                directory: 1,
                position: 0
            })
        );
    }

    #[test]
    fn test_ids_differ_by_directory() {
        let mut dirs = fixture();
        Indexer::build(&mut dirs);
        assert_ne!(dirs[0].images[0].id, dirs[1].images[0].id);
        assert_eq!(image_id("a", "1.jpg", 1_000_000), dirs[0].images[0].id);
    }

    #[test]
    fn test_postings_sorted_without_duplicates() {
        let mut dirs = fixture();
        let (indexer, _) = Indexer::build(&mut dirs);

        for kwd in ["paris", "devin", "ete", "été", "Été", "julien"] {
            for list in [indexer.postings(kwd), indexer.sub_postings(kwd)].into_iter().flatten() {
                assert!(list.windows(2).all(|w| w[0] < w[1]), "{} not ascending", kwd);
            }
        }

        // "Été" and "été" both fold to "ete"; image 2 registers once
        assert_eq!(&*indexer.postings("ete").unwrap(), &[1, 2]);
        assert_eq!(&*indexer.postings("Été").unwrap(), &[1]);
        // File names are registered folded
        assert_eq!(&*indexer.postings("1.jpg").unwrap(), &[0, 3]);
    }

    #[test]
    fn test_subkeywords_in_separate_table() {
        let mut dirs = fixture();
        let (indexer, _) = Indexer::build(&mut dirs);

        assert_eq!(&*indexer.postings("devin").unwrap(), &[1, 3]);
        assert_eq!(&*indexer.sub_postings("devin").unwrap(), &[0]);
        assert!(indexer.postings("julien devin").is_some());
    }

    #[test]
    fn test_images_priority_merge() {
        let mut dirs = fixture();
        let (indexer, _) = Indexer::build(&mut dirs);

        // Literal matches first, then sub-keyword matches
        assert_eq!(indexer.images("devin"), vec![1, 3, 0]);
        assert_eq!(indexer.images_ranked("devin"), vec![0, 1, 3]);
        assert!(indexer.images("nothing").is_empty());
    }

    #[test]
    fn test_matching_keywords() {
        let mut dirs = fixture();
        let (indexer, _) = Indexer::build(&mut dirs);

        let found = indexer.matching_keywords("paris", false);
        assert_eq!(found, vec!["paris", "parisien"]);

        let with_sub = indexer.matching_keywords("ulien", true);
        assert_eq!(with_sub, vec!["julien", "julien devin"]);

        for kwd in indexer.matching_keywords("e", true) {
            assert!(kwd.contains('e'));
        }
        let lens: Vec<usize> = indexer
            .matching_keywords("e", true)
            .iter()
            .map(|k| k.chars().count())
            .collect();
        assert!(lens.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_matching_keywords_counts_characters() {
        let mut dirs = vec![dir("x", vec![img("x.jpg", &["abc", "aé"])])];
        let (indexer, _) = Indexer::build(&mut dirs);
        // "aé" is three bytes but two characters, so it sorts before "abc"
        assert_eq!(indexer.matching_keywords("a", false), vec!["ae", "aé", "abc"]);
    }

    #[test]
    fn test_display_dump() {
        let mut dirs = fixture();
        let (indexer, _) = Indexer::build(&mut dirs);
        let dump = indexer.to_string();
        assert!(dump.lines().any(|l| l == "paris: 2"));
        assert!(indexer.keyword_count() > 0);
    }

    #[test]
    fn test_empty_build() {
        let mut dirs: Vec<Directory> = Vec::new();
        let (indexer, count) = Indexer::build(&mut dirs);
        assert_eq!(count, 0);
        assert!(indexer.images("x").is_empty());
        assert!(indexer.matching_keywords("", true).is_empty());
    }
}
