//! Core data models for photoidx
//!
//! A [`Directory`] is one album of the source tree and exclusively owns its
//! [`Image`]s. Both are immutable once a [`Database`](crate::Database) has
//! been built from them; rank and id are assigned during that build.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Identity of an image, a 32-bit hash of directory, name and file time.
///
/// Collisions are possible and are not detected.
pub type ImageId = u32;

/// Position of an image in the global enumeration order of one index build
pub type Rank = u32;

/// Stereo pair offsets attached to an image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stereo {
    pub dx: f32,
    pub dy: f32,
    pub ana_dx: f32,
    pub ana_dy: f32,
}

/// A single indexed image
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    /// Identity hash, set when the index is built
    pub id: ImageId,
    /// Global rank, set when the index is built
    pub rank: Rank,
    /// File name inside the directory
    pub name: String,
    /// Keywords in source order
    pub keywords: Vec<String>,
    /// Single words split out of multi-word keywords, minus existing keywords
    pub sub_keywords: Vec<String>,
    /// File modification time
    pub file_time: DateTime<Utc>,
    /// Best-known capture time
    pub item_time: DateTime<Utc>,
    pub rotate_degrees: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stereo: Option<Stereo>,
}

impl Image {
    /// Create an image, deriving its sub-keywords from `keywords`
    pub fn new(
        name: impl Into<String>,
        keywords: Vec<String>,
        file_time: DateTime<Utc>,
        item_time: DateTime<Utc>,
    ) -> Self {
        let sub_keywords = split_sub_keywords(&keywords);
        Self {
            id: 0,
            rank: 0,
            name: name.into(),
            keywords,
            sub_keywords,
            file_time,
            item_time,
            rotate_degrees: 0,
            stereo: None,
        }
    }

    pub fn with_stereo(mut self, stereo: Stereo) -> Self {
        self.stereo = Some(stereo);
        self
    }

    /// True if `kwd` is one of this image's keywords or sub-keywords
    pub fn has_keyword(&self, kwd: &str) -> bool {
        self.keywords.iter().chain(self.sub_keywords.iter()).any(|k| k == kwd)
    }
}

/// Split multi-word keywords on spaces.
///
/// Words already present as whole keywords, or produced earlier, are skipped.
pub fn split_sub_keywords(keywords: &[String]) -> Vec<String> {
    if !keywords.iter().any(|k| k.contains(' ')) {
        return Vec::new();
    }

    let mut seen: HashSet<&str> = keywords.iter().map(|k| k.as_str()).collect();
    let mut subs = Vec::new();
    for kwd in keywords {
        for word in kwd.split(' ') {
            if !word.is_empty() && seen.insert(word) {
                subs.push(word.to_string());
            }
        }
    }
    subs
}

/// One album directory of the source tree
#[derive(Debug, Clone, Serialize)]
pub struct Directory {
    /// Path relative to the originals root ("" for the root itself)
    pub rel_pat: String,
    /// Timestamp of the last persisted rebuild
    pub index_time: DateTime<Utc>,
    /// Latest file time among the images
    pub last_modified: DateTime<Utc>,
    /// Images, sorted by name once finalized
    #[serde(skip)]
    pub images: Vec<Image>,
}

impl Directory {
    /// Build a finalized directory.
    ///
    /// `offset` is the fixed timezone used to interpret dates guessed from
    /// the directory path.
    pub fn new(
        rel_pat: impl Into<String>,
        index_time: DateTime<Utc>,
        images: Vec<Image>,
        offset: FixedOffset,
    ) -> Self {
        let mut dir = Self {
            rel_pat: rel_pat.into(),
            index_time,
            last_modified: epoch(),
            images,
        };
        dir.finalize(offset);
        dir
    }

    /// Capture time of the album: the first image's, or the index time
    pub fn item_time(&self) -> DateTime<Utc> {
        self.images
            .first()
            .map(|img| img.item_time)
            .unwrap_or(self.index_time)
    }

    fn finalize(&mut self, offset: FixedOffset) {
        self.last_modified = self
            .images
            .iter()
            .map(|img| img.file_time)
            .max()
            .unwrap_or_else(epoch)
            .max(epoch());

        self.images.sort_by(|a, b| a.name.cmp(&b.name));

        // Albums named after a date pin runaway capture times near that date
        if let Some(guessed) = guess_time_from_name(&self.rel_pat, offset) {
            let max_time = guessed + Duration::days(365);
            for (i, img) in self.images.iter_mut().enumerate() {
                if img.item_time > max_time {
                    img.item_time = guessed + Duration::hours(i as i64);
                }
            }
        }
    }
}

/// Guess a date from the components of a relative directory path.
///
/// Components are tried from the last to the first; each is matched by
/// prefix against `YYYY-MM-DD`, `YYYY-MM`, `YYYY` and `Mon D, YYYY`.
pub fn guess_time_from_name(rel_pat: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    rel_pat
        .split('/')
        .rev()
        .find_map(guess_date)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|t| t.with_timezone(&Utc))
}

fn guess_date(component: &str) -> Option<NaiveDate> {
    if let Some(d) = component
        .get(..10)
        .and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok())
    {
        return Some(d);
    }
    if let Some(d) = component
        .get(..7)
        .and_then(|p| NaiveDate::parse_from_str(&format!("{}-01", p), "%Y-%m-%d").ok())
    {
        return Some(d);
    }
    if let Some(year) = component
        .get(..4)
        .filter(|p| p.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|p| p.parse::<i32>().ok())
    {
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    // "Jan  2, 2006" (space padded) and "Jan 12, 2006", then "Jan 2, 2006"
    for len in [12, 11] {
        if let Some(d) = component
            .get(..len)
            .map(|p| p.replace("  ", " "))
            .and_then(|p| NaiveDate::parse_from_str(&p, "%b %d, %Y").ok())
        {
            return Some(d);
        }
    }
    None
}

/// Options of one load cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Persist rebuilt directory snapshots
    pub update_disk: bool,
    /// Run the minifier after indexing
    pub minify: bool,
    /// Rebuild every directory regardless of timestamps
    pub force_reload: bool,
}

/// The Unix epoch, used as the "unknown" time
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Convert stored milliseconds to a time, truncated to whole seconds
pub fn millis_to_time(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(millis / 1000, 0).single().unwrap_or_else(epoch)
}

/// Convert a time to stored milliseconds (whole seconds only)
pub fn time_to_millis(time: DateTime<Utc>) -> i64 {
    1000 * time.timestamp()
}

/// Round a time to the nearest whole second, the precision snapshots keep
pub fn round_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = time.timestamp_subsec_nanos();
    let secs = if nanos >= 500_000_000 {
        time.timestamp() + 1
    } else {
        time.timestamp()
    };
    Utc.timestamp_opt(secs, 0).single().unwrap_or(time)
}

/// Build a fixed offset from whole hours east of UTC, falling back to UTC
pub fn offset_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn pst() -> FixedOffset {
        offset_hours(-8)
    }

    #[test]
    fn test_sub_keywords() {
        let kwds = vec![
            "julien devin".to_string(),
            "devin".to_string(),
            "paris".to_string(),
            "tour  eiffel".to_string(),
        ];
        assert_eq!(split_sub_keywords(&kwds), vec!["julien", "tour", "eiffel"]);
    }

    #[test]
    fn test_sub_keywords_none_without_spaces() {
        let kwds = vec!["a".to_string(), "b".to_string()];
        assert!(split_sub_keywords(&kwds).is_empty());
    }

    #[test]
    fn test_has_keyword_sees_sub_keywords() {
        let img = Image::new("a.jpg", vec!["julien devin".to_string()], t(0), t(0));
        assert!(img.has_keyword("julien devin"));
        assert!(img.has_keyword("devin"));
        assert!(!img.has_keyword("dev"));
    }

    #[test]
    fn test_directory_sorts_and_tracks_last_modified() {
        let dir = Directory::new(
            "trips/misc",
            t(100),
            vec![
                Image::new("b.jpg", vec![], t(50), t(50)),
                Image::new("a.jpg", vec![], t(70), t(70)),
                Image::new("c.jpg", vec![], t(60), t(60)),
            ],
            pst(),
        );
        let names: Vec<&str> = dir.images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(dir.last_modified, t(70));
        assert_eq!(dir.item_time(), t(70));
    }

    #[test]
    fn test_empty_directory_times() {
        let dir = Directory::new("empty", t(100), vec![], pst());
        assert_eq!(dir.last_modified, epoch());
        assert_eq!(dir.item_time(), t(100));
    }

    #[test]
    fn test_guess_time_formats() {
        let day = guess_time_from_name("2019/2019-07-14 fete", pst()).unwrap();
        assert_eq!(day.to_rfc3339(), "2019-07-14T08:00:00+00:00");

        let month = guess_time_from_name("2018-03 ski", pst()).unwrap();
        assert_eq!(month.to_rfc3339(), "2018-03-01T08:00:00+00:00");

        let year = guess_time_from_name("2017", pst()).unwrap();
        assert_eq!(year.to_rfc3339(), "2017-01-01T08:00:00+00:00");

        let named = guess_time_from_name("old/Jan 12, 1999 party", pst()).unwrap();
        assert_eq!(named.to_rfc3339(), "1999-01-12T08:00:00+00:00");

        let padded = guess_time_from_name("Feb  3, 2001", pst()).unwrap();
        assert_eq!(padded.to_rfc3339(), "2001-02-03T08:00:00+00:00");

        assert!(guess_time_from_name("holidays/beach", pst()).is_none());
    }

    #[test]
    fn test_runaway_item_times_are_pinned() {
        let far_future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let ok_time = Utc.with_ymd_and_hms(2010, 6, 1, 0, 0, 0).unwrap();
        let dir = Directory::new(
            "2010-05-01 mai",
            t(0),
            vec![
                Image::new("b.jpg", vec![], t(0), far_future),
                Image::new("a.jpg", vec![], t(0), ok_time),
            ],
            pst(),
        );
        let guessed = Utc.with_ymd_and_hms(2010, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(dir.images[0].item_time, ok_time);
        assert_eq!(dir.images[1].item_time, guessed + Duration::hours(1));
    }

    #[test]
    fn test_millis_roundtrip_truncates() {
        assert_eq!(millis_to_time(1_500), t(1));
        assert_eq!(time_to_millis(t(42)), 42_000);
    }

    #[test]
    fn test_round_to_second() {
        let base = t(10);
        assert_eq!(round_to_second(base + Duration::milliseconds(499)), t(10));
        assert_eq!(round_to_second(base + Duration::milliseconds(500)), t(11));
    }

    #[test]
    fn test_offset_hours() {
        assert_eq!(offset_hours(-8).local_minus_utc(), -8 * 3600);
        assert_eq!(offset_hours(0).local_minus_utc(), 0);
        // Out of range offsets fall back to UTC
        assert_eq!(offset_hours(30).local_minus_utc(), 0);
    }
}
