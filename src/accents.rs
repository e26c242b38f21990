//! Diacritic folding for keyword matching
//!
//! Keywords and file names are registered in the index both as written and
//! in a folded form (lowercased, accents stripped) so that a query for
//! "ete" finds images tagged "Été". The mapping is a fixed table of the
//! accented lowercase Latin-1 letters that appear in the photo archive.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Accented lowercase letter → unaccented ASCII letter
const ACCENT_TABLE: &[(char, char)] = &[
    ('à', 'a'),
    ('â', 'a'),
    ('é', 'e'),
    ('è', 'e'),
    ('ê', 'e'),
    ('ë', 'e'),
    ('î', 'i'),
    ('ï', 'i'),
    ('ô', 'o'),
    ('ù', 'u'),
    ('û', 'u'),
    ('ü', 'u'),
    ('ç', 'c'),
];

#[inline]
fn base_letter(c: char) -> Option<char> {
    ACCENT_TABLE
        .iter()
        .find(|(accented, _)| *accented == c)
        .map(|(_, base)| *base)
}

/// Fold a string without caching.
///
/// Returns the input borrowed when it is already lowercase and contains no
/// accented letter, so the common case allocates nothing.
pub fn fold_accents(s: &str) -> Cow<'_, str> {
    let lower: Cow<'_, str> = if s.chars().any(|c| c.is_uppercase()) {
        Cow::Owned(s.to_lowercase())
    } else {
        Cow::Borrowed(s)
    };

    if !lower.chars().any(|c| base_letter(c).is_some()) {
        return lower;
    }

    let folded: String = lower
        .chars()
        .map(|c| base_letter(c).unwrap_or(c))
        .collect();
    Cow::Owned(folded)
}

/// Memoizing accent folder shared across one index build.
///
/// The cache is keyed by the string as given (before lowercasing), so the
/// same spelling is only folded once per build.
#[derive(Debug, Default)]
pub struct AccentFolder {
    cache: HashMap<String, Arc<str>>,
}

impl AccentFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a folder with room for `capacity` distinct inputs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(capacity),
        }
    }

    /// Fold `s`, returning the shared cached result.
    ///
    /// Repeated calls with the same input return the same allocation and do
    /// not grow the cache.
    pub fn fold(&mut self, s: &str) -> Arc<str> {
        if let Some(hit) = self.cache.get(s) {
            return Arc::clone(hit);
        }

        let folded: Arc<str> = Arc::from(fold_accents(s).as_ref());
        self.cache.insert(s.to_string(), Arc::clone(&folded));
        folded
    }

    /// Number of distinct inputs folded so far
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold_accents("Été"), "ete");
        assert_eq!(fold_accents("garçon"), "garcon");
        assert_eq!(fold_accents("Noël à Névache"), "noel a nevache");
    }

    #[test]
    fn test_fold_borrows_when_unchanged() {
        let s = "paris 2019";
        match fold_accents(s) {
            Cow::Borrowed(b) => assert!(std::ptr::eq(b, s)),
            Cow::Owned(_) => panic!("expected a borrowed result for an already-folded string"),
        }
    }

    #[test]
    fn test_fold_leaves_unknown_letters() {
        // Letters outside the table are only lowercased
        assert_eq!(fold_accents("ÅNGSTRÖM"), "ångström");
    }

    #[test]
    fn test_fold_idempotent() {
        for s in ["Été", "ça va", "déjà vu", "plain", "MIXED Case", "ÜBER"] {
            let once = fold_accents(s).into_owned();
            let twice = fold_accents(&once).into_owned();
            assert_eq!(once, twice, "folding {:?} twice changed it", s);
        }
    }

    #[test]
    fn test_cache_is_stable() {
        let mut folder = AccentFolder::new();

        let first = folder.fold("Crème Brûlée");
        assert_eq!(&*first, "creme brulee");
        assert_eq!(folder.len(), 1);

        let second = folder.fold("Crème Brûlée");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(folder.len(), 1);
    }

    #[test]
    fn test_cache_keyed_by_original_spelling() {
        let mut folder = AccentFolder::with_capacity(4);

        let a = folder.fold("Été");
        let b = folder.fold("été");
        assert_eq!(a, b);
        assert_eq!(folder.len(), 2);
    }
}
