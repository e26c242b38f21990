//! Person-name alias sets
//!
//! `synonyms.txt` holds one person per line, as comma separated spellings of
//! the same name (`julien devin,julien,jd`). Each table belongs to a single
//! database, so independent databases can carry different aliases.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Alias file name inside the static root
pub const SYNONYMS_FILE: &str = "synonyms.txt";

#[derive(Debug, Clone, Default)]
pub struct Synonyms {
    people: Vec<Vec<String>>,
    /// name → index into `people` (first person wins on duplicates)
    by_name: HashMap<String, usize>,
}

impl Synonyms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse alias sets, one per line
    pub fn parse(text: &str) -> Self {
        let mut synonyms = Self::new();
        for line in text.lines() {
            let names: Vec<String> = line
                .split(',')
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(|n| n.to_string())
                .collect();
            synonyms.add_person(names);
        }
        synonyms
    }

    /// Load `synonyms.txt` from `static_root`. A missing file gives an empty table.
    pub fn load(static_root: &Path) -> Result<Self> {
        let path = static_root.join(SYNONYMS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let synonyms = Self::parse(&text);
                log::info!("Loaded {} people from {:?}", synonyms.len(), path);
                Ok(synonyms)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No synonyms file at {:?}", path);
                Ok(Self::new())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    /// Register one person under all of `names`
    pub fn add_person(&mut self, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        let index = self.people.len();
        for name in &names {
            self.by_name.entry(name.clone()).or_insert(index);
        }
        self.people.push(names);
    }

    /// All spellings of the person known as `name`
    pub fn aliases(&self, name: &str) -> Option<&[String]> {
        self.by_name.get(name).map(|&i| self.people[i].as_slice())
    }

    /// Number of people
    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse() {
        let syns = Synonyms::parse("julien devin, julien,jd\n\n marie ,marie curie\n");
        assert_eq!(syns.len(), 2);
        assert_eq!(
            syns.aliases("jd").unwrap(),
            &["julien devin".to_string(), "julien".to_string(), "jd".to_string()]
        );
        assert_eq!(syns.aliases("marie curie").map(|a| a.len()), Some(2));
        assert!(syns.aliases("paris").is_none());
    }

    #[test]
    fn test_first_person_wins() {
        let syns = Synonyms::parse("a,b\nb,c\n");
        assert_eq!(syns.aliases("b").unwrap()[0], "a");
        assert_eq!(syns.aliases("c").unwrap()[0], "b");
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let syns = Synonyms::load(temp.path()).unwrap();
        assert!(syns.is_empty());
    }

    #[test]
    fn test_load_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SYNONYMS_FILE), "x,y\n").unwrap();
        let syns = Synonyms::load(temp.path()).unwrap();
        assert_eq!(syns.len(), 1);
    }
}
