//! The interning dictionary shared between encoder and decoder.
//!
//! A dictionary is an ordered table of words with a fixed base offset.
//! Absolute indices (base + position) are what travels on the wire, so
//! indices never shift once a word is in and insertion is append-only.
//!
//! Two tiers are in play per codec instance: an optional read-only
//! *seed* table agreed out-of-band by both peers, and a runtime
//! *extended* table whose base is stacked on the seed's end. Lookups
//! check the seed first; insertions always land in the extended table.

use crate::constructor::DICTIONARY_BASE;
use std::collections::HashMap;

/// An ordered word table with absolute, never-shifting indices.
#[derive(Debug, Clone)]
pub struct Dictionary {
    base: usize,
    words: Vec<String>,
    index: HashMap<String, usize>,
}

impl Dictionary {
    /// Create an empty dictionary with the standard base offset.
    pub fn new() -> Self {
        Dictionary::with_base(DICTIONARY_BASE)
    }

    /// Create an empty dictionary whose first word will take the
    /// absolute index `base`.
    pub fn with_base(base: usize) -> Self {
        Dictionary {
            base,
            words: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Create a seed dictionary from an ordered word list.
    ///
    /// Both peers must build their seed from the same list in the same
    /// order, or dictionary indices will not resolve consistently.
    pub fn from_words<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        let mut dict = Dictionary::new();
        for word in words {
            dict.insert_owned(word.into());
        }
        dict
    }

    /// The absolute index of the first word.
    pub fn base(&self) -> usize {
        self.base
    }

    /// The number of words in this tier.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether this tier holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// One past the last occupied absolute index;
    /// the base for a tier stacked on top of this one.
    pub fn end(&self) -> usize {
        self.base + self.words.len()
    }

    /// Insert a word, returning its absolute index.
    ///
    /// Inserting a word already present is a no-op returning the
    /// existing index.
    pub fn insert(&mut self, word: &str) -> usize {
        if let Some(&local) = self.index.get(word) {
            return self.base + local;
        }
        self.insert_owned(word.to_owned())
    }

    fn insert_owned(&mut self, word: String) -> usize {
        if let Some(&local) = self.index.get(&word) {
            return self.base + local;
        }
        let local = self.words.len();
        self.index.insert(word.clone(), local);
        self.words.push(word);
        self.base + local
    }

    /// The absolute index of `word`, if present.
    pub fn index_of(&self, word: &str) -> Option<usize> {
        self.index.get(word).map(|local| self.base + local)
    }

    /// The word at the absolute index, if it falls in this tier.
    pub fn word_at(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(self.base)
            .and_then(|local| self.words.get(local))
            .map(String::as_str)
    }

    /// Whether `word` is present in this tier.
    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Dictionary::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_word_takes_the_base_index() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.insert("alpha"), 1);
        assert_eq!(dict.insert("beta"), 2);
        assert_eq!(dict.index_of("alpha"), Some(1));
        assert_eq!(dict.word_at(2), Some("beta"));
        assert_eq!(dict.word_at(0), None);
        assert_eq!(dict.word_at(3), None);
    }

    #[test]
    fn insertion_is_idempotent() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.insert("alpha"), 1);
        assert_eq!(dict.insert("alpha"), 1);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn stacked_tier_continues_the_index_space() {
        let seed = Dictionary::from_words(vec!["id", "name", "tags"]);
        assert_eq!(seed.end(), 4);

        let mut extended = Dictionary::with_base(seed.end());
        assert_eq!(extended.insert("extra"), 4);
        assert_eq!(seed.index_of("name"), Some(2));
        assert_eq!(extended.word_at(4), Some("extra"));
        // the seed does not resolve extended indices and vice versa
        assert_eq!(seed.word_at(4), None);
        assert_eq!(extended.word_at(2), None);
    }
}
