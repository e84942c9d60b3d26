//! Immutable vocabulary and label indices built from model metadata

use beruang_core::{Result, UNK_ID};
use std::collections::HashMap;

/// Token to id mapping used by the vectorizer and the lexical corrector
///
/// Built once at load time and never mutated; shared read-only across
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct VocabularyIndex {
    token_to_id: HashMap<String, u32>,
    /// Known tokens grouped by first character, each group sorted
    by_initial: HashMap<char, Vec<String>>,
    max_vocab_size: usize,
}

impl VocabularyIndex {
    /// Build an index from `(token, id)` pairs.
    ///
    /// Entries carrying a reserved id (PAD/UNK) or an id at or beyond
    /// `max_vocab_size` are left out, so they resolve to UNK.
    pub fn new(entries: impl IntoIterator<Item = (String, u32)>, max_vocab_size: usize) -> Self {
        let mut token_to_id = HashMap::new();
        let mut skipped = 0usize;

        for (token, id) in entries {
            if id <= UNK_ID || id as usize >= max_vocab_size || token.is_empty() {
                skipped += 1;
                continue;
            }
            token_to_id.insert(token, id);
        }

        let mut by_initial: HashMap<char, Vec<String>> = HashMap::new();
        for token in token_to_id.keys() {
            if let Some(initial) = token.chars().next() {
                by_initial.entry(initial).or_default().push(token.clone());
            }
        }
        for group in by_initial.values_mut() {
            group.sort_unstable();
        }

        if skipped > 0 {
            tracing::debug!(
                skipped,
                max_vocab_size,
                "Excluded reserved or out-of-range vocabulary entries"
            );
        }

        Self {
            token_to_id,
            by_initial,
            max_vocab_size,
        }
    }

    /// Build from a raw `wordIndex` document
    pub fn from_word_index(word_index: &HashMap<String, i64>, max_vocab_size: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(word_index.len());
        for (token, &id) in word_index {
            let id = u32::try_from(id).map_err(|_| {
                beruang_core::Error::artifact_corrupt(format!(
                    "wordIndex entry '{}' has invalid id {}",
                    token, id
                ))
            })?;
            entries.push((token.clone(), id));
        }

        let index = Self::new(entries, max_vocab_size);
        if index.is_empty() {
            return Err(beruang_core::Error::artifact_corrupt(
                "wordIndex contains no usable tokens",
            ));
        }
        Ok(index)
    }

    /// Id of a known token
    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Id of a token, or UNK when unresolved
    pub fn id_or_unk(&self, token: &str) -> u32 {
        self.id(token).unwrap_or(UNK_ID)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Known tokens sharing `initial` as first character, in lexicographic order
    pub fn candidates(&self, initial: char) -> &[String] {
        self.by_initial
            .get(&initial)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of resolvable tokens
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    pub fn max_vocab_size(&self) -> usize {
        self.max_vocab_size
    }
}

/// Dense id to label mapping for one output head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIndex {
    labels: Vec<String>,
}

impl LabelIndex {
    /// Build from labels ordered by id
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Build from a metadata label map whose keys are decimal ids.
    ///
    /// Ids must cover `0..N-1` exactly once with non-empty labels.
    pub fn from_map(map: &HashMap<String, String>, name: &str) -> Result<Self> {
        if map.is_empty() {
            return Err(beruang_core::Error::artifact_corrupt(format!(
                "{} is empty",
                name
            )));
        }

        let mut slots: Vec<Option<String>> = vec![None; map.len()];
        for (key, label) in map {
            let id: usize = key.trim().parse().map_err(|_| {
                beruang_core::Error::artifact_corrupt(format!(
                    "{} has non-numeric id '{}'",
                    name, key
                ))
            })?;
            let slot = slots.get_mut(id).ok_or_else(|| {
                beruang_core::Error::artifact_corrupt(format!(
                    "{} ids are not dense: {} out of range 0..{}",
                    name,
                    id,
                    map.len()
                ))
            })?;
            if slot.is_some() {
                return Err(beruang_core::Error::artifact_corrupt(format!(
                    "{} maps id {} more than once",
                    name, id
                )));
            }
            if label.trim().is_empty() {
                return Err(beruang_core::Error::artifact_corrupt(format!(
                    "{} has an empty label for id {}",
                    name, id
                )));
            }
            *slot = Some(label.clone());
        }

        // Every slot is filled: map.len() distinct ids all fell in 0..map.len()
        let labels = slots.into_iter().flatten().collect();
        Ok(Self { labels })
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(words: &[(&str, u32)], max: usize) -> VocabularyIndex {
        VocabularyIndex::new(words.iter().map(|(w, id)| (w.to_string(), *id)), max)
    }

    #[test]
    fn test_reserved_ids_excluded() {
        let index = vocab(&[("<PAD>", 0), ("<UNK>", 1), ("coffee", 2)], 100);
        assert_eq!(index.len(), 1);
        assert_eq!(index.id("coffee"), Some(2));
        assert_eq!(index.id_or_unk("<PAD>"), UNK_ID);
    }

    #[test]
    fn test_ids_beyond_vocab_size_are_unknown() {
        let index = vocab(&[("grab", 2), ("petrol", 5), ("parking", 9)], 6);
        assert!(index.contains("petrol"));
        assert!(!index.contains("parking"));
        assert_eq!(index.id_or_unk("parking"), UNK_ID);
    }

    #[test]
    fn test_candidates_sorted_by_initial() {
        let index = vocab(&[("shopee", 4), ("salary", 2), ("starbucks", 3), ("grab", 5)], 100);
        assert_eq!(index.candidates('s'), &["salary", "shopee", "starbucks"]);
        assert_eq!(index.candidates('g'), &["grab"]);
        assert!(index.candidates('z').is_empty());
    }

    #[test]
    fn test_from_word_index_rejects_negative_id() {
        let mut raw = HashMap::new();
        raw.insert("food".to_string(), -3);
        let err = VocabularyIndex::from_word_index(&raw, 100).unwrap_err();
        assert!(matches!(err, beruang_core::Error::ArtifactCorrupt(_)));
    }

    #[test]
    fn test_from_word_index_rejects_only_reserved() {
        let mut raw = HashMap::new();
        raw.insert("<PAD>".to_string(), 0);
        raw.insert("<UNK>".to_string(), 1);
        assert!(VocabularyIndex::from_word_index(&raw, 100).is_err());
    }

    #[test]
    fn test_label_index_from_dense_map() {
        let mut map = HashMap::new();
        map.insert("1".to_string(), "WANTS".to_string());
        map.insert("0".to_string(), "NEEDS".to_string());
        let labels = LabelIndex::from_map(&map, "categoryIndex").unwrap();
        assert_eq!(labels.labels(), &["NEEDS", "WANTS"]);
        assert_eq!(labels.label(1), Some("WANTS"));
        assert_eq!(labels.label(2), None);
    }

    #[test]
    fn test_label_index_rejects_gaps() {
        let mut map = HashMap::new();
        map.insert("0".to_string(), "NEEDS".to_string());
        map.insert("2".to_string(), "WANTS".to_string());
        let err = LabelIndex::from_map(&map, "categoryIndex").unwrap_err();
        assert!(err.to_string().contains("not dense"));
    }

    #[test]
    fn test_label_index_rejects_duplicate_ids() {
        let mut map = HashMap::new();
        map.insert("0".to_string(), "NEEDS".to_string());
        map.insert("00".to_string(), "WANTS".to_string());
        let err = LabelIndex::from_map(&map, "categoryIndex").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_label_index_rejects_non_numeric() {
        let mut map = HashMap::new();
        map.insert("first".to_string(), "NEEDS".to_string());
        assert!(LabelIndex::from_map(&map, "intentIndex").is_err());
        assert!(LabelIndex::from_map(&HashMap::new(), "intentIndex").is_err());
    }
}
