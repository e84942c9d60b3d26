//! Lexical correction of out-of-vocabulary tokens
//!
//! A token the vocabulary does not know is replaced by the closest known
//! token sharing its first character, provided the edit distance stays within
//! a length-dependent budget. Short tokens are left alone: on two or three
//! characters almost everything is one edit away from something.

use crate::config::CorrectorConfig;
use crate::vocabulary::VocabularyIndex;
use std::borrow::Cow;
use std::cmp::min;

/// Corrects tokens against a [`VocabularyIndex`]
#[derive(Debug, Clone, Default)]
pub struct LexicalCorrector {
    config: CorrectorConfig,
}

impl LexicalCorrector {
    pub fn new(config: CorrectorConfig) -> Self {
        Self { config }
    }

    /// Return the token to look up for `token`.
    ///
    /// Known tokens and tokens below the minimum length come back unchanged.
    /// Among candidates at the minimal distance the first in lexicographic
    /// order wins. When nothing is within budget the original token is
    /// returned and will resolve to UNK.
    pub fn correct<'a>(&self, token: &'a str, vocabulary: &'a VocabularyIndex) -> Cow<'a, str> {
        if vocabulary.contains(token) {
            return Cow::Borrowed(token);
        }

        let len = token.chars().count();
        if len < self.config.min_token_len {
            return Cow::Borrowed(token);
        }

        let Some(initial) = token.chars().next() else {
            return Cow::Borrowed(token);
        };

        let budget = self.config.budget_for(len);
        let mut best: Option<(&'a str, usize)> = None;

        for candidate in vocabulary.candidates(initial) {
            // Later candidates must be strictly closer, so ties keep the earliest
            let limit = match best {
                Some((_, 0)) => break,
                Some((_, distance)) => distance - 1,
                None => budget,
            };
            if let Some(distance) = levenshtein_distance_threshold(token, candidate, limit) {
                best = Some((candidate.as_str(), distance));
            }
        }

        match best {
            Some((corrected, _)) => Cow::Borrowed(corrected),
            None => Cow::Borrowed(token),
        }
    }
}

/// Calculate the Levenshtein distance between two strings.
#[allow(clippy::needless_range_loop)]
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            curr_row[j] = min(
                min(
                    prev_row[j] + 1,     // deletion
                    curr_row[j - 1] + 1, // insertion
                ),
                prev_row[j - 1] + cost, // substitution
            );
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

/// Levenshtein distance with early termination.
///
/// Returns `None` as soon as the distance is known to exceed `threshold`.
#[allow(clippy::needless_range_loop)]
pub fn levenshtein_distance_threshold(s1: &str, s2: &str, threshold: usize) -> Option<usize> {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1.abs_diff(len2) > threshold {
        return None;
    }
    if len1 == 0 || len2 == 0 {
        let distance = len1.max(len2);
        return (distance <= threshold).then_some(distance);
    }

    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;
        let mut min_in_row = i;

        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            curr_row[j] = min(
                min(prev_row[j] + 1, curr_row[j - 1] + 1),
                prev_row[j - 1] + cost,
            );
            min_in_row = min(min_in_row, curr_row[j]);
        }

        if min_in_row > threshold {
            return None;
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    let distance = prev_row[len2];
    (distance <= threshold).then_some(distance)
}
