//! Text normalization and vectorization
//!
//! Raw text is lowercased, stripped to `[a-z0-9]` words, corrected against the
//! vocabulary, mapped to ids, and padded or truncated to the model's fixed
//! sequence width.

use crate::corrector::LexicalCorrector;
use crate::vocabulary::VocabularyIndex;
use beruang_core::{Result, TokenSequence};
use regex::Regex;
use std::sync::Arc;

/// Signals gathered while vectorizing, consumed by the decision engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorizeDiagnostics {
    /// Tokens after normalization, before truncation or padding
    pub token_count: usize,

    /// Ids in the sequence that are neither PAD nor UNK
    pub valid_token_count: usize,

    /// UNK ids in the sequence
    pub unknown_count: usize,

    /// Non-PAD ids in the sequence
    pub content_count: usize,

    /// `(original, corrected)` pairs for tokens the corrector rewrote
    pub corrections: Vec<(String, String)>,
}

impl VectorizeDiagnostics {
    /// Whether any token was recognized
    pub fn has_signal(&self) -> bool {
        self.valid_token_count > 0
    }

    /// Fraction of non-PAD ids that are UNK
    pub fn unknown_ratio(&self) -> f32 {
        if self.content_count == 0 {
            0.0
        } else {
            self.unknown_count as f32 / self.content_count as f32
        }
    }
}

/// Converts raw text into fixed-width id sequences
#[derive(Debug, Clone)]
pub struct Vectorizer {
    vocabulary: Arc<VocabularyIndex>,
    corrector: LexicalCorrector,
    max_len: usize,
    strip: Regex,
}

impl Vectorizer {
    pub fn new(
        vocabulary: Arc<VocabularyIndex>,
        corrector: LexicalCorrector,
        max_len: usize,
    ) -> Result<Self> {
        if max_len == 0 {
            return Err(beruang_core::Error::config("maxLen must be positive"));
        }
        let strip = Regex::new(r"[^a-z0-9\s]").map_err(|e| {
            beruang_core::Error::internal(format!("Failed to build normalizer: {}", e))
        })?;

        Ok(Self {
            vocabulary,
            corrector,
            max_len,
            strip,
        })
    }

    /// Lowercase, replace anything outside `[a-z0-9\s]` with a space, and
    /// collapse whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = self.strip.replace_all(&lowered, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Normalized tokens of `text`
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.normalize(text)
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Vectorize `text` into a sequence of exactly `max_len` ids
    pub fn vectorize(&self, text: &str) -> (TokenSequence, VectorizeDiagnostics) {
        let tokens = self.tokenize(text);
        let mut corrections = Vec::new();

        let ids: Vec<u32> = tokens
            .iter()
            .map(|token| {
                let corrected = self.corrector.correct(token, &self.vocabulary);
                if corrected != token.as_str() {
                    corrections.push((token.clone(), corrected.to_string()));
                }
                self.vocabulary.id_or_unk(&corrected)
            })
            .collect();

        let sequence = TokenSequence::padded(ids, self.max_len);
        let diagnostics = VectorizeDiagnostics {
            token_count: tokens.len(),
            valid_token_count: sequence.valid_count(),
            unknown_count: sequence.unknown_count(),
            content_count: sequence.content_count(),
            corrections,
        };

        if !diagnostics.corrections.is_empty() {
            tracing::debug!(corrections = ?diagnostics.corrections, "Auto-corrected tokens");
        }

        (sequence, diagnostics)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn vocabulary(&self) -> &VocabularyIndex {
        &self.vocabulary
    }
}
