//! Core types for Beruang

use serde::{Deserialize, Serialize};

/// Id reserved for left padding
pub const PAD_ID: u32 = 0;

/// Id reserved for tokens the vocabulary cannot resolve
pub const UNK_ID: u32 = 1;

/// Fixed-width sequence of vocabulary ids fed to a classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSequence {
    ids: Vec<u32>,
}

impl TokenSequence {
    /// Build a sequence of exactly `max_len` ids.
    ///
    /// Ids beyond `max_len` are dropped from the end; shorter inputs are
    /// left-padded with [`PAD_ID`].
    pub fn padded(mut ids: Vec<u32>, max_len: usize) -> Self {
        ids.truncate(max_len);
        let padding = max_len - ids.len();
        let mut padded = Vec::with_capacity(max_len);
        padded.resize(padding, PAD_ID);
        padded.extend(ids);
        Self { ids: padded }
    }

    /// Raw ids, including padding
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Sequence width
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of ids that are neither PAD nor UNK
    pub fn valid_count(&self) -> usize {
        self.ids.iter().filter(|&&id| id > UNK_ID).count()
    }

    /// Number of UNK ids
    pub fn unknown_count(&self) -> usize {
        self.ids.iter().filter(|&&id| id == UNK_ID).count()
    }

    /// Number of non-PAD ids
    pub fn content_count(&self) -> usize {
        self.ids.iter().filter(|&&id| id != PAD_ID).count()
    }
}

/// Outcome of an intent routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    /// The local classifier's top prediction is accepted
    Resolved,
    /// The request goes to the external advice system
    Escalated { reasons: Vec<String> },
}

/// Final intent routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Label the caller should act on
    pub final_label: String,

    /// Top-1 label before any escalation override
    pub original_label: String,

    /// Confidence (0.0-1.0) attached to the decision
    pub confidence: f32,

    /// Normalized entropy of the classifier output, when one exists
    pub entropy: Option<f32>,

    /// Top-1 minus top-2 probability, when a classifier output exists
    pub gap: Option<f32>,

    pub route: Route,
}

impl RoutingDecision {
    /// Accept the classifier's top prediction
    pub fn resolved(label: impl Into<String>, confidence: f32) -> Self {
        let label = label.into();
        Self {
            final_label: label.clone(),
            original_label: label,
            confidence,
            entropy: None,
            gap: None,
            route: Route::Resolved,
        }
    }

    /// Escalate, forcing `final_label` to `escalation_label`
    pub fn escalated(
        escalation_label: impl Into<String>,
        original_label: impl Into<String>,
        confidence: f32,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            final_label: escalation_label.into(),
            original_label: original_label.into(),
            confidence,
            entropy: None,
            gap: None,
            route: Route::Escalated { reasons },
        }
    }

    /// Attach distribution statistics
    pub fn with_stats(mut self, entropy: f32, gap: f32) -> Self {
        self.entropy = Some(entropy);
        self.gap = Some(gap);
        self
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self.route, Route::Escalated { .. })
    }

    /// Escalation reasons; empty when resolved
    pub fn reasons(&self) -> &[String] {
        match &self.route {
            Route::Resolved => &[],
            Route::Escalated { reasons } => reasons,
        }
    }
}

/// Category/subcategory prediction for a transaction description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPrediction {
    pub category: String,
    pub subcategory: String,
    pub category_confidence: f32,
    pub subcategory_confidence: f32,

    /// Present only when the default pair was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransactionPrediction {
    /// Default pair with zero confidence
    pub fn fallback(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            category_confidence: 0.0,
            subcategory_confidence: 0.0,
            note: Some(note.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.note.is_some()
    }
}

/// Render a 0.0-1.0 score as a percentage with two decimals, e.g. `"93.10%"`
pub fn format_percent(score: f32) -> String {
    format!("{:.2}%", score * 100.0)
}
