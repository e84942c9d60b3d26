//! Classifier trait and common types

use async_trait::async_trait;
use beruang_core::{Result, TokenSequence};

/// Probability distribution over one output head's labels
pub type Probabilities = Vec<f32>;

/// Trait for sequence classifiers backing the routers
///
/// Implementations receive a fixed-width [`TokenSequence`] and return one
/// probability vector per configured output head, in head order.
#[async_trait]
pub trait SequenceClassifier: Send + Sync {
    /// Predict label probabilities for each output head
    async fn predict(&self, sequence: &TokenSequence) -> Result<Vec<Probabilities>>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Number of output heads produced by `predict`
    fn head_count(&self) -> usize;
}

/// Output head of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Head {
    Category,
    Subcategory,
    Intent,
}

impl Head {
    /// Tensor prefix of this head in the weights file
    pub fn tensor_prefix(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Subcategory => "subcategory",
            Self::Intent => "intent",
        }
    }

    /// Key of this head's label map in the metadata document
    pub fn metadata_key(&self) -> &'static str {
        match self {
            Self::Category => "categoryIndex",
            Self::Subcategory => "subcategoryIndex",
            Self::Intent => "intentIndex",
        }
    }
}

/// Kind of trained model, which fixes its heads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Two co-dependent heads: category and subcategory
    Transaction,
    /// A single intent head
    Intent,
}

impl ModelKind {
    pub fn heads(&self) -> &'static [Head] {
        match self {
            Self::Transaction => &[Head::Category, Head::Subcategory],
            Self::Intent => &[Head::Intent],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Intent => "intent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_heads_in_order() {
        assert_eq!(
            ModelKind::Transaction.heads(),
            &[Head::Category, Head::Subcategory]
        );
        assert_eq!(ModelKind::Intent.heads(), &[Head::Intent]);
    }

    #[test]
    fn test_head_keys() {
        assert_eq!(Head::Subcategory.metadata_key(), "subcategoryIndex");
        assert_eq!(Head::Intent.tensor_prefix(), "intent");
    }
}
