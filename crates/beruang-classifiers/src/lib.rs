//! Beruang Classifiers
//!
//! Inference-time decision pipeline for Beruang's intent and transaction
//! models.
//!
//! Per request:
//! - Keyword guardrail pre-filter (intent routing only, may short-circuit)
//! - Normalization and vectorization, with lexical correction of typos
//! - Classifier forward pass
//! - Confidence/OOD decision engine (intent) or per-head argmax (transaction)
//!
//! Vocabulary, label indices, and weights are immutable after load and shared
//! read-only across concurrent requests.

pub mod classifier;
pub mod config;
pub mod corrector;
pub mod embedding_classifier;
pub mod evaluation;
pub mod guardrail;
pub mod model_loader;
pub mod ood;
pub mod router;
pub mod stats;
pub mod vectorizer;
pub mod vocabulary;

pub use classifier::{Head, ModelKind, Probabilities, SequenceClassifier};
pub use config::{
    ArtifactSource, CorrectorConfig, DeviceSpec, FallbackConfig, GuardrailConfig, OodConfig,
    RoutingConfig,
};
pub use corrector::{levenshtein_distance, LexicalCorrector};
pub use embedding_classifier::EmbeddingBagClassifier;
pub use evaluation::{evaluate, EvaluationCase, EvaluationReport};
pub use guardrail::{KeywordGuardrail, PREFILTER_REASON};
pub use model_loader::{DeviceType, ModelArtifacts, ModelMetadata};
pub use ood::{OodDetector, CLASSIFIER_FAILURE, NO_RECOGNIZED_WORDS};
pub use router::{IntentRouter, TransactionRouter, CLASSIFIER_UNAVAILABLE_NOTE, NO_SIGNAL_NOTE};
pub use stats::DistributionStats;
pub use vectorizer::{VectorizeDiagnostics, Vectorizer};
pub use vocabulary::{LabelIndex, VocabularyIndex};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::SequenceClassifier;
    pub use crate::config::{ArtifactSource, RoutingConfig};
    pub use crate::model_loader::DeviceType;
    pub use crate::router::{IntentRouter, TransactionRouter};
    pub use crate::vectorizer::Vectorizer;
    pub use crate::vocabulary::{LabelIndex, VocabularyIndex};
}
