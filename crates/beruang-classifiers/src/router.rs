//! Intent and transaction routers
//!
//! Each router owns a complete pipeline: vectorizer, classifier, label
//! indices and, for intents, the guardrail and decision engine. Routing never
//! fails: classifier faults degrade to escalation (intents) or to the default
//! category pair (transactions).

use crate::classifier::{Head, ModelKind, Probabilities, SequenceClassifier};
use crate::config::{ArtifactSource, FallbackConfig, RoutingConfig};
use crate::corrector::LexicalCorrector;
use crate::embedding_classifier::EmbeddingBagClassifier;
use crate::guardrail::KeywordGuardrail;
use crate::model_loader::{DeviceType, ModelArtifacts, ModelMetadata};
use crate::ood::OodDetector;
use crate::stats::argmax;
use crate::vectorizer::Vectorizer;
use crate::vocabulary::LabelIndex;
use beruang_core::{Result, RoutingDecision, TransactionPrediction};
use std::sync::Arc;

/// Note attached when no token of the description was recognized
pub const NO_SIGNAL_NOTE: &str = "No recognized words - using default category";

/// Note attached when the classifier could not be used
pub const CLASSIFIER_UNAVAILABLE_NOTE: &str = "Classifier unavailable - using default category";

/// Routes user messages to a local intent or to escalation
pub struct IntentRouter {
    vectorizer: Vectorizer,
    classifier: Arc<dyn SequenceClassifier>,
    labels: LabelIndex,
    detector: OodDetector,
    guardrail: KeywordGuardrail,
}

impl IntentRouter {
    pub fn new(
        vectorizer: Vectorizer,
        classifier: Arc<dyn SequenceClassifier>,
        labels: LabelIndex,
        routing: &RoutingConfig,
    ) -> Result<Self> {
        check_head_count(classifier.as_ref(), 1)?;
        let guardrail = KeywordGuardrail::new(&routing.guardrail, &routing.ood.escalation_label)?;
        Ok(Self {
            vectorizer,
            classifier,
            labels,
            detector: OodDetector::new(routing.ood.clone()),
            guardrail,
        })
    }

    /// Build the full pipeline from model artifacts.
    ///
    /// Calibrated thresholds in the model metadata take precedence over the
    /// configured ones. Blocking: reads files and may download from the hub.
    pub fn load(source: &ArtifactSource, routing: &RoutingConfig, device: DeviceType) -> Result<Self> {
        let device = device.create_device()?;
        let artifacts = ModelArtifacts::load(source, ModelKind::Intent)?;
        let classifier = EmbeddingBagClassifier::from_artifacts(&artifacts, &device)?;

        let mut routing = routing.clone();
        routing.ood = routing.ood.with_model_calibration(
            artifacts.metadata.global_threshold,
            artifacts.metadata.confidence_thresholds.as_ref(),
        );

        let (vectorizer, mut heads) = split_metadata(artifacts.metadata, &routing)?;
        let labels = take_head(&mut heads, Head::Intent)?;

        if !labels.labels().iter().any(|l| *l == routing.ood.escalation_label) {
            tracing::warn!(
                "Escalation label '{}' is not one of the model's intents",
                routing.ood.escalation_label
            );
        }

        Self::new(vectorizer, Arc::new(classifier), labels, &routing)
    }

    /// Route one message
    pub async fn route(&self, text: &str) -> RoutingDecision {
        if let Some(decision) = self.guardrail.prefilter(text) {
            return decision;
        }

        let (sequence, diagnostics) = self.vectorizer.vectorize(text);
        if !diagnostics.has_signal() {
            return self.detector.no_signal();
        }

        let probabilities = match self.classifier.predict(&sequence).await {
            Ok(mut heads) if heads.len() == 1 => heads.remove(0),
            Ok(heads) => {
                tracing::warn!(
                    "Intent classifier '{}' returned {} heads, expected 1",
                    self.classifier.name(),
                    heads.len()
                );
                return self.detector.classifier_failure();
            }
            Err(e) => {
                tracing::warn!("Intent classifier '{}' failed: {}", self.classifier.name(), e);
                return self.detector.classifier_failure();
            }
        };

        self.detector.decide(&diagnostics, &probabilities, &self.labels)
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }

    pub fn detector(&self) -> &OodDetector {
        &self.detector
    }
}

/// Categorizes transaction descriptions into a category/subcategory pair
pub struct TransactionRouter {
    vectorizer: Vectorizer,
    classifier: Arc<dyn SequenceClassifier>,
    category_labels: LabelIndex,
    subcategory_labels: LabelIndex,
    fallback: FallbackConfig,
}

impl TransactionRouter {
    pub fn new(
        vectorizer: Vectorizer,
        classifier: Arc<dyn SequenceClassifier>,
        category_labels: LabelIndex,
        subcategory_labels: LabelIndex,
        fallback: FallbackConfig,
    ) -> Result<Self> {
        check_head_count(classifier.as_ref(), 2)?;
        Ok(Self {
            vectorizer,
            classifier,
            category_labels,
            subcategory_labels,
            fallback,
        })
    }

    /// Build the full pipeline from model artifacts (blocking)
    pub fn load(source: &ArtifactSource, routing: &RoutingConfig, device: DeviceType) -> Result<Self> {
        let device = device.create_device()?;
        let artifacts = ModelArtifacts::load(source, ModelKind::Transaction)?;
        let classifier = EmbeddingBagClassifier::from_artifacts(&artifacts, &device)?;

        let (vectorizer, mut heads) = split_metadata(artifacts.metadata, routing)?;
        let category_labels = take_head(&mut heads, Head::Category)?;
        let subcategory_labels = take_head(&mut heads, Head::Subcategory)?;

        Self::new(
            vectorizer,
            Arc::new(classifier),
            category_labels,
            subcategory_labels,
            routing.fallback.clone(),
        )
    }

    /// Categorize one description
    pub async fn route(&self, text: &str) -> TransactionPrediction {
        let (sequence, diagnostics) = self.vectorizer.vectorize(text);
        if !diagnostics.has_signal() {
            return self.fallback(NO_SIGNAL_NOTE);
        }

        let heads = match self.classifier.predict(&sequence).await {
            Ok(heads) => heads,
            Err(e) => {
                tracing::warn!(
                    "Transaction classifier '{}' failed: {}",
                    self.classifier.name(),
                    e
                );
                return self.fallback(CLASSIFIER_UNAVAILABLE_NOTE);
            }
        };

        let [category_probs, subcategory_probs] = heads.as_slice() else {
            tracing::warn!(
                "Transaction classifier '{}' returned {} heads, expected 2",
                self.classifier.name(),
                heads.len()
            );
            return self.fallback(CLASSIFIER_UNAVAILABLE_NOTE);
        };

        match (
            pick(category_probs, &self.category_labels),
            pick(subcategory_probs, &self.subcategory_labels),
        ) {
            (Some((category, category_confidence)), Some((subcategory, subcategory_confidence))) => {
                TransactionPrediction {
                    category: category.to_string(),
                    subcategory: subcategory.to_string(),
                    category_confidence,
                    subcategory_confidence,
                    note: None,
                }
            }
            _ => {
                tracing::warn!("Transaction classifier output does not match label indices");
                self.fallback(CLASSIFIER_UNAVAILABLE_NOTE)
            }
        }
    }

    fn fallback(&self, note: &str) -> TransactionPrediction {
        TransactionPrediction::fallback(&self.fallback.category, &self.fallback.subcategory, note)
    }

    pub fn category_labels(&self) -> &LabelIndex {
        &self.category_labels
    }

    pub fn subcategory_labels(&self) -> &LabelIndex {
        &self.subcategory_labels
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }
}

fn check_head_count(classifier: &dyn SequenceClassifier, expected: usize) -> Result<()> {
    let heads = classifier.head_count();
    if heads != expected {
        return Err(beruang_core::Error::artifact_corrupt(format!(
            "classifier '{}' has {} output heads, expected {}",
            classifier.name(),
            heads,
            expected
        )));
    }
    Ok(())
}

/// Argmax label of one head, `None` when the output does not fit the labels
fn pick<'a>(probabilities: &Probabilities, labels: &'a LabelIndex) -> Option<(&'a str, f32)> {
    if probabilities.len() != labels.len() || probabilities.iter().any(|p| !p.is_finite()) {
        return None;
    }
    let (index, confidence) = argmax(probabilities)?;
    Some((labels.label(index)?, confidence))
}

fn split_metadata(
    metadata: ModelMetadata,
    routing: &RoutingConfig,
) -> Result<(Vectorizer, Vec<(Head, LabelIndex)>)> {
    let vectorizer = Vectorizer::new(
        Arc::new(metadata.vocabulary),
        LexicalCorrector::new(routing.corrector.clone()),
        metadata.max_len,
    )?;
    Ok((vectorizer, metadata.heads))
}

fn take_head(heads: &mut Vec<(Head, LabelIndex)>, head: Head) -> Result<LabelIndex> {
    let position = heads.iter().position(|(h, _)| *h == head).ok_or_else(|| {
        beruang_core::Error::artifact_corrupt(format!("missing '{}'", head.metadata_key()))
    })?;
    Ok(heads.swap_remove(position).1)
}
