//! Confidence/OOD decision engine
//!
//! Runs independent checks over the vectorizer diagnostics and the
//! classifier's probability vector, each contributing a human-readable
//! reason. A confidence-threshold failure escalates on its own; every other
//! check needs corroboration (`min_reasons`, two by default).
//!
//! Checks:
//! 1. No recognized words (short-circuits everything else)
//! 2. Unknown-token ratio
//! 3. Query length
//! 4. Per-label confidence threshold
//! 5. Normalized entropy
//! 6. Top-1/top-2 confidence gap

use crate::config::OodConfig;
use crate::stats::DistributionStats;
use crate::vectorizer::VectorizeDiagnostics;
use crate::vocabulary::LabelIndex;
use beruang_core::RoutingDecision;

/// Reason recorded when vectorization resolved nothing
pub const NO_RECOGNIZED_WORDS: &str = "No recognized words";

/// Reason recorded when the classifier could not produce a usable output
pub const CLASSIFIER_FAILURE: &str = "Classifier failure";

/// Decides between accepting the classifier's answer and escalating
#[derive(Debug, Clone, Default)]
pub struct OodDetector {
    config: OodConfig,
}

impl OodDetector {
    pub fn new(config: OodConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OodConfig {
        &self.config
    }

    pub fn escalation_label(&self) -> &str {
        &self.config.escalation_label
    }

    /// Escalation for input with no recognized tokens, without classifier output
    pub fn no_signal(&self) -> RoutingDecision {
        RoutingDecision::escalated(
            &self.config.escalation_label,
            &self.config.escalation_label,
            0.0,
            vec![NO_RECOGNIZED_WORDS.to_string()],
        )
    }

    /// Escalation used when the classifier fails or returns unusable output
    pub fn classifier_failure(&self) -> RoutingDecision {
        RoutingDecision::escalated(
            &self.config.escalation_label,
            &self.config.escalation_label,
            0.0,
            vec![CLASSIFIER_FAILURE.to_string()],
        )
    }

    /// Stats and top label, when the output lines up with the label index
    fn top_prediction<'a>(
        probabilities: &[f32],
        labels: &'a LabelIndex,
    ) -> Option<(DistributionStats, &'a str)> {
        if probabilities.len() != labels.len() || probabilities.iter().any(|p| !p.is_finite()) {
            return None;
        }
        let stats = DistributionStats::from_probabilities(probabilities)?;
        let original = labels.label(stats.top_index)?;
        Some((stats, original))
    }

    /// Combine all checks into a routing decision
    pub fn decide(
        &self,
        diagnostics: &VectorizeDiagnostics,
        probabilities: &[f32],
        labels: &LabelIndex,
    ) -> RoutingDecision {
        // Check 1: nothing left to be confident about, whatever the model said
        if !diagnostics.has_signal() {
            return match Self::top_prediction(probabilities, labels) {
                Some((stats, original)) => RoutingDecision::escalated(
                    &self.config.escalation_label,
                    original,
                    stats.top1,
                    vec![NO_RECOGNIZED_WORDS.to_string()],
                )
                .with_stats(stats.entropy, stats.gap()),
                None => self.no_signal(),
            };
        }

        if probabilities.len() != labels.len() || probabilities.iter().any(|p| !p.is_finite()) {
            tracing::warn!(
                outputs = probabilities.len(),
                labels = labels.len(),
                "Classifier output does not match label index"
            );
            return self.classifier_failure();
        }

        let Some(stats) = DistributionStats::from_probabilities(probabilities) else {
            return self.classifier_failure();
        };
        let Some(original) = labels.label(stats.top_index) else {
            return self.classifier_failure();
        };

        let mut reasons = Vec::new();

        // Check 2: mostly unknown words
        let unknown_ratio = diagnostics.unknown_ratio();
        if unknown_ratio > self.config.max_unknown_ratio {
            reasons.push(format!(
                "High unknown word ratio: {:.0}% of words not recognized",
                unknown_ratio * 100.0
            ));
        }

        // Check 3: long queries stand in for complexity
        if diagnostics.token_count > self.config.max_query_tokens {
            reasons.push(format!(
                "Query too long/complex: {} words > {}",
                diagnostics.token_count, self.config.max_query_tokens
            ));
        }

        // Check 4: per-label confidence floor
        let threshold = self.config.threshold_for(original);
        let below_threshold = stats.top1 < threshold;
        if below_threshold {
            reasons.push(format!(
                "Low confidence: {:.2}% < {:.2}% threshold",
                stats.top1 * 100.0,
                threshold * 100.0
            ));
        }

        // Check 5: diffuse distribution
        if stats.entropy > self.config.max_entropy {
            reasons.push(format!(
                "High entropy: {:.3} > {:.2}",
                stats.entropy, self.config.max_entropy
            ));
        }

        // Check 6: contested top prediction
        let gap = stats.gap();
        if gap < self.config.min_confidence_gap {
            reasons.push(format!(
                "Narrow confidence gap: {:.3} < {:.2}",
                gap, self.config.min_confidence_gap
            ));
        }

        if below_threshold || reasons.len() >= self.config.min_reasons {
            tracing::debug!(
                original,
                confidence = stats.top1,
                ?reasons,
                "Escalating out-of-distribution input"
            );
            RoutingDecision::escalated(&self.config.escalation_label, original, stats.top1, reasons)
                .with_stats(stats.entropy, gap)
        } else {
            if !reasons.is_empty() {
                tracing::debug!(original, ?reasons, "Uncorroborated OOD signal ignored");
            }
            RoutingDecision::resolved(original, stats.top1).with_stats(stats.entropy, gap)
        }
    }
}
