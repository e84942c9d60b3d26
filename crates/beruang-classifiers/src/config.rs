//! Configuration for routing thresholds, guardrails, and model artifacts

use crate::model_loader::DeviceType;
use beruang_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Routing configuration shared by the intent and transaction routers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Confidence/OOD decision thresholds
    #[serde(default)]
    pub ood: OodConfig,

    /// Keyword guardrail phrase lists
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Default category pair for transactions
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Lexical correction budgets
    #[serde(default)]
    pub corrector: CorrectorConfig,
}

/// Thresholds for the confidence/OOD decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OodConfig {
    /// Confidence floor for labels without an override
    #[serde(default = "default_global_threshold")]
    pub global_threshold: f32,

    /// Per-label confidence floors
    #[serde(default)]
    pub class_thresholds: HashMap<String, f32>,

    /// Unknown-token ratio above which a reason is recorded
    #[serde(default = "default_max_unknown_ratio")]
    pub max_unknown_ratio: f32,

    /// Token count above which a query counts as complex
    #[serde(default = "default_max_query_tokens")]
    pub max_query_tokens: usize,

    /// Normalized entropy above which a reason is recorded
    #[serde(default = "default_max_entropy")]
    pub max_entropy: f32,

    /// Top-1/top-2 gap below which a reason is recorded
    #[serde(default = "default_min_confidence_gap")]
    pub min_confidence_gap: f32,

    /// Corroborating reasons needed to escalate without a threshold failure
    #[serde(default = "default_min_reasons")]
    pub min_reasons: usize,

    /// Label forced on escalated intent decisions
    #[serde(default = "default_escalation_label")]
    pub escalation_label: String,
}

impl Default for OodConfig {
    fn default() -> Self {
        Self {
            global_threshold: default_global_threshold(),
            class_thresholds: HashMap::new(),
            max_unknown_ratio: default_max_unknown_ratio(),
            max_query_tokens: default_max_query_tokens(),
            max_entropy: default_max_entropy(),
            min_confidence_gap: default_min_confidence_gap(),
            min_reasons: default_min_reasons(),
            escalation_label: default_escalation_label(),
        }
    }
}

impl OodConfig {
    /// Threshold applying to `label`
    pub fn threshold_for(&self, label: &str) -> f32 {
        self.class_thresholds
            .get(label)
            .copied()
            .unwrap_or(self.global_threshold)
    }

    /// Apply calibration shipped with a trained model.
    ///
    /// Metadata values take precedence over configured ones.
    pub fn with_model_calibration(
        mut self,
        global_threshold: Option<f32>,
        class_thresholds: Option<&HashMap<String, f32>>,
    ) -> Self {
        if let Some(threshold) = global_threshold {
            self.global_threshold = threshold;
        }
        if let Some(overrides) = class_thresholds {
            self.class_thresholds
                .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        }
        self
    }

    fn validate(&self) -> Result<()> {
        check_probability("ood.global_threshold", self.global_threshold)?;
        for (label, threshold) in &self.class_thresholds {
            check_probability(&format!("ood.class_thresholds.{}", label), *threshold)?;
        }
        check_probability("ood.max_unknown_ratio", self.max_unknown_ratio)?;
        check_probability("ood.max_entropy", self.max_entropy)?;
        check_probability("ood.min_confidence_gap", self.min_confidence_gap)?;
        if self.min_reasons == 0 {
            return Err(beruang_core::Error::config(
                "ood.min_reasons must be at least 1",
            ));
        }
        if self.escalation_label.trim().is_empty() {
            return Err(beruang_core::Error::config(
                "ood.escalation_label must not be empty",
            ));
        }
        Ok(())
    }
}

/// Phrase lists for the keyword guardrail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Question forms that open a complex query
    #[serde(default = "default_complex_starters")]
    pub complex_starters: Vec<String>,

    /// Finance and life-decision topic words
    #[serde(default = "default_red_flags")]
    pub red_flags: Vec<String>,

    /// A red-flag message with more tokens than this escalates
    #[serde(default = "default_min_tokens_with_red_flag")]
    pub min_tokens_with_red_flag: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            complex_starters: default_complex_starters(),
            red_flags: default_red_flags(),
            min_tokens_with_red_flag: default_min_tokens_with_red_flag(),
        }
    }
}

/// Default category pair returned when a transaction cannot be classified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_category")]
    pub category: String,

    #[serde(default = "default_fallback_subcategory")]
    pub subcategory: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            category: default_fallback_category(),
            subcategory: default_fallback_subcategory(),
        }
    }
}

/// Edit-distance budgets for lexical correction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectorConfig {
    /// Tokens shorter than this are never corrected
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// Tokens longer than this get `long_budget`
    #[serde(default = "default_long_token_len")]
    pub long_token_len: usize,

    #[serde(default = "default_short_budget")]
    pub short_budget: usize,

    #[serde(default = "default_long_budget")]
    pub long_budget: usize,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            long_token_len: default_long_token_len(),
            short_budget: default_short_budget(),
            long_budget: default_long_budget(),
        }
    }
}

impl CorrectorConfig {
    /// Edit budget for a token of `len` characters
    pub fn budget_for(&self, len: usize) -> usize {
        if len > self.long_token_len {
            self.long_budget
        } else {
            self.short_budget
        }
    }
}

impl RoutingConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            beruang_core::Error::config(format!("Failed to parse routing config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Check every threshold is usable
    pub fn validate(&self) -> Result<()> {
        self.ood.validate()?;
        if self.fallback.category.trim().is_empty() || self.fallback.subcategory.trim().is_empty()
        {
            return Err(beruang_core::Error::config(
                "fallback category and subcategory must not be empty",
            ));
        }
        if self.corrector.short_budget > self.corrector.long_budget {
            return Err(beruang_core::Error::config(
                "corrector.short_budget must not exceed corrector.long_budget",
            ));
        }
        Ok(())
    }
}

/// Where a model's artifacts live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactSource {
    /// Directory holding `metadata.json` and `model.safetensors`
    Local { path: PathBuf },

    /// Hugging Face Hub repository holding the same two files
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
    },
}

impl ArtifactSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }
}

/// Device specification (for config files)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl DeviceSpec {
    /// Convert to DeviceType
    pub fn to_device_type(&self) -> DeviceType {
        match self {
            DeviceSpec::Cpu => DeviceType::Cpu,
            DeviceSpec::Cuda { index } => DeviceType::Cuda(index.unwrap_or(0)),
            DeviceSpec::Metal { index } => DeviceType::Metal(index.unwrap_or(0)),
        }
    }
}

fn check_probability(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(beruang_core::Error::config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn default_global_threshold() -> f32 {
    0.80
}

fn default_max_unknown_ratio() -> f32 {
    0.6
}

fn default_max_query_tokens() -> usize {
    15
}

fn default_max_entropy() -> f32 {
    0.7
}

fn default_min_confidence_gap() -> f32 {
    0.15
}

fn default_min_reasons() -> usize {
    2
}

fn default_escalation_label() -> String {
    "COMPLEX_ADVICE".to_string()
}

fn default_complex_starters() -> Vec<String> {
    [
        "should i",
        "how do i",
        "what if",
        "is it worth",
        "is it better",
        "is it wise",
        "can i afford",
        "what should i",
        "how should i",
        "how much should",
        "would it be",
        "do you think",
        "which is better",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_red_flags() -> Vec<String> {
    [
        "invest",
        "investing",
        "investment",
        "crypto",
        "bitcoin",
        "stock",
        "stocks",
        "shares",
        "loan",
        "loans",
        "mortgage",
        "house",
        "property",
        "car",
        "debt",
        "retire",
        "retirement",
        "insurance",
        "tax",
        "salary",
        "marriage",
        "wedding",
        "divorce",
        "business",
        "inflation",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_tokens_with_red_flag() -> usize {
    5
}

fn default_fallback_category() -> String {
    "WANTS".to_string()
}

fn default_fallback_subcategory() -> String {
    "Others".to_string()
}

fn default_min_token_len() -> usize {
    4
}

fn default_long_token_len() -> usize {
    6
}

fn default_short_budget() -> usize {
    1
}

fn default_long_budget() -> usize {
    2
}

fn default_revision() -> String {
    "main".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = RoutingConfig::from_yaml("{}").unwrap();
        assert_eq!(config.ood.global_threshold, 0.80);
        assert_eq!(config.ood.max_query_tokens, 15);
        assert_eq!(config.ood.min_reasons, 2);
        assert_eq!(config.ood.escalation_label, "COMPLEX_ADVICE");
        assert_eq!(config.fallback.category, "WANTS");
        assert_eq!(config.fallback.subcategory, "Others");
        assert_eq!(config.corrector.min_token_len, 4);
    }

    #[test]
    fn test_routing_config_yaml() {
        let yaml = r#"
ood:
  global_threshold: 0.75
  class_thresholds:
    GREETING: 0.6
  max_entropy: 0.65
guardrail:
  complex_starters: ["should i"]
  red_flags: ["crypto"]
fallback:
  category: NEEDS
  subcategory: Bills
"#;
        let config = RoutingConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ood.threshold_for("GREETING"), 0.6);
        assert_eq!(config.ood.threshold_for("NAV_HOME"), 0.75);
        assert_eq!(config.ood.max_entropy, 0.65);
        assert_eq!(config.ood.min_confidence_gap, 0.15);
        assert_eq!(config.guardrail.red_flags, vec!["crypto".to_string()]);
        assert_eq!(config.guardrail.min_tokens_with_red_flag, 5);
        assert_eq!(config.fallback.category, "NEEDS");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = RoutingConfig::from_yaml("ood:\n  global_threshold: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("global_threshold"));

        let err = RoutingConfig::from_yaml("ood:\n  min_reasons: 0\n").unwrap_err();
        assert!(err.to_string().contains("min_reasons"));
    }

    #[test]
    fn test_model_calibration_overrides_config() {
        let mut overrides = HashMap::new();
        overrides.insert("JOKE".to_string(), 0.5);

        let ood = OodConfig::default().with_model_calibration(Some(0.9), Some(&overrides));
        assert_eq!(ood.threshold_for("JOKE"), 0.5);
        assert_eq!(ood.threshold_for("BYE"), 0.9);

        let untouched = OodConfig::default().with_model_calibration(None, None);
        assert_eq!(untouched.threshold_for("BYE"), 0.80);
    }

    #[test]
    fn test_corrector_budget() {
        let corrector = CorrectorConfig::default();
        assert_eq!(corrector.budget_for(5), 1);
        assert_eq!(corrector.budget_for(6), 1);
        assert_eq!(corrector.budget_for(7), 2);
    }

    #[test]
    fn test_artifact_source_yaml() {
        let local: ArtifactSource =
            serde_yaml::from_str("type: local\npath: ./model_intent\n").unwrap();
        assert!(matches!(local, ArtifactSource::Local { .. }));

        let hub: ArtifactSource =
            serde_yaml::from_str("type: huggingface\nrepo: beruang/intent\n").unwrap();
        match hub {
            ArtifactSource::HuggingFace { repo, revision } => {
                assert_eq!(repo, "beruang/intent");
                assert_eq!(revision, "main");
            }
            _ => panic!("Expected HuggingFace source"),
        }
    }

    #[test]
    fn test_device_spec() {
        let spec: DeviceSpec = serde_yaml::from_str("cpu").unwrap();
        assert!(matches!(spec.to_device_type(), DeviceType::Cpu));

        let cuda_device = DeviceSpec::Cuda { index: Some(1) }.to_device_type();
        assert!(matches!(cuda_device, DeviceType::Cuda(1)));

        let metal_device = DeviceSpec::Metal { index: None }.to_device_type();
        assert!(matches!(metal_device, DeviceType::Metal(0)));
    }
}
