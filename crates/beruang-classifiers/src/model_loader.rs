//! Model artifact loading
//!
//! A trained model ships as two files: `metadata.json` (vocabulary, label
//! maps, sequence width, optional calibration) and `model.safetensors`
//! (weights). Both are resolved from a local directory or downloaded from the
//! Hugging Face Hub, then validated before anything is served.

use crate::classifier::{Head, ModelKind};
use crate::config::ArtifactSource;
use crate::vocabulary::{LabelIndex, VocabularyIndex};
use beruang_core::Result;
use candle_core::Device;
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Metadata file name inside a model directory
pub const METADATA_FILE: &str = "metadata.json";

/// Weights file name inside a model directory
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Create Candle device from device type
    pub fn create_device(self) -> Result<Device> {
        match self {
            DeviceType::Cpu => Ok(Device::Cpu),
            DeviceType::Cuda(idx) => Device::new_cuda(idx).map_err(|e| {
                beruang_core::Error::config(format!("Failed to create CUDA device: {}", e))
            }),
            DeviceType::Metal(idx) => Device::new_metal(idx).map_err(|e| {
                beruang_core::Error::config(format!("Failed to create Metal device: {}", e))
            }),
        }
    }
}

/// Metadata document as written by the trainer; unknown keys are ignored
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    word_index: Option<HashMap<String, i64>>,
    max_len: Option<i64>,
    max_vocab_size: Option<i64>,
    category_index: Option<HashMap<String, String>>,
    subcategory_index: Option<HashMap<String, String>>,
    intent_index: Option<HashMap<String, String>>,
    global_threshold: Option<f32>,
    confidence_thresholds: Option<HashMap<String, f32>>,
}

impl RawMetadata {
    fn label_map(&self, head: Head) -> Option<&HashMap<String, String>> {
        match head {
            Head::Category => self.category_index.as_ref(),
            Head::Subcategory => self.subcategory_index.as_ref(),
            Head::Intent => self.intent_index.as_ref(),
        }
    }
}

/// Validated model metadata
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    /// Fixed sequence width
    pub max_len: usize,

    /// Ids at or beyond this bound resolve to UNK
    pub max_vocab_size: usize,

    pub vocabulary: VocabularyIndex,

    /// Label index per output head, in head order
    pub heads: Vec<(Head, LabelIndex)>,

    /// Calibrated global threshold, if the trainer wrote one
    pub global_threshold: Option<f32>,

    /// Calibrated per-label thresholds, if the trainer wrote them
    pub confidence_thresholds: Option<HashMap<String, f32>>,
}

impl ModelMetadata {
    /// Parse and validate a metadata document for a model of `kind`
    pub fn from_json(json: &str, kind: ModelKind) -> Result<Self> {
        let raw: RawMetadata = serde_json::from_str(json).map_err(|e| {
            beruang_core::Error::artifact_corrupt(format!("{} is not valid: {}", METADATA_FILE, e))
        })?;

        let max_len = positive_field("maxLen", raw.max_len)?;
        let max_vocab_size = positive_field("maxVocabSize", raw.max_vocab_size)?;
        let word_index = raw
            .word_index
            .as_ref()
            .ok_or_else(|| missing_field("wordIndex"))?;
        let vocabulary = VocabularyIndex::from_word_index(word_index, max_vocab_size)?;

        let heads = kind
            .heads()
            .iter()
            .map(|&head| {
                let map = raw
                    .label_map(head)
                    .ok_or_else(|| missing_field(head.metadata_key()))?;
                Ok((head, LabelIndex::from_map(map, head.metadata_key())?))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(threshold) = raw.global_threshold {
            check_threshold("globalThreshold", threshold)?;
        }
        if let Some(thresholds) = &raw.confidence_thresholds {
            for (label, &threshold) in thresholds {
                check_threshold(&format!("confidenceThresholds.{}", label), threshold)?;
            }
        }

        Ok(Self {
            max_len,
            max_vocab_size,
            vocabulary,
            heads,
            global_threshold: raw.global_threshold,
            confidence_thresholds: raw.confidence_thresholds,
        })
    }

    /// Read and validate a metadata file
    pub fn from_file(path: impl AsRef<Path>, kind: ModelKind) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(beruang_core::Error::artifact_missing(path));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, kind)
    }

    /// Label index of `head`
    pub fn labels(&self, head: Head) -> Option<&LabelIndex> {
        self.heads
            .iter()
            .find(|(h, _)| *h == head)
            .map(|(_, labels)| labels)
    }
}

/// Resolved artifact file locations
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub metadata: PathBuf,
    pub weights: PathBuf,
}

impl ArtifactPaths {
    /// Resolve both files from `source`, downloading from the hub if needed
    pub fn resolve(source: &ArtifactSource) -> Result<Self> {
        match source {
            ArtifactSource::Local { path } => {
                let paths = Self {
                    metadata: path.join(METADATA_FILE),
                    weights: path.join(WEIGHTS_FILE),
                };
                for file in [&paths.metadata, &paths.weights] {
                    if !file.is_file() {
                        return Err(beruang_core::Error::artifact_missing(file));
                    }
                }
                Ok(paths)
            }
            ArtifactSource::HuggingFace { repo, revision } => {
                tracing::info!("Fetching model artifacts from Hugging Face: {} @ {}", repo, revision);

                let api = Api::new().map_err(|e| {
                    beruang_core::Error::config(format!("Failed to initialize HF API: {}", e))
                })?;
                let repo_api = api.repo(Repo::with_revision(
                    repo.clone(),
                    RepoType::Model,
                    revision.clone(),
                ));

                let fetch = |file: &str| {
                    repo_api.get(file).map_err(|e| {
                        tracing::warn!("Failed to download {} from {}: {}", file, repo, e);
                        beruang_core::Error::artifact_missing(format!("{}/{}", repo, file))
                    })
                };

                Ok(Self {
                    metadata: fetch(METADATA_FILE)?,
                    weights: fetch(WEIGHTS_FILE)?,
                })
            }
        }
    }
}

/// Everything needed to build a router's classifier and vectorizer
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub kind: ModelKind,
    pub metadata: ModelMetadata,
    pub weights_path: PathBuf,
}

impl ModelArtifacts {
    /// Resolve and validate the artifacts of a model of `kind`
    pub fn load(source: &ArtifactSource, kind: ModelKind) -> Result<Self> {
        let paths = ArtifactPaths::resolve(source)?;
        let metadata = ModelMetadata::from_file(&paths.metadata, kind)?;

        tracing::info!(
            model = kind.name(),
            vocabulary = metadata.vocabulary.len(),
            max_len = metadata.max_len,
            "Loaded model metadata"
        );

        Ok(Self {
            kind,
            metadata,
            weights_path: paths.weights,
        })
    }
}

fn missing_field(name: &str) -> beruang_core::Error {
    beruang_core::Error::artifact_corrupt(format!("{} is missing '{}'", METADATA_FILE, name))
}

fn positive_field(name: &str, value: Option<i64>) -> Result<usize> {
    let value = value.ok_or_else(|| missing_field(name))?;
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| {
            beruang_core::Error::artifact_corrupt(format!(
                "'{}' must be a positive integer, got {}",
                name, value
            ))
        })
}

fn check_threshold(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(beruang_core::Error::artifact_corrupt(format!(
            "'{}' must be within [0, 1], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beruang_core::Error;

    const TRANSACTION_METADATA: &str = r#"{
        "wordIndex": {"<PAD>": 0, "<UNK>": 1, "grab": 2, "petrol": 3, "starbucks": 4},
        "maxLen": 20,
        "maxVocabSize": 2000,
        "vocabSize": 5,
        "categoryIndex": {"0": "NEEDS", "1": "WANTS"},
        "subcategoryIndex": {"0": "Transport", "1": "Food"},
        "trainingConfig": {"epochs": 40}
    }"#;

    #[test]
    fn test_parse_transaction_metadata() {
        let metadata = ModelMetadata::from_json(TRANSACTION_METADATA, ModelKind::Transaction).unwrap();
        assert_eq!(metadata.max_len, 20);
        assert_eq!(metadata.vocabulary.len(), 3);
        assert_eq!(metadata.heads.len(), 2);
        assert_eq!(
            metadata.labels(Head::Subcategory).unwrap().label(1),
            Some("Food")
        );
        assert!(metadata.global_threshold.is_none());
    }

    #[test]
    fn test_intent_model_requires_intent_index() {
        let err = ModelMetadata::from_json(TRANSACTION_METADATA, ModelKind::Intent).unwrap_err();
        assert!(matches!(err, Error::ArtifactCorrupt(_)));
        assert!(err.to_string().contains("intentIndex"));
    }

    #[test]
    fn test_calibration_fields() {
        let json = r#"{
            "wordIndex": {"hello": 2},
            "maxLen": 10,
            "maxVocabSize": 100,
            "intentIndex": {"0": "GREETING", "1": "COMPLEX_ADVICE"},
            "globalThreshold": 0.75,
            "confidenceThresholds": {"GREETING": 0.6}
        }"#;
        let metadata = ModelMetadata::from_json(json, ModelKind::Intent).unwrap();
        assert_eq!(metadata.global_threshold, Some(0.75));
        assert_eq!(
            metadata.confidence_thresholds.unwrap().get("GREETING"),
            Some(&0.6)
        );
    }

    #[test]
    fn test_invalid_fields_are_corrupt() {
        let cases = [
            r#"{"wordIndex": {"a": 2}, "maxVocabSize": 10, "intentIndex": {"0": "A"}}"#,
            r#"{"wordIndex": {"a": 2}, "maxLen": 0, "maxVocabSize": 10, "intentIndex": {"0": "A"}}"#,
            r#"{"wordIndex": {"a": 2}, "maxLen": 5, "maxVocabSize": 10, "intentIndex": {"0": "A"}, "globalThreshold": 1.5}"#,
            r#"{"maxLen": 5, "maxVocabSize": 10, "intentIndex": {"0": "A"}}"#,
            "not json",
        ];
        for json in cases {
            let err = ModelMetadata::from_json(json, ModelKind::Intent).unwrap_err();
            assert!(matches!(err, Error::ArtifactCorrupt(_)), "{}", json);
        }
    }

    #[test]
    fn test_missing_local_directory() {
        let err = ArtifactPaths::resolve(&ArtifactSource::local("/nonexistent/model_intent"))
            .unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn test_cpu_device() {
        assert!(DeviceType::Cpu.create_device().unwrap().is_cpu());
    }
}
