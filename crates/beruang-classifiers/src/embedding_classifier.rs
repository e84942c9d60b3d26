//! Embedding-bag classifier backed by Candle
//!
//! Embeds each id of the fixed-width sequence, mean-pools over the non-PAD
//! positions, and applies one linear layer plus softmax per output head.

use crate::classifier::{Head, Probabilities, SequenceClassifier};
use crate::model_loader::ModelArtifacts;
use async_trait::async_trait;
use beruang_core::{Result, TokenSequence, PAD_ID, UNK_ID};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Embedding, Linear, Module};
use std::collections::HashMap;
use std::path::Path;

const EMBEDDING_TENSOR: &str = "embedding.weight";

/// Multi-head embedding-bag classifier
pub struct EmbeddingBagClassifier {
    name: String,
    embedding: Embedding,
    vocab_rows: usize,
    heads: Vec<(Head, Linear)>,
    device: Device,
}

impl EmbeddingBagClassifier {
    /// Build from the artifacts of a loaded model
    pub fn from_artifacts(artifacts: &ModelArtifacts, device: &Device) -> Result<Self> {
        let heads: Vec<(Head, usize)> = artifacts
            .metadata
            .heads
            .iter()
            .map(|(head, labels)| (*head, labels.len()))
            .collect();
        Self::load(artifacts.kind.name(), &artifacts.weights_path, &heads, device)
    }

    /// Load weights from a safetensors file
    pub fn load(
        name: impl Into<String>,
        weights_path: impl AsRef<Path>,
        heads: &[(Head, usize)],
        device: &Device,
    ) -> Result<Self> {
        let weights_path = weights_path.as_ref();
        if !weights_path.is_file() {
            return Err(beruang_core::Error::artifact_missing(weights_path));
        }

        let tensors = candle_core::safetensors::load(weights_path, device).map_err(|e| {
            beruang_core::Error::artifact_corrupt(format!(
                "Failed to read weights {}: {}",
                weights_path.display(),
                e
            ))
        })?;

        Self::from_tensors(name, tensors, heads, device)
    }

    /// Build from named tensors, checking every shape against the label counts
    pub fn from_tensors(
        name: impl Into<String>,
        mut tensors: HashMap<String, Tensor>,
        heads: &[(Head, usize)],
        device: &Device,
    ) -> Result<Self> {
        let name = name.into();

        let embedding = take_tensor(&mut tensors, EMBEDDING_TENSOR)?;
        let (vocab_rows, dim) = embedding.dims2().map_err(|e| {
            beruang_core::Error::artifact_corrupt(format!("{}: {}", EMBEDDING_TENSOR, e))
        })?;
        if vocab_rows <= UNK_ID as usize || dim == 0 {
            return Err(beruang_core::Error::artifact_corrupt(format!(
                "{} has unusable shape [{}, {}]",
                EMBEDDING_TENSOR, vocab_rows, dim
            )));
        }

        let mut linear_heads = Vec::with_capacity(heads.len());
        for &(head, label_count) in heads {
            let weight_name = format!("{}.weight", head.tensor_prefix());
            let bias_name = format!("{}.bias", head.tensor_prefix());
            let weight = take_tensor(&mut tensors, &weight_name)?;
            let bias = take_tensor(&mut tensors, &bias_name)?;

            let weight_shape = weight.dims2().ok();
            if weight_shape != Some((label_count, dim)) {
                return Err(beruang_core::Error::artifact_corrupt(format!(
                    "{} has shape {:?}, expected [{}, {}] for {} labels",
                    weight_name,
                    weight.dims(),
                    label_count,
                    dim,
                    label_count
                )));
            }
            if bias.dims1().ok() != Some(label_count) {
                return Err(beruang_core::Error::artifact_corrupt(format!(
                    "{} has shape {:?}, expected [{}]",
                    bias_name,
                    bias.dims(),
                    label_count
                )));
            }

            linear_heads.push((head, Linear::new(weight, Some(bias))));
        }

        tracing::info!(
            "Loaded embedding-bag classifier '{}' (vocab {}, dim {}, {} heads)",
            name,
            vocab_rows,
            dim,
            linear_heads.len()
        );

        Ok(Self {
            name,
            embedding: Embedding::new(embedding, dim),
            vocab_rows,
            heads: linear_heads,
            device: device.clone(),
        })
    }

    fn forward(&self, ids: &[u32]) -> candle_core::Result<Vec<Probabilities>> {
        // Ids without an embedding row behave like UNK
        let ids: Vec<u32> = ids
            .iter()
            .map(|&id| if (id as usize) < self.vocab_rows { id } else { UNK_ID })
            .collect();

        let input = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?; // [1, L]
        let embedded = self.embedding.forward(&input)?; // [1, L, dim]

        // Mean over non-PAD positions
        let mask = input
            .ne(PAD_ID)?
            .to_dtype(DType::F32)?
            .unsqueeze(D::Minus1)?; // [1, L, 1]
        let summed = embedded.broadcast_mul(&mask)?.sum(1)?; // [1, dim]
        let count = mask.sum(1)?.clamp(1f32, f32::MAX)?; // [1, 1]
        let pooled = summed.broadcast_div(&count)?;

        self.heads
            .iter()
            .map(|(_, linear)| {
                let logits = linear.forward(&pooled)?.squeeze(0)?;
                candle_nn::ops::softmax(&logits, 0)?.to_vec1::<f32>()
            })
            .collect()
    }
}

#[async_trait]
impl SequenceClassifier for EmbeddingBagClassifier {
    async fn predict(&self, sequence: &TokenSequence) -> Result<Vec<Probabilities>> {
        self.forward(sequence.ids()).map_err(|e| {
            beruang_core::Error::classifier(format!("{} forward pass failed: {}", self.name, e))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn head_count(&self) -> usize {
        self.heads.len()
    }
}

fn take_tensor(tensors: &mut HashMap<String, Tensor>, name: &str) -> Result<Tensor> {
    let tensor = tensors.remove(name).ok_or_else(|| {
        beruang_core::Error::artifact_corrupt(format!("weights are missing tensor '{}'", name))
    })?;
    tensor.to_dtype(DType::F32).map_err(|e| {
        beruang_core::Error::artifact_corrupt(format!("tensor '{}': {}", name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensors(intent_labels: usize) -> HashMap<String, Tensor> {
        let device = Device::Cpu;
        let mut tensors = HashMap::new();
        // Rows 0 and 1 are PAD/UNK; row 2 points along x, row 3 along y
        tensors.insert(
            EMBEDDING_TENSOR.to_string(),
            Tensor::new(&[[0f32, 0.], [0., 0.], [1., 0.], [0., 1.]], &device).unwrap(),
        );
        let weight: Vec<f32> = (0..intent_labels)
            .flat_map(|i| if i == 0 { [1f32, 0.] } else { [0., 1.] })
            .collect();
        tensors.insert(
            "intent.weight".to_string(),
            Tensor::from_vec(weight, (intent_labels, 2), &device).unwrap(),
        );
        tensors.insert(
            "intent.bias".to_string(),
            Tensor::zeros(intent_labels, DType::F32, &device).unwrap(),
        );
        tensors
    }

    fn classifier() -> EmbeddingBagClassifier {
        EmbeddingBagClassifier::from_tensors("intent", tensors(2), &[(Head::Intent, 2)], &Device::Cpu)
            .unwrap()
    }

    #[tokio::test]
    async fn test_softmax_over_pooled_embedding() {
        let classifier = classifier();
        let probs = classifier
            .predict(&TokenSequence::padded(vec![2, 2], 4))
            .await
            .unwrap();
        assert_eq!(probs.len(), 1);
        let expected = std::f32::consts::E / (std::f32::consts::E + 1.0);
        assert!((probs[0][0] - expected).abs() < 1e-5);
        assert!((probs[0].iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_padding_does_not_dilute_mean() {
        let classifier = classifier();
        let short = classifier
            .predict(&TokenSequence::padded(vec![2, 3], 2))
            .await
            .unwrap();
        let long = classifier
            .predict(&TokenSequence::padded(vec![2, 3], 8))
            .await
            .unwrap();
        assert!((short[0][0] - long[0][0]).abs() < 1e-6);
        assert!((long[0][0] - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_out_of_range_id_treated_as_unknown() {
        let classifier = classifier();
        let probs = classifier
            .predict(&TokenSequence::padded(vec![999], 3))
            .await
            .unwrap();
        assert!((probs[0][0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_head_shape_must_match_labels() {
        let err = EmbeddingBagClassifier::from_tensors(
            "intent",
            tensors(2),
            &[(Head::Intent, 3)],
            &Device::Cpu,
        )
        .err()
        .unwrap();
        assert!(matches!(err, beruang_core::Error::ArtifactCorrupt(_)));
    }

    #[test]
    fn test_missing_head_tensor() {
        let err = EmbeddingBagClassifier::from_tensors(
            "transaction",
            tensors(2),
            &[(Head::Category, 2)],
            &Device::Cpu,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("category.weight"));
    }

    #[test]
    fn test_load_from_safetensors_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        candle_core::safetensors::save(&tensors(2), &path).unwrap();

        let classifier =
            EmbeddingBagClassifier::load("intent", &path, &[(Head::Intent, 2)], &Device::Cpu)
                .unwrap();
        assert_eq!(classifier.head_count(), 1);
        assert_eq!(classifier.name(), "intent");
    }

    #[test]
    fn test_missing_weights_file() {
        let err = EmbeddingBagClassifier::load(
            "intent",
            "/nonexistent/model.safetensors",
            &[(Head::Intent, 2)],
            &Device::Cpu,
        )
        .err()
        .unwrap();
        assert!(matches!(err, beruang_core::Error::ArtifactMissing { .. }));
    }
}
