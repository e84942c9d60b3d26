//! End-to-end loading of routers from on-disk artifacts

use beruang_classifiers::{
    ArtifactSource, DeviceType, IntentRouter, RoutingConfig, TransactionRouter,
};
use beruang_core::Error;
use candle_core::{Device, Tensor};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

fn write_model(dir: &Path, metadata: serde_json::Value, tensors: HashMap<String, Tensor>) {
    std::fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(&metadata).unwrap(),
    )
    .unwrap();
    candle_core::safetensors::save(&tensors, dir.join("model.safetensors")).unwrap();
}

fn matrix(rows: &[[f32; 2]]) -> Tensor {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (rows.len(), 2), &Device::Cpu).unwrap()
}

fn zeros(len: usize) -> Tensor {
    Tensor::zeros(len, candle_core::DType::F32, &Device::Cpu).unwrap()
}

fn intent_metadata() -> serde_json::Value {
    json!({
        "wordIndex": {"<PAD>": 0, "<UNK>": 1, "hello": 2, "expenses": 3, "go": 4, "to": 5},
        "maxLen": 20,
        "maxVocabSize": 2000,
        "intentIndex": {"0": "GREETING", "1": "NAV_EXPENSES", "2": "COMPLEX_ADVICE"},
        "trainingConfig": {"epochs": 30, "batchSize": 32}
    })
}

fn intent_tensors() -> HashMap<String, Tensor> {
    let mut tensors = HashMap::new();
    tensors.insert(
        "embedding.weight".to_string(),
        matrix(&[[0., 0.], [0., 0.], [10., 0.], [0., 10.], [0., 10.], [0., 10.]]),
    );
    tensors.insert(
        "intent.weight".to_string(),
        matrix(&[[1., 0.], [0., 1.], [0., 0.]]),
    );
    tensors.insert("intent.bias".to_string(), zeros(3));
    tensors
}

#[tokio::test]
async fn test_intent_router_from_local_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path(), intent_metadata(), intent_tensors());

    let router = IntentRouter::load(
        &ArtifactSource::local(dir.path()),
        &RoutingConfig::default(),
        DeviceType::Cpu,
    )
    .unwrap();
    assert_eq!(router.labels().len(), 3);
    assert_eq!(router.vectorizer().max_len(), 20);

    let decision = router.route("Hello!").await;
    assert!(!decision.is_escalated());
    assert_eq!(decision.final_label, "GREETING");
    assert!(decision.confidence > 0.99);

    let decision = router.route("go to expensses").await;
    assert_eq!(decision.final_label, "NAV_EXPENSES");

    let decision = router.route("asdfgh").await;
    assert!(decision.is_escalated());
}

#[tokio::test]
async fn test_metadata_calibration_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut metadata = intent_metadata();
    metadata["confidenceThresholds"] = json!({"GREETING": 0.99999});
    write_model(dir.path(), metadata, intent_tensors());

    let router = IntentRouter::load(
        &ArtifactSource::local(dir.path()),
        &RoutingConfig::default(),
        DeviceType::Cpu,
    )
    .unwrap();
    assert_eq!(router.detector().config().threshold_for("GREETING"), 0.99999);

    let decision = router.route("hello").await;
    assert!(decision.is_escalated());
    assert_eq!(decision.original_label, "GREETING");
    assert!(decision.reasons()[0].starts_with("Low confidence"));
}

#[tokio::test]
async fn test_transaction_router_from_local_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = json!({
        "wordIndex": {"<PAD>": 0, "<UNK>": 1, "grab": 2, "petrol": 3, "starbucks": 4},
        "maxLen": 20,
        "maxVocabSize": 2000,
        "vocabSize": 5,
        "categoryIndex": {"0": "NEEDS", "1": "WANTS"},
        "subcategoryIndex": {"0": "Transport", "1": "Food", "2": "Others"}
    });
    let mut tensors = HashMap::new();
    tensors.insert(
        "embedding.weight".to_string(),
        matrix(&[[0., 0.], [0., 0.], [10., 0.], [10., 0.], [0., 10.]]),
    );
    tensors.insert("category.weight".to_string(), matrix(&[[1., 0.], [0., 1.]]));
    tensors.insert("category.bias".to_string(), zeros(2));
    tensors.insert(
        "subcategory.weight".to_string(),
        matrix(&[[1., 0.], [0., 1.], [0., 0.]]),
    );
    tensors.insert("subcategory.bias".to_string(), zeros(3));
    write_model(dir.path(), metadata, tensors);

    let router = TransactionRouter::load(
        &ArtifactSource::local(dir.path()),
        &RoutingConfig::default(),
        DeviceType::Cpu,
    )
    .unwrap();

    let prediction = router.route("GRAB petrol RM50").await;
    assert_eq!(prediction.category, "NEEDS");
    assert_eq!(prediction.subcategory, "Transport");
    assert!(prediction.note.is_none());

    let prediction = router.route("Starbucks").await;
    assert_eq!(prediction.category, "WANTS");
    assert_eq!(prediction.subcategory, "Food");

    let prediction = router.route("asdfgh123").await;
    assert_eq!(prediction.category, "WANTS");
    assert_eq!(prediction.subcategory, "Others");
    assert!(prediction.note.is_some());
}

#[test]
fn test_missing_weights_is_artifact_missing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("metadata.json"),
        intent_metadata().to_string(),
    )
    .unwrap();

    let err = IntentRouter::load(
        &ArtifactSource::local(dir.path()),
        &RoutingConfig::default(),
        DeviceType::Cpu,
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::ArtifactMissing { .. }));
}

#[test]
fn test_head_label_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let mut metadata = intent_metadata();
    metadata["intentIndex"] = json!({"0": "GREETING", "1": "NAV_EXPENSES"});
    write_model(dir.path(), metadata, intent_tensors());

    let err = IntentRouter::load(
        &ArtifactSource::local(dir.path()),
        &RoutingConfig::default(),
        DeviceType::Cpu,
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::ArtifactCorrupt(_)));
    assert!(err.is_fatal_at_startup());
}
