//! Application state and background model loading

use beruang_classifiers::{IntentRouter, TransactionRouter};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;

/// Load state of one model, as reported by `/ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed,
}

enum SlotState<T> {
    Loading,
    Ready(Arc<T>),
    Failed(String),
}

/// A model that becomes available once its background load finishes
pub struct ModelSlot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T> ModelSlot<T> {
    pub fn loading() -> Self {
        Self {
            state: RwLock::new(SlotState::Loading),
        }
    }

    pub fn ready(model: T) -> Self {
        Self {
            state: RwLock::new(SlotState::Ready(Arc::new(model))),
        }
    }

    pub fn set_ready(&self, model: T) {
        *self.state.write() = SlotState::Ready(Arc::new(model));
    }

    pub fn set_failed(&self, reason: impl Into<String>) {
        *self.state.write() = SlotState::Failed(reason.into());
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.state.read() {
            SlotState::Loading => ModelStatus::Loading,
            SlotState::Ready(_) => ModelStatus::Ready,
            SlotState::Failed(_) => ModelStatus::Failed,
        }
    }

    /// The loaded model, or the status explaining why there is none
    pub fn get(&self) -> Result<Arc<T>, ModelStatus> {
        match &*self.state.read() {
            SlotState::Ready(model) => Ok(Arc::clone(model)),
            SlotState::Loading => Err(ModelStatus::Loading),
            SlotState::Failed(_) => Err(ModelStatus::Failed),
        }
    }

    /// Load failure message, if the load failed
    pub fn failure(&self) -> Option<String> {
        match &*self.state.read() {
            SlotState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Transaction category router
    pub transaction: Arc<ModelSlot<TransactionRouter>>,

    /// Intent router
    pub intent: Arc<ModelSlot<IntentRouter>>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// State with both models still loading
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            transaction: Arc::new(ModelSlot::loading()),
            intent: Arc::new(ModelSlot::loading()),
            metrics_handle,
        }
    }

    /// Load both models concurrently on the blocking pool
    ///
    /// Failures are logged and leave the slot `failed`; the process keeps
    /// serving `/health` and reports not-ready.
    pub fn spawn_loading(&self) -> Vec<JoinHandle<()>> {
        let device = self.config.device.to_device_type();

        let source = self.config.transaction_model.clone();
        let routing = self.config.routing.clone();
        let transaction = spawn_load("transaction", Arc::clone(&self.transaction), move || {
            TransactionRouter::load(&source, &routing, device)
        });

        let source = self.config.intent_model.clone();
        let routing = self.config.routing.clone();
        let intent = spawn_load("intent", Arc::clone(&self.intent), move || {
            IntentRouter::load(&source, &routing, device)
        });

        vec![transaction, intent]
    }

    pub fn is_ready(&self) -> bool {
        self.transaction.status() == ModelStatus::Ready && self.intent.status() == ModelStatus::Ready
    }
}

fn spawn_load<T, F>(name: &'static str, slot: Arc<ModelSlot<T>>, load: F) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> beruang_core::Result<T> + Send + 'static,
{
    tokio::spawn(async move {
        info!(model = name, "Loading model");
        let start = Instant::now();

        match tokio::task::spawn_blocking(load).await {
            Ok(Ok(model)) => {
                slot.set_ready(model);
                info!(
                    model = name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model ready"
                );
            }
            Ok(Err(e)) => {
                error!(model = name, error = %e, "Failed to load model");
                slot.set_failed(e.to_string());
            }
            Err(e) => {
                error!(model = name, error = %e, "Model loading task aborted");
                slot.set_failed(format!("loading task aborted: {}", e));
            }
        }
    })
}
