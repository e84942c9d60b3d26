//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use beruang_core::{format_percent, RoutingDecision, TransactionPrediction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::state::{AppState, ModelStatus};

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit;

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/classify", post(classify_transaction))
        .route("/intent", post(classify_intent))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn readiness(State(state): State<AppState>) -> Response {
    let status = if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "ready": status == StatusCode::OK,
        "models": {
            "transaction": state.transaction.status(),
            "intent": state.intent.status(),
        },
    });

    (status, Json(body)).into_response()
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Transaction classification request
#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    input: String,
    prediction: TransactionBody,
}

#[derive(Debug, Serialize)]
struct TransactionBody {
    category: String,
    subcategory: String,
    confidence: ConfidenceBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfidenceBody {
    category: String,
    subcategory: String,
}

impl From<TransactionPrediction> for TransactionBody {
    fn from(prediction: TransactionPrediction) -> Self {
        Self {
            confidence: ConfidenceBody {
                category: format_percent(prediction.category_confidence),
                subcategory: format_percent(prediction.subcategory_confidence),
            },
            category: prediction.category,
            subcategory: prediction.subcategory,
            note: prediction.note,
        }
    }
}

/// Intent classification request
#[derive(Debug, Deserialize)]
struct IntentRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct IntentResponse {
    input: String,
    prediction: IntentBody,
}

#[derive(Debug, Serialize)]
struct IntentBody {
    intent: String,
    original_intent: String,
    confidence: String,
    ood_analysis: OodAnalysis,
}

#[derive(Debug, Serialize)]
struct OodAnalysis {
    is_ood: bool,
    reasons: Vec<String>,
    entropy: Option<f32>,
    gap: Option<f32>,
}

impl From<RoutingDecision> for IntentBody {
    fn from(decision: RoutingDecision) -> Self {
        Self {
            confidence: format_percent(decision.confidence),
            ood_analysis: OodAnalysis {
                is_ood: decision.is_escalated(),
                reasons: decision.reasons().to_vec(),
                entropy: decision.entropy,
                gap: decision.gap,
            },
            intent: decision.final_label,
            original_intent: decision.original_label,
        }
    }
}

/// Classify a transaction description into category and subcategory
async fn classify_transaction(
    State(state): State<AppState>,
    payload: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassifyResponse>, AppError> {
    metrics::counter!("beruang_requests_total", "route" => "classify").increment(1);
    let request_id = Uuid::new_v4();

    let Json(req) = payload?;
    let description = required_text(req.description)
        .map_err(|e| AppError::InvalidInput("description", e))?;
    let router = state
        .transaction
        .get()
        .map_err(|status| AppError::ModelUnavailable("transaction", status))?;

    let start = Instant::now();
    let prediction = router.route(&description).await;
    metrics::histogram!("beruang_routing_latency_us", "route" => "classify")
        .record(start.elapsed().as_micros() as f64);

    if prediction.is_fallback() {
        metrics::counter!("beruang_fallbacks_total").increment(1);
    }
    debug!(
        %request_id,
        category = %prediction.category,
        subcategory = %prediction.subcategory,
        fallback = prediction.is_fallback(),
        "Transaction classified"
    );

    Ok(Json(ClassifyResponse {
        input: description,
        prediction: prediction.into(),
    }))
}

/// Route a chat message to an intent, escalating when the model is unsure
async fn classify_intent(
    State(state): State<AppState>,
    payload: Result<Json<IntentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    metrics::counter!("beruang_requests_total", "route" => "intent").increment(1);
    let request_id = Uuid::new_v4();

    let Json(req) = payload?;
    let message =
        required_text(req.message).map_err(|e| AppError::InvalidInput("message", e))?;
    let router = state
        .intent
        .get()
        .map_err(|status| AppError::ModelUnavailable("intent", status))?;

    let start = Instant::now();
    let task = {
        let router = router.clone();
        let message = message.clone();
        tokio::spawn(async move { router.route(&message).await })
    };

    let (status, decision) = match task.await {
        Ok(decision) => (StatusCode::OK, decision),
        Err(e) => {
            error!(%request_id, error = %e, "Intent routing task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                router.detector().classifier_failure(),
            )
        }
    };
    metrics::histogram!("beruang_routing_latency_us", "route" => "intent")
        .record(start.elapsed().as_micros() as f64);

    if decision.is_escalated() {
        metrics::counter!("beruang_escalations_total", "route" => "intent").increment(1);
        info!(
            %request_id,
            original = %decision.original_label,
            reasons = ?decision.reasons(),
            "Intent escalated"
        );
    } else {
        debug!(%request_id, intent = %decision.final_label, "Intent resolved");
    }

    let body = IntentResponse {
        input: message,
        prediction: decision.into(),
    };
    Ok((status, Json(body)).into_response())
}

/// The text as sent, rejecting an absent or blank field
fn required_text(value: Option<String>) -> beruang_core::Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(beruang_core::Error::InputEmpty),
    }
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    InvalidInput(&'static str, beruang_core::Error),
    PayloadTooLarge,
    ModelUnavailable(&'static str, ModelStatus),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request_error", msg),
            AppError::InvalidInput(field, err) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("Missing or empty '{}' field: {}", field, err),
            ),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "invalid_request_error",
                "Request body too large".to_string(),
            ),
            AppError::ModelUnavailable(model, status) => {
                let state = match status {
                    ModelStatus::Failed => "failed to load",
                    _ => "still loading",
                };
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "model_unavailable",
                    format!("The {} model is {}", model, state),
                )
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
