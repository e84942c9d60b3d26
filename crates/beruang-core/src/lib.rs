//! Beruang Core
//!
//! Core types and utilities shared across Beruang components.
//!
//! This crate provides:
//! - Reserved vocabulary ids and the fixed-width token sequence fed to classifiers
//! - Routing decisions for intent routing and predictions for transaction categorization
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    format_percent, Route, RoutingDecision, TokenSequence, TransactionPrediction, PAD_ID, UNK_ID,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{Route, RoutingDecision, TokenSequence, TransactionPrediction};
}
