//! Beruang Server
//!
//! HTTP surface over the transaction and intent routers, plus the offline
//! intent evaluation command.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use routes::create_router;
pub use state::{AppState, ModelSlot, ModelStatus};
