//! Core library for the token-pulse project.
//!
//! Merges a periodically polled REST market snapshot with a websocket price
//! stream into one per-token read model, falling back to a bundled dataset
//! when the snapshot is unavailable.

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod models;
pub mod query;
pub mod snapshot;
pub mod store;
pub mod stream;
pub mod utils;

pub use aggregator::PulseRuntime;
pub use errors::{AppError, Result};
pub use models::{Category, PriceDelta, ReadModel, Token};
