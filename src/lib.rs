//! Virtual storage-engine statistics server.
//!
//! This library holds the estimation engine: the value codec, histogram store, range
//! decoder, table statistics, estimator strategies, ground-truth overlay, task registry,
//! request dispatcher, and metadata construction. `main.rs` wires these into an HTTP server.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use handlers::AppState;
