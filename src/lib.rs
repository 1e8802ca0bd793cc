//! Civic feed library crate
//!
//! Re-exports core modules for the binary, integration tests and external use.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod feed;

// Re-export commonly used types
pub use api::AppState;
pub use auth::Authenticator;
pub use config::Config;
pub use database::Database;
pub use error::{Error, Result};
pub use feed::{FeedEngine, FeedRequest, FeedResponse, FeedStore, PgFeedStore};
