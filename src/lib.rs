//! StreamHub library crate
//!
//! Re-exports core modules for the binary and integration tests.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod media;
pub mod models;
pub mod services;
pub mod store;
pub mod views;

// Re-export commonly used types
pub use config::Config;
pub use database::Database;
pub use error::{Error, Result};
pub use services::{ContentService, SocialService};
pub use store::{MemoryStore, PgStore};
