//! Translation management service.
//!
//! Stores keyed translations per locale in PostgreSQL and serves them as
//! nested JSON trees, cached per locale and invalidated on every write.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod export;
pub mod retry;
pub mod security;
pub mod store;
pub mod translations;
