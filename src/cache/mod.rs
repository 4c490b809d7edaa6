//! TTL-based key-value cache for API responses.
//!
//! This module provides an endpoint-agnostic caching mechanism that:
//! - Keeps an in-memory mirror for synchronous reads, warmed at startup
//! - Persists entries to SQLite with a per-entry TTL
//! - Treats every store failure as a cache miss, never an error
//! - Supports pattern invalidation for whole families of paginated keys

mod service;
mod store;

pub use service::CacheService;
pub use store::{CacheStore, NoopStore, SqliteStore};
