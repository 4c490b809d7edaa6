//! Client for the remote management API: typed endpoints, wire-shape
//! normalization, and cache key construction.

pub mod client;
pub mod keys;
pub mod types;
pub mod wire;

pub use client::{ApiClient, ApiError, ApiResult};
pub use wire::{Page, PageMeta};
