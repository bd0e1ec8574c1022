//! Core types and shared functionality for tidyscrape.
//!
//! This crate provides:
//! - Cache implementation with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStats, ConditionalMeta, ConditionalOutcome, SanitizedDocument, compute_fingerprint};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
