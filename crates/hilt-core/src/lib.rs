//! Hilt Core - Core types for the Hilt view service
//!
//! This crate provides the filesystem side of view rendering:
//! - `ViewPaths` / `ViewFinder`: ordered search paths and view name resolution
//! - `CacheDir`: cache directory resolution and validation
//! - `CompiledCache`: storage for compiled views
//! - `ServiceConfig`: configuration and the cache path override hook

pub mod cache;
pub mod config;
pub mod error;
pub mod paths;

pub use cache::{CacheDir, CompiledCache, DEFAULT_CACHE_MODE, fingerprint};
pub use config::{ServiceConfig, cache_path_override, set_cache_path_override};
pub use error::{CoreError, Result};
pub use paths::{DEFAULT_EXTENSION, ViewFinder, ViewPaths};
