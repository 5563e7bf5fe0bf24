//! View service configuration
//!
//! Configuration can be built in code or loaded from YAML:
//!
//! ```yaml
//! viewPaths:
//!   - resources/views
//! cachePath: /var/cache/hilt
//! fileExtensions: [hilt.html]
//! cacheMode: 0o775
//! ```
//!
//! The cache directory can also be forced process-wide, either with
//! [`set_cache_path_override`] or through the `HILT_CACHE_PATH` environment
//! variable. The override beats any path given in configuration.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_MODE;
use crate::error::Result;
use crate::paths::DEFAULT_EXTENSION;

/// Environment variable consulted when no override was set in code
pub const CACHE_PATH_ENV: &str = "HILT_CACHE_PATH";

static CACHE_PATH_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Force every view service built afterwards to use `path` as cache directory
///
/// Passing `None` removes the override.
pub fn set_cache_path_override(path: Option<PathBuf>) {
    let mut guard = CACHE_PATH_OVERRIDE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *guard = path;
}

/// The active cache path override, if any and non-empty
pub fn cache_path_override() -> Option<PathBuf> {
    let explicit = CACHE_PATH_OVERRIDE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    explicit
        .or_else(|| std::env::var_os(CACHE_PATH_ENV).map(PathBuf::from))
        .filter(|p| !p.as_os_str().is_empty())
}

/// Configuration for a view service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Ordered search paths, earlier entries win
    pub view_paths: Vec<PathBuf>,

    /// Cache directory for compiled views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    /// Recognised view file extensions, tried in order
    #[serde(default = "default_extensions")]
    pub file_extensions: Vec<String>,

    /// Permissions used when the cache directory has to be created
    #[serde(default = "default_cache_mode")]
    pub cache_mode: u32,
}

fn default_extensions() -> Vec<String> {
    vec![DEFAULT_EXTENSION.to_string()]
}

fn default_cache_mode() -> u32 {
    DEFAULT_CACHE_MODE
}

impl ServiceConfig {
    pub fn new<I, P>(view_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            view_paths: view_paths.into_iter().map(Into::into).collect(),
            cache_path: None,
            file_extensions: default_extensions(),
            cache_mode: default_cache_mode(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
