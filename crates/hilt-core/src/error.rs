//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("At least one view path is required")]
    EmptyViewPaths,

    #[error("Cache path [{}] does not exist and could not be created: {source}", path.display())]
    CacheNotCreatable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache path [{}] is not a directory or is not writable", path.display())]
    CacheNotWritable { path: PathBuf },

    #[error("Failed to parse view service config: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error comes from invalid construction arguments
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyViewPaths | Self::CacheNotCreatable { .. } | Self::CacheNotWritable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
