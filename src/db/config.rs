//! Database configuration.

use std::path::PathBuf;

/// default metadata directory, relative to a project root
pub const DEFAULT_METADATA_PATH: &str = ".renku/metadata";

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the metadata directory.
    pub path: PathBuf,
    /// Create the directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Compress object files of types registered as compressible.
    pub compress: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_METADATA_PATH),
            create_if_missing: true,
            compress: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set compress flag.
    pub fn compress(mut self, value: bool) -> Self {
        self.compress = value;
        self
    }
}
