//! Scan configuration types.

use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::properties::is_hidden_name;

/// Longest path accepted for a scan, in bytes.
#[cfg(windows)]
pub const DEFAULT_MAX_PATH_LENGTH: usize = 247;
/// Longest path accepted for a scan, in bytes.
#[cfg(not(windows))]
pub const DEFAULT_MAX_PATH_LENGTH: usize = 4096;

/// Longest single path component accepted for a scan, in bytes.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

/// Configuration for sizing operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Follow symbolic links to directories.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Use apparent size vs disk usage.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub apparent_size: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Names to skip, glob syntax.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Path length ceiling, checked before touching the filesystem.
    #[builder(default = "DEFAULT_MAX_PATH_LENGTH")]
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,

    /// Path component length ceiling.
    #[builder(default = "DEFAULT_MAX_NAME_LENGTH")]
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_path_length() -> usize {
    DEFAULT_MAX_PATH_LENGTH
}

fn default_max_name_length() -> usize {
    DEFAULT_MAX_NAME_LENGTH
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_path_length == Some(0) {
            return Err("max_path_length must be positive".to_string());
        }
        if self.max_name_length == Some(0) {
            return Err("max_name_length must be positive".to_string());
        }
        if let Some(ref patterns) = self.ignore_patterns {
            if patterns.iter().any(|p| p.is_empty()) {
                return Err("Ignore patterns cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && is_hidden_name(name)
    }

    /// Length of `path` if it exceeds a configured ceiling, with that ceiling.
    pub fn path_length_violation(&self, path: &Path) -> Option<(usize, usize)> {
        let length = path.as_os_str().len();
        if length > self.max_path_length {
            return Some((length, self.max_path_length));
        }
        let name_length = path.file_name().map_or(0, |n| n.len());
        if name_length > self.max_name_length {
            return Some((name_length, self.max_name_length));
        }
        None
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            apparent_size: true,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}
