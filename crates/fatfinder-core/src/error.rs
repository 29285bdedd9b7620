//! Error types for scanning and tree operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeId;

/// Errors that can occur while sizing a directory.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Path exceeds the platform path or name length ceiling.
    #[error("Path too long ({length} > {limit}): {path}")]
    PathTooLong {
        path: PathBuf,
        length: usize,
        limit: usize,
    },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path no longer exists.
    #[error("Path vanished: {path}")]
    PathVanished { path: PathBuf },

    /// Directory could not be enumerated.
    #[error("Cannot enumerate {path}: {source}")]
    Enumeration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scanned path is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Scan was cancelled.
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Structural edit of the tree under construction failed.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an enumeration error with path context.
    pub fn enumeration(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::PathVanished { path },
            _ => Self::Enumeration { path, source },
        }
    }

    /// Whether a nested occurrence of this error only drops one subtree.
    ///
    /// Cancellation, configuration and tree errors abort the whole scan.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ScanError::Interrupted
                | ScanError::InvalidConfig { .. }
                | ScanError::Tree(_)
                | ScanError::Other { .. }
        )
    }
}

/// Errors from structural edits of an [`EntryTree`](crate::EntryTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Handle does not name a live entry.
    #[error("Unknown entry {0:?}")]
    UnknownNode(NodeId),

    /// Handle names a file where a directory is required.
    #[error("Entry {0:?} is not a directory")]
    NotADirectory(NodeId),

    /// The root of a tree cannot be removed.
    #[error("Cannot remove the root entry")]
    RootRemoval,
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Directory disappeared while scanning.
    PathVanished,
    /// Path exceeded the length ceiling.
    PathTooLong,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal warning encountered during scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a metadata warning for a file whose size could not be read.
    pub fn metadata(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("Metadata error: {error}"),
            path,
            kind: WarningKind::MetadataError,
        }
    }

    /// Record a skipped subtree.
    pub fn skipped(path: impl Into<PathBuf>, error: &ScanError) -> Self {
        let kind = match error {
            ScanError::PermissionDenied { .. } => WarningKind::PermissionDenied,
            ScanError::PathVanished { .. } => WarningKind::PathVanished,
            ScanError::PathTooLong { .. } => WarningKind::PathTooLong,
            _ => WarningKind::ReadError,
        };
        Self::new(path, error.to_string(), kind)
    }
}
