//! Core types for fatfinder.
//!
//! This crate holds the in-memory mirror of a scanned directory subtree and
//! everything that works on it without touching the filesystem: size
//! aggregation, ancestor traversal, entry properties and display
//! formatting.

mod ancestors;
mod config;
mod error;
mod format;
mod node;
mod properties;
mod stats;
mod tree;

pub use ancestors::{Ancestors, ancestors_of};
pub use config::{DEFAULT_MAX_NAME_LENGTH, DEFAULT_MAX_PATH_LENGTH, ScanConfig, ScanConfigBuilder};
pub use error::{ScanError, ScanWarning, TreeError, WarningKind};
pub use format::{format_modified, format_percent, format_size, percent_of_parent};
pub use node::{Directory, Entry, File, NodeId};
pub use properties::{EntryProperties, FileKind, is_hidden_name, kind_label, permission_string};
pub use stats::{nonzero_total, recalculate_stats, refresh_stats};
pub use tree::{EntryTree, Walk};
