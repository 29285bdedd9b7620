//! Folder sizing engine for fatfinder.
//!
//! This crate walks a directory, builds an [`EntryTree`] with aggregate
//! sizes, and keeps that tree current by rescanning single branches.
//!
//! # Overview
//!
//! - **Sequential sizing** with [`FolderSizer`], one subfolder at a time
//! - **Progress snapshots** after each top-level subfolder via [`ScanProgress`]
//! - **Branch reloads** with [`ReloadCoordinator`], spliced in place under a
//!   write lock
//! - **Pluggable filesystem** through the [`FileSystem`] trait
//!
//! # Example
//!
//! ```rust,no_run
//! use fatfinder_scan::{FolderSizer, ScanConfig, format_size};
//!
//! let sizer = FolderSizer::new(ScanConfig::default()).unwrap();
//! let sized = sizer
//!     .scan("/path/to/scan".as_ref(), |fraction, _| {
//!         eprintln!("{:.0}%", fraction * 100.0);
//!     })
//!     .unwrap();
//!
//! println!("Total size: {}", format_size(sized.total_size()));
//! ```
//!
//! # Background scans and reloads
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use fatfinder_scan::{FolderSizer, ReloadCoordinator, ScanConfig, start_scan};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sizer = FolderSizer::new(ScanConfig::default())?;
//! let mut task = start_scan(&sizer, "/path/to/scan");
//! while let Some(progress) = task.progress_rx.recv().await {
//!     println!("{}% done", progress.percent());
//! }
//! let sized = task.join().await?;
//!
//! let coordinator = ReloadCoordinator::new(Arc::new(RwLock::new(sized.tree)), sizer);
//! let root = coordinator.tree().read().root();
//! let outcome = coordinator.reload(root)?.join().await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod fs;
mod progress;
mod reload;
mod sizer;
mod task;

pub use fs::{FileSystem, OsFileSystem};
pub use progress::ScanProgress;
pub use reload::{ReloadCoordinator, ReloadError, ReloadOutcome, ReloadTask, SharedTree};
pub use sizer::{FolderSizer, SizedFolder};
pub use task::{ScanTask, start_scan};

// Re-export core types for convenience
pub use fatfinder_core::{
    Directory, Entry, EntryProperties, EntryTree, File, FileKind, NodeId, ScanConfig, ScanError,
    ScanWarning, TreeError, WarningKind, format_percent, format_size,
};
