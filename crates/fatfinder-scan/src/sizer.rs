//! Recursive, sequential folder sizer.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fatfinder_core::{
    EntryTree, NodeId, ScanConfig, ScanError, ScanWarning, nonzero_total,
};

use crate::fs::{FileSystem, OsFileSystem};

/// Result of sizing one folder.
#[derive(Debug, Clone, Serialize)]
pub struct SizedFolder {
    /// Tree rooted at the scanned folder.
    pub tree: EntryTree,
    /// When this scan finished.
    pub scanned_at: SystemTime,
    /// Duration of the scan.
    pub scan_duration: Duration,
    /// Subtrees left out of the tree and other non-fatal problems.
    pub warnings: Vec<ScanWarning>,
}

impl SizedFolder {
    /// Aggregate size of the scanned folder.
    pub fn total_size(&self) -> u64 {
        self.tree.root_directory().total_size
    }

    /// Number of entries below the scanned folder.
    pub fn num_items(&self) -> u64 {
        self.tree.root_directory().num_items
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Builds an [`EntryTree`] for a folder, one directory level at a time.
///
/// Each level is enumerated first; files are sized on the spot and
/// subfolders are recorded as placeholders, then sized depth-first one after
/// another. A subfolder that cannot be read is dropped from its parent and
/// reported as a warning; only a failure at the scanned folder itself fails
/// the scan.
#[derive(Clone)]
pub struct FolderSizer {
    fs: Arc<dyn FileSystem>,
    config: ScanConfig,
    ignore: GlobSet,
    cancel: CancellationToken,
}

type ProgressSink<'a> = &'a mut dyn FnMut(f64, &EntryTree);

impl FolderSizer {
    /// Create a sizer over the real filesystem.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let fs = Arc::new(OsFileSystem::from_config(&config));
        Self::with_filesystem(config, fs)
    }

    /// Create a sizer over a custom filesystem.
    pub fn with_filesystem(config: ScanConfig, fs: Arc<dyn FileSystem>) -> Result<Self, ScanError> {
        let ignore = build_ignore_set(&config.ignore_patterns)?;
        Ok(Self {
            fs,
            config,
            ignore,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop scanning once `token` is cancelled.
    ///
    /// The token is checked before each directory is enumerated.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Whether the cancellation token has been triggered.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn filesystem(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Size the folder at `path`.
    ///
    /// `on_progress` is called after each immediate subfolder of `path` is
    /// done, with the finished share and the tree so far. A folder without
    /// subfolders reports a single `1.0` once it is sized. The last event of
    /// a successful scan always carries `1.0`.
    pub fn scan(
        &self,
        path: &Path,
        mut on_progress: impl FnMut(f64, &EntryTree),
    ) -> Result<SizedFolder, ScanError> {
        let start = Instant::now();
        self.check_length(path)?;

        if !self.fs.is_dir(path) {
            if self.fs.exists(path) {
                return Err(ScanError::NotADirectory {
                    path: path.to_path_buf(),
                });
            }
            return Err(ScanError::PathVanished {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "sizing folder");

        let modified = self.fs.modified(path).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut tree = EntryTree::new(path, modified);
        let mut warnings = Vec::new();
        let root = tree.root();

        let subfolders = self.size_directory(&mut tree, root, &mut warnings, Some(&mut on_progress))?;
        if subfolders == 0 {
            on_progress(1.0, &tree);
        }

        let scan_duration = start.elapsed();
        debug!(
            path = %path.display(),
            entries = tree.len(),
            warnings = warnings.len(),
            elapsed_ms = scan_duration.as_millis() as u64,
            "folder sized"
        );

        Ok(SizedFolder {
            tree,
            scanned_at: SystemTime::now(),
            scan_duration,
            warnings,
        })
    }

    /// Size directory `id` and everything below it.
    ///
    /// Returns the number of subfolders found during enumeration, including
    /// those dropped later because they failed.
    fn size_directory(
        &self,
        tree: &mut EntryTree,
        id: NodeId,
        warnings: &mut Vec<ScanWarning>,
        mut progress: Option<ProgressSink<'_>>,
    ) -> Result<usize, ScanError> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Interrupted);
        }

        let path = tree
            .directory(id)
            .map(|dir| dir.path.clone())
            .ok_or_else(|| ScanError::Other {
                message: format!("directory {id:?} missing from tree"),
            })?;
        self.check_length(&path)?;

        let children = self
            .fs
            .read_dir(&path)
            .map_err(|e| ScanError::enumeration(&path, e))?;

        for child in children {
            let name = child
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.is_skipped(&name) {
                continue;
            }

            let modified = self.fs.modified(&child).unwrap_or(SystemTime::UNIX_EPOCH);
            if self.fs.is_dir(&child) {
                tree.add_directory(id, child, modified)?;
            } else {
                let size = match self.fs.file_size(&child) {
                    Ok(size) => size,
                    Err(err) => {
                        warnings.push(ScanWarning::metadata(&child, &err));
                        1
                    }
                };
                tree.add_file(id, child, size, modified)?;
            }
        }

        let subfolders = {
            let dir = tree.directory(id).ok_or(fatfinder_core::TreeError::UnknownNode(id))?;
            let files_size: u64 = dir
                .files
                .iter()
                .filter_map(|f| tree.file(*f))
                .map(|f| f.size)
                .sum();
            let file_count = dir.files.len() as u64;
            let subfolders = dir.subfolders.clone();
            if let Some(dir) = tree.directory_mut(id) {
                dir.files_size = files_size;
                dir.total_size = files_size;
                dir.num_items = file_count;
            }
            subfolders
        };

        let total = subfolders.len();
        for (done, sub) in subfolders.into_iter().enumerate() {
            match self.size_directory(tree, sub, warnings, None) {
                Ok(_) => {
                    let (sub_total, sub_items) = tree
                        .directory(sub)
                        .map(|d| (d.total_size, d.num_items))
                        .unwrap_or_default();
                    if let Some(dir) = tree.directory_mut(id) {
                        dir.total_size += sub_total;
                        dir.num_items += sub_items + 1;
                    }
                }
                Err(err) if err.is_recoverable() => {
                    let sub_path = tree
                        .get(sub)
                        .map(|e| e.path().to_path_buf())
                        .unwrap_or_default();
                    warn!(path = %sub_path.display(), error = %err, "skipping folder");
                    warnings.push(ScanWarning::skipped(sub_path, &err));
                    tree.discard(sub)?;
                }
                Err(err) => return Err(err),
            }

            if let Some(sink) = progress.as_deref_mut() {
                sink((done + 1) as f64 / total as f64, tree);
            }
        }

        if let Some(dir) = tree.directory_mut(id) {
            dir.total_size = nonzero_total(dir.total_size);
        }
        Ok(total)
    }

    fn check_length(&self, path: &Path) -> Result<(), ScanError> {
        match self.config.path_length_violation(path) {
            Some((length, limit)) => Err(ScanError::PathTooLong {
                path: path.to_path_buf(),
                length,
                limit,
            }),
            None => Ok(()),
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.config.should_skip_hidden(name) || self.ignore.is_match(name)
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::InvalidConfig {
        message: e.to_string(),
    })
}
