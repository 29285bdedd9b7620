//! Filesystem access used by the sizer.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fatfinder_core::{EntryProperties, FileKind, ScanConfig};

/// The filesystem operations a scan relies on.
///
/// Implementations must be shareable across worker threads.
pub trait FileSystem: Send + Sync {
    /// Immediate children of a directory, in enumeration order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Whether `path` is a directory to descend into.
    fn is_dir(&self, path: &Path) -> bool;

    /// Size of a file in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Last modification time.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Whether anything still exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy)]
pub struct OsFileSystem {
    follow_symlinks: bool,
    apparent_size: bool,
}

impl OsFileSystem {
    /// Apparent sizes, symlinks not followed.
    pub fn new() -> Self {
        Self {
            follow_symlinks: false,
            apparent_size: true,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            follow_symlinks: config.follow_symlinks,
            apparent_size: config.apparent_size,
        }
    }

    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        if self.follow_symlinks {
            std::fs::metadata(path)
        } else {
            std::fs::symlink_metadata(path)
        }
    }
}

impl OsFileSystem {
    /// Read the properties of a single entry.
    ///
    /// Symlinks are described as links unless `follow_symlinks` is set.
    pub fn properties(&self, path: &Path) -> io::Result<EntryProperties> {
        let metadata = self.metadata(path)?;
        let mut props = EntryProperties::new(path, file_kind(&metadata));
        props.apparent_size = metadata.len();
        props.modified = metadata.modified().ok();
        if !metadata.is_dir() {
            props.size_on_disk = Some(disk_usage(&metadata));
        }
        Ok(apply_permissions(props, &metadata))
    }
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for OsFileSystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).is_ok_and(|m| m.is_dir())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        let metadata = self.metadata(path)?;
        if self.apparent_size {
            Ok(metadata.len())
        } else {
            Ok(disk_usage(&metadata))
        }
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.metadata(path)?.modified()
    }

    fn exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }
}

/// Bytes allocated on disk, from the 512-byte block count.
#[cfg(unix)]
fn disk_usage(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.blocks() * 512
}

#[cfg(not(unix))]
fn disk_usage(metadata: &Metadata) -> u64 {
    // Estimate from file size, rounded up to whole blocks
    metadata.len().div_ceil(512) * 512
}

#[cfg(unix)]
fn file_kind(metadata: &Metadata) -> FileKind {
    use std::os::unix::fs::MetadataExt;
    FileKind::from_mode(metadata.mode())
}

#[cfg(not(unix))]
fn file_kind(metadata: &Metadata) -> FileKind {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::RegularFile
    } else {
        FileKind::Unknown
    }
}

#[cfg(unix)]
fn apply_permissions(props: EntryProperties, metadata: &Metadata) -> EntryProperties {
    use std::os::unix::fs::MetadataExt;
    props.with_mode(metadata.mode())
}

#[cfg(not(unix))]
fn apply_permissions(mut props: EntryProperties, metadata: &Metadata) -> EntryProperties {
    props.read_only = metadata.permissions().readonly();
    props
}
