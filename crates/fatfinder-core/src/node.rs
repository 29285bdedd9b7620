//! File and directory entry types.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Stable handle for an entry within an [`EntryTree`](crate::EntryTree).
///
/// A handle pairs an arena slot with the generation of that slot. Slots are
/// reused after removal, but their generation moves on, so a handle to a
/// removed entry keeps resolving to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Create a handle for arena slot `index` at `generation`.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// A sized file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    /// Handle of this file.
    pub id: NodeId,
    /// Full path at scan time.
    pub path: PathBuf,
    /// Final path component.
    pub name: CompactString,
    /// Size in bytes, never 0.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Owning directory.
    pub parent: NodeId,
}

/// A directory and its aggregate statistics.
///
/// Children are held as handles into the owning tree, in enumeration order.
/// The directory is their only owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directory {
    /// Handle of this directory.
    pub id: NodeId,
    /// Full path at scan time.
    pub path: PathBuf,
    /// Final path component (the full path for a root).
    pub name: CompactString,
    /// Last modification time.
    pub modified: SystemTime,
    /// Owning directory, `None` for the root.
    pub parent: Option<NodeId>,
    /// Direct child files.
    pub files: Vec<NodeId>,
    /// Direct child directories.
    pub subfolders: Vec<NodeId>,
    /// Sum of the direct files' sizes.
    pub files_size: u64,
    /// `files_size` plus the subfolders' totals, 1 when that sum is 0.
    pub total_size: u64,
    /// Number of descendant entries, files and directories.
    pub num_items: u64,
}

impl Directory {
    pub(crate) fn new(
        id: NodeId,
        path: PathBuf,
        modified: SystemTime,
        parent: Option<NodeId>,
    ) -> Self {
        let name = entry_name(&path);
        Self {
            id,
            path,
            name,
            modified,
            parent,
            files: Vec::new(),
            subfolders: Vec::new(),
            files_size: 0,
            total_size: 0,
            num_items: 0,
        }
    }

    /// Whether the directory has not been sized yet.
    ///
    /// Placeholders created during enumeration keep a zero total until their
    /// own scan completes; a sized directory never has a zero total.
    pub fn is_placeholder(&self) -> bool {
        self.total_size == 0
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.files.len() + self.subfolders.len()
    }
}

/// A node in the entry tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entry {
    File(File),
    Directory(Directory),
}

impl Entry {
    /// Handle of this entry.
    pub fn id(&self) -> NodeId {
        match self {
            Entry::File(f) => f.id,
            Entry::Directory(d) => d.id,
        }
    }

    /// Full path of this entry.
    pub fn path(&self) -> &Path {
        match self {
            Entry::File(f) => &f.path,
            Entry::Directory(d) => &d.path,
        }
    }

    /// Display name of this entry.
    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => &f.name,
            Entry::Directory(d) => &d.name,
        }
    }

    /// Size in bytes; the aggregate total for directories.
    pub fn size(&self) -> u64 {
        match self {
            Entry::File(f) => f.size,
            Entry::Directory(d) => d.total_size,
        }
    }

    /// Last modification time.
    pub fn modified(&self) -> SystemTime {
        match self {
            Entry::File(f) => f.modified,
            Entry::Directory(d) => d.modified,
        }
    }

    /// Owning directory, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Entry::File(f) => Some(f.parent),
            Entry::Directory(d) => d.parent,
        }
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    /// Check if this entry is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut Directory> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Directory(_) => None,
        }
    }
}

/// Name shown for a path: its last component, or the whole path for roots
/// such as `/`.
pub(crate) fn entry_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42, 3);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 3);
        assert_ne!(id, NodeId::new(42, 4));
    }

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name(Path::new("/tmp/photos")), "photos");
        assert_eq!(entry_name(Path::new("/")), "/");
    }

    #[test]
    fn test_directory_placeholder() {
        let dir = Directory::new(
            NodeId::new(3, 0),
            PathBuf::from("/data/logs"),
            SystemTime::UNIX_EPOCH,
            Some(NodeId::new(0, 0)),
        );
        assert!(dir.is_placeholder());
        assert_eq!(dir.name, "logs");
        assert_eq!(dir.child_count(), 0);

        let entry = Entry::Directory(dir);
        assert!(entry.is_dir());
        assert_eq!(entry.parent(), Some(NodeId::new(0, 0)));
        assert_eq!(entry.size(), 0);
    }
}
