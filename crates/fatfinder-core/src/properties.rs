//! Per-entry properties shown by `fatfinder info`.

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::node::entry_name;

const S_IFMT: u32 = 0o170000;

/// File type decoded from the `st_mode` type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}

impl FileKind {
    /// Decode the type bits of a Unix mode.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            0o100000 => Self::RegularFile,
            0o040000 => Self::Directory,
            0o120000 => Self::Symlink,
            0o060000 => Self::BlockDevice,
            0o020000 => Self::CharDevice,
            0o010000 => Self::Fifo,
            0o140000 => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RegularFile => "regular file",
            Self::Directory => "directory",
            Self::Symlink => "symbolic link",
            Self::BlockDevice => "block device",
            Self::CharDevice => "character device",
            Self::Fifo => "FIFO",
            Self::Socket => "socket",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Metadata of a single file or folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryProperties {
    pub name: CompactString,
    /// `"Folder"` or `"<extension> File"`.
    pub kind: String,
    pub file_type: FileKind,
    /// Length reported by the filesystem. For folders this is the size of
    /// the directory record, not of its contents.
    pub apparent_size: u64,
    /// Allocated bytes; `None` for folders.
    pub size_on_disk: Option<u64>,
    pub modified: Option<SystemTime>,
    pub hidden: bool,
    pub read_only: bool,
    pub executable: bool,
    /// `rwxrwxrwx` string; only known on Unix.
    pub permissions: Option<String>,
}

impl EntryProperties {
    /// Properties that only depend on the path and type.
    pub fn new(path: &Path, file_type: FileKind) -> Self {
        let is_dir = file_type == FileKind::Directory;
        Self {
            name: entry_name(path),
            kind: kind_label(path, is_dir),
            file_type,
            apparent_size: 0,
            size_on_disk: None,
            modified: None,
            hidden: is_hidden_name(&entry_name(path)),
            read_only: false,
            executable: false,
            permissions: None,
        }
    }

    /// Fill the mode-derived fields from a Unix mode.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.read_only = mode & 0o200 == 0 && mode & 0o002 == 0;
        self.executable = self.file_type != FileKind::Directory && mode & 0o101 != 0;
        self.permissions = Some(permission_string(mode));
        self
    }
}

/// Render the permission bits of `mode` as `rwxrwxrwx`.
pub fn permission_string(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}

/// Human label for what an entry is, based on its extension.
pub fn kind_label(path: &Path, is_dir: bool) -> String {
    if is_dir {
        return "Folder".to_string();
    }
    match path.extension() {
        Some(ext) if !ext.is_empty() => format!("{} File", ext.to_string_lossy()),
        _ => "extensionless File".to_string(),
    }
}

/// Dot-files count as hidden.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
