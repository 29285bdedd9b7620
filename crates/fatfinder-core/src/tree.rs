//! Arena-backed entry tree.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::node::{Directory, Entry, File, NodeId, entry_name};
use crate::stats::nonzero_total;

/// In-memory mirror of a directory subtree.
///
/// Every entry lives in a single arena indexed by [`NodeId`]. Directories own
/// their children by listing their handles; the parent handle stored on each
/// entry is only used to walk upwards. Slots of removed entries go on a free
/// list and are handed out again under the next generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

impl EntryTree {
    /// Create a tree holding only an unsized root directory.
    pub fn new(root_path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        let root = NodeId::new(0, 0);
        let dir = Directory::new(root, root_path.into(), modified, None);
        Self {
            slots: vec![Slot {
                generation: 0,
                entry: Some(Entry::Directory(dir)),
            }],
            free: Vec::new(),
            root,
            live: 1,
        }
    }

    /// Handle of the root directory.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root directory.
    pub fn root_directory(&self) -> &Directory {
        match self.get(self.root) {
            Some(Entry::Directory(dir)) => dir,
            _ => unreachable!("the root slot always holds a directory"),
        }
    }

    /// Look up an entry.
    pub fn get(&self, id: NodeId) -> Option<&Entry> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Look up a directory.
    pub fn directory(&self, id: NodeId) -> Option<&Directory> {
        self.get(id).and_then(Entry::as_directory)
    }

    /// Look up a directory for updating its aggregates.
    pub fn directory_mut(&mut self, id: NodeId) -> Option<&mut Directory> {
        self.get_mut(id).and_then(Entry::as_directory_mut)
    }

    /// Look up a file.
    pub fn file(&self, id: NodeId) -> Option<&File> {
        self.get(id).and_then(Entry::as_file)
    }

    /// Check whether a handle names a live entry.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live entries, the root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of arena slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Handle the next [`insert`](Self::insert) will occupy.
    fn next_id(&self) -> NodeId {
        match self.free.last() {
            Some(&index) => NodeId::new(index, self.slots[index as usize].generation),
            None => NodeId::new(self.slots.len() as u32, 0),
        }
    }

    /// Store `entry` in the slot named by its own handle, which must come
    /// from `next_id` with no allocation in between.
    fn insert(&mut self, entry: Entry) {
        let id = entry.id();
        if id.index() == self.slots.len() {
            self.slots.push(Slot {
                generation: id.generation(),
                entry: Some(entry),
            });
        } else {
            debug_assert_eq!(self.free.last().map(|i| *i as usize), Some(id.index()));
            self.free.pop();
            self.slots[id.index()].entry = Some(entry);
        }
        self.live += 1;
    }

    fn take(&mut self, id: NodeId) -> Option<Entry> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;
        Some(entry)
    }

    fn require_directory(&self, id: NodeId) -> Result<&Directory, TreeError> {
        match self.get(id) {
            Some(Entry::Directory(dir)) => Ok(dir),
            Some(Entry::File(_)) => Err(TreeError::NotADirectory(id)),
            None => Err(TreeError::UnknownNode(id)),
        }
    }

    /// Append a sized file to `parent`.
    ///
    /// Sizes of 0 are stored as 1. Aggregates of `parent` are not touched.
    pub fn add_file(
        &mut self,
        parent: NodeId,
        path: impl Into<PathBuf>,
        size: u64,
        modified: SystemTime,
    ) -> Result<NodeId, TreeError> {
        self.require_directory(parent)?;
        let id = self.next_id();
        let path = path.into();
        self.insert(Entry::File(File {
            id,
            name: entry_name(&path),
            path,
            size: size.max(1),
            modified,
            parent,
        }));
        if let Some(dir) = self.directory_mut(parent) {
            dir.files.push(id);
        }
        Ok(id)
    }

    /// Append an unsized directory placeholder to `parent`.
    pub fn add_directory(
        &mut self,
        parent: NodeId,
        path: impl Into<PathBuf>,
        modified: SystemTime,
    ) -> Result<NodeId, TreeError> {
        self.require_directory(parent)?;
        let id = self.next_id();
        self.insert(Entry::Directory(Directory::new(
            id,
            path.into(),
            modified,
            Some(parent),
        )));
        if let Some(dir) = self.directory_mut(parent) {
            dir.subfolders.push(id);
        }
        Ok(id)
    }

    /// Unlink an entry from its parent and drop it with all its descendants.
    ///
    /// The parent's aggregates are reduced by the removed entry's last known
    /// size and item count. Ancestors above the parent are left as they were
    /// and must be refreshed by the caller. Returns the removed size.
    pub fn remove(&mut self, id: NodeId) -> Result<u64, TreeError> {
        let entry = self.get(id).ok_or(TreeError::UnknownNode(id))?;
        let parent = entry.parent().ok_or(TreeError::RootRemoval)?;
        let size = entry.size();
        let (is_file, items) = match entry {
            Entry::File(_) => (true, 1),
            Entry::Directory(dir) => (false, dir.num_items + 1),
        };

        if let Some(dir) = self.directory_mut(parent) {
            if is_file {
                dir.files_size = dir.files_size.saturating_sub(size);
            }
            dir.total_size = nonzero_total(dir.total_size.saturating_sub(size));
            dir.num_items = dir.num_items.saturating_sub(items);
        }
        self.discard(id)?;
        Ok(size)
    }

    /// Unlink an entry from its parent and drop it, leaving every aggregate
    /// untouched. Used for placeholders that were never counted.
    pub fn discard(&mut self, id: NodeId) -> Result<(), TreeError> {
        let entry = self.get(id).ok_or(TreeError::UnknownNode(id))?;
        let parent = entry.parent().ok_or(TreeError::RootRemoval)?;
        if let Some(dir) = self.directory_mut(parent) {
            dir.files.retain(|c| *c != id);
            dir.subfolders.retain(|c| *c != id);
        }
        self.free_subtree(id);
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        if let Some(Entry::Directory(dir)) = self.take(id) {
            for child in dir.files.into_iter().chain(dir.subfolders) {
                self.free_subtree(child);
            }
        }
    }

    /// Replace the contents of directory `target` with those of `fresh`.
    ///
    /// The old children of `target` are dropped, the children of `fresh`'s
    /// root are moved in under new handles, and the root's aggregates and
    /// modification time are copied over. `target` keeps its own handle and
    /// parent. Ancestor aggregates are not touched.
    pub fn replace_contents(&mut self, target: NodeId, mut fresh: EntryTree) -> Result<(), TreeError> {
        let old = self.require_directory(target)?;
        let old_children: Vec<NodeId> = old.files.iter().chain(&old.subfolders).copied().collect();

        let fresh_root = fresh.root;
        let Some(Entry::Directory(source)) = fresh.take(fresh_root) else {
            return Err(TreeError::NotADirectory(fresh_root));
        };
        for child in old_children {
            self.free_subtree(child);
        }

        let files: Vec<NodeId> = source
            .files
            .iter()
            .filter_map(|c| self.adopt(target, &mut fresh, *c))
            .collect();
        let subfolders: Vec<NodeId> = source
            .subfolders
            .iter()
            .filter_map(|c| self.adopt(target, &mut fresh, *c))
            .collect();

        if let Some(dir) = self.directory_mut(target) {
            dir.files = files;
            dir.subfolders = subfolders;
            dir.files_size = source.files_size;
            dir.total_size = source.total_size;
            dir.num_items = source.num_items;
            dir.modified = source.modified;
        }
        Ok(())
    }

    /// Move `fresh_id` and its descendants out of `fresh` and under `parent`.
    fn adopt(&mut self, parent: NodeId, fresh: &mut EntryTree, fresh_id: NodeId) -> Option<NodeId> {
        let entry = fresh.take(fresh_id)?;
        let id = self.next_id();
        match entry {
            Entry::File(mut file) => {
                file.id = id;
                file.parent = parent;
                self.insert(Entry::File(file));
            }
            Entry::Directory(mut dir) => {
                let files = std::mem::take(&mut dir.files);
                let subfolders = std::mem::take(&mut dir.subfolders);
                dir.id = id;
                dir.parent = Some(parent);
                self.insert(Entry::Directory(dir));

                let files = files
                    .into_iter()
                    .filter_map(|c| self.adopt(id, fresh, c))
                    .collect();
                let subfolders = subfolders
                    .into_iter()
                    .filter_map(|c| self.adopt(id, fresh, c))
                    .collect();
                if let Some(dir) = self.directory_mut(id) {
                    dir.files = files;
                    dir.subfolders = subfolders;
                }
            }
        }
        Some(id)
    }

    /// Direct children of a directory, subfolders first.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Entry> {
        self.directory(id)
            .into_iter()
            .flat_map(|dir| dir.subfolders.iter().chain(dir.files.iter()))
            .filter_map(move |child| self.get(*child))
    }

    /// Depth-first, pre-order traversal starting at `id`.
    pub fn walk(&self, id: NodeId) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![id],
        }
    }

    /// Find the entry scanned at `path`.
    pub fn find_by_path(&self, path: &Path) -> Option<NodeId> {
        self.walk(self.root)
            .find(|entry| entry.path() == path)
            .map(Entry::id)
    }
}

/// Pre-order iterator over a subtree, see [`EntryTree::walk`].
pub struct Walk<'a> {
    tree: &'a EntryTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            if let Entry::Directory(dir) = entry {
                self.stack.extend(dir.files.iter().rev());
                self.stack.extend(dir.subfolders.iter().rev());
            }
            return Some(entry);
        }
        None
    }
}
