//! Aggregate recomputation from in-memory children.
//!
//! Nothing here touches the filesystem. [`recalculate_stats`] rebuilds a whole
//! subtree bottom-up; [`refresh_stats`] only rebuilds one directory from the
//! values already stored on its direct children, which is what ancestors of
//! an edited branch need.

use crate::node::NodeId;
use crate::tree::EntryTree;

/// Totals of 0 are stored as 1 so percent-of-parent stays defined.
pub const fn nonzero_total(raw: u64) -> u64 {
    if raw == 0 { 1 } else { raw }
}

/// Recompute `files_size`, `total_size` and `num_items` for `id` and every
/// directory below it. Files and non-existent handles are ignored.
pub fn recalculate_stats(tree: &mut EntryTree, id: NodeId) {
    let Some(dir) = tree.directory(id) else {
        return;
    };
    let subfolders = dir.subfolders.clone();
    for sub in subfolders {
        recalculate_stats(tree, sub);
    }
    refresh_stats(tree, id);
}

/// Recompute the aggregates of one directory from its direct children.
pub fn refresh_stats(tree: &mut EntryTree, id: NodeId) {
    let Some(dir) = tree.directory(id) else {
        return;
    };

    let mut files_size: u64 = 0;
    let mut file_count: u64 = 0;
    for file in dir.files.iter().filter_map(|f| tree.file(*f)) {
        files_size += file.size;
        file_count += 1;
    }

    let mut total_size = files_size;
    let mut num_items = file_count;
    for sub in dir.subfolders.iter().filter_map(|s| tree.directory(*s)) {
        total_size += sub.total_size;
        num_items += sub.num_items + 1;
    }

    if let Some(dir) = tree.directory_mut(id) {
        dir.files_size = files_size;
        dir.total_size = nonzero_total(total_size);
        dir.num_items = num_items;
    }
}
