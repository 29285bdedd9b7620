//! In-place reload of a single branch.
//!
//! A reload scans one directory of an existing tree as if it were a root,
//! then swaps the fresh contents into the existing node and refreshes the
//! aggregates of its ancestors. The swap and the refresh happen under one
//! write lock, so readers see either the old branch or the finished one.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fatfinder_core::{
    Entry, EntryTree, NodeId, ScanError, ScanWarning, TreeError, ancestors_of,
    recalculate_stats, refresh_stats,
};

use crate::progress::{ProgressPublisher, SNAPSHOT_INTERVAL, ScanProgress};
use crate::sizer::{FolderSizer, SizedFolder};

/// A tree shared between the worker that edits it and its readers.
pub type SharedTree = Arc<RwLock<EntryTree>>;

/// Errors that can occur when reloading a branch.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// Handle does not name a live entry.
    #[error("Unknown reload target {0:?}")]
    UnknownTarget(NodeId),

    /// Only directories can be reloaded.
    #[error("Reload target {0:?} is not a directory")]
    NotADirectory(NodeId),

    /// The same directory is already being reloaded.
    #[error("{0:?} is already being reloaded")]
    AlreadyReloading(NodeId),

    /// An ancestor or descendant is being reloaded.
    #[error("{target:?} overlaps the running reload of {busy:?}")]
    Overlapping { target: NodeId, busy: NodeId },

    /// The target left the tree while it was being scanned.
    #[error("{0:?} was detached from the tree during its reload")]
    TargetDetached(NodeId),

    /// Scanning the branch failed; the tree is unchanged.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Editing the tree failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// How a finished reload changed the tree.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    /// Fresh contents were swapped into the target.
    Spliced {
        target: NodeId,
        previous_size: u64,
        total_size: u64,
        num_items: u64,
        warnings: Vec<ScanWarning>,
    },
    /// The target no longer exists on disk and was dropped from its parent.
    Removed {
        target: NodeId,
        parent: NodeId,
        freed: u64,
    },
}

/// Handle to a running reload.
pub struct ReloadTask {
    /// Progress of the branch scan. Closed once the scan ends.
    pub progress_rx: mpsc::UnboundedReceiver<ScanProgress>,
    target: NodeId,
    handle: JoinHandle<Result<ReloadOutcome, ReloadError>>,
    cancel: CancellationToken,
}

impl ReloadTask {
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Abandon the reload.
    ///
    /// The tree keeps its current contents unless the fresh branch was
    /// already spliced in or removed when the cancel arrived.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the reload to finish.
    pub async fn join(self) -> Result<ReloadOutcome, ReloadError> {
        self.handle.await.unwrap_or_else(|e| {
            Err(ReloadError::Scan(ScanError::Other {
                message: e.to_string(),
            }))
        })
    }
}

/// Runs reloads against a shared tree.
///
/// Reloads of disjoint branches may run at the same time, each on its own
/// blocking worker. A reload whose target, ancestor or descendant is already
/// being reloaded is rejected.
#[derive(Clone)]
pub struct ReloadCoordinator {
    tree: SharedTree,
    sizer: FolderSizer,
    in_flight: Arc<Mutex<HashSet<NodeId>>>,
}

impl ReloadCoordinator {
    pub fn new(tree: SharedTree, sizer: FolderSizer) -> Self {
        Self {
            tree,
            sizer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The tree reloads are applied to.
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// Whether `id` is currently being scanned for a reload.
    pub fn is_reloading(&self, id: NodeId) -> bool {
        self.in_flight.lock().contains(&id)
    }

    /// Start reloading directory `target`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reload(&self, target: NodeId) -> Result<ReloadTask, ReloadError> {
        let (path, parent) = {
            let tree = self.tree.read();
            match tree.get(target) {
                Some(Entry::Directory(dir)) => (dir.path.clone(), dir.parent),
                Some(Entry::File(_)) => return Err(ReloadError::NotADirectory(target)),
                None => return Err(ReloadError::UnknownTarget(target)),
            }
        };
        let claim = self.claim(target)?;

        let (tx, progress_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let job = ReloadJob {
            tree: Arc::clone(&self.tree),
            sizer: self.sizer.clone().with_cancellation(cancel.clone()),
            target,
            path,
            parent,
        };

        debug!(target = ?target, path = %job.path.display(), "reload started");
        let handle = tokio::task::spawn_blocking(move || {
            let _claim = claim;
            job.run(tx)
        });

        Ok(ReloadTask {
            progress_rx,
            target,
            handle,
            cancel,
        })
    }

    fn claim(&self, target: NodeId) -> Result<InFlight, ReloadError> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(&target) {
            return Err(ReloadError::AlreadyReloading(target));
        }

        {
            let tree = self.tree.read();
            let busy = in_flight.iter().copied().find(|busy| {
                tree.ancestors(target).any(|a| a == *busy)
                    || tree.ancestors(*busy).any(|a| a == target)
            });
            if let Some(busy) = busy {
                return Err(ReloadError::Overlapping { target, busy });
            }
        }

        in_flight.insert(target);
        Ok(InFlight {
            id: target,
            set: Arc::clone(&self.in_flight),
        })
    }
}

/// Marks a node as being reloaded until dropped.
struct InFlight {
    id: NodeId,
    set: Arc<Mutex<HashSet<NodeId>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

struct ReloadJob {
    tree: SharedTree,
    sizer: FolderSizer,
    target: NodeId,
    path: PathBuf,
    parent: Option<NodeId>,
}

impl ReloadJob {
    fn run(self, tx: mpsc::UnboundedSender<ScanProgress>) -> Result<ReloadOutcome, ReloadError> {
        if !self.sizer.filesystem().exists(&self.path) {
            drop(tx);
            return self.remove_vanished();
        }

        let mut publisher = ProgressPublisher::new(tx, SNAPSHOT_INTERVAL);
        let scanned = self
            .sizer
            .scan(&self.path, |fraction, tree| publisher.publish(fraction, tree));
        drop(publisher);

        match scanned {
            Ok(sized) => self.splice(sized),
            Err(ScanError::PathVanished { .. }) => self.remove_vanished(),
            Err(err) => Err(err.into()),
        }
    }

    /// The target must still hang off the parent it had when the reload
    /// started.
    fn check_attached(&self, tree: &EntryTree) -> Result<(), ReloadError> {
        match tree.get(self.target) {
            Some(entry) if entry.is_dir() && entry.parent() == self.parent => Ok(()),
            _ => Err(ReloadError::TargetDetached(self.target)),
        }
    }

    /// A cancel that arrives after the scan still keeps the tree as it was.
    fn check_cancelled(&self) -> Result<(), ReloadError> {
        if self.sizer.is_cancelled() {
            return Err(ScanError::Interrupted.into());
        }
        Ok(())
    }

    fn splice(&self, sized: SizedFolder) -> Result<ReloadOutcome, ReloadError> {
        let mut tree = self.tree.write();
        self.check_cancelled()?;
        self.check_attached(&tree)?;

        let previous_size = tree.get(self.target).map_or(0, Entry::size);
        tree.replace_contents(self.target, sized.tree)?;
        recalculate_stats(&mut tree, self.target);
        for ancestor in ancestors_of(&tree, self.target) {
            refresh_stats(&mut tree, ancestor);
        }

        let dir = tree
            .directory(self.target)
            .ok_or(ReloadError::TargetDetached(self.target))?;
        info!(
            path = %self.path.display(),
            previous_size,
            total_size = dir.total_size,
            "branch reloaded"
        );

        Ok(ReloadOutcome::Spliced {
            target: self.target,
            previous_size,
            total_size: dir.total_size,
            num_items: dir.num_items,
            warnings: sized.warnings,
        })
    }

    fn remove_vanished(&self) -> Result<ReloadOutcome, ReloadError> {
        let Some(parent) = self.parent else {
            return Err(ScanError::PathVanished {
                path: self.path.clone(),
            }
            .into());
        };

        let mut tree = self.tree.write();
        self.check_cancelled()?;
        self.check_attached(&tree)?;

        let freed = tree.remove(self.target)?;
        refresh_stats(&mut tree, parent);
        for ancestor in ancestors_of(&tree, parent) {
            refresh_stats(&mut tree, ancestor);
        }

        info!(path = %self.path.display(), freed, "vanished branch removed");
        Ok(ReloadOutcome::Removed {
            target: self.target,
            parent,
            freed,
        })
    }
}
