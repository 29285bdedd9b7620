//! Background root scans.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use fatfinder_core::ScanError;

use crate::progress::{ProgressPublisher, SNAPSHOT_INTERVAL, ScanProgress};
use crate::sizer::{FolderSizer, SizedFolder};

/// Handle to a root scan running on a blocking worker.
pub struct ScanTask {
    /// Progress events, in order. Closed once the scan ends.
    pub progress_rx: mpsc::UnboundedReceiver<ScanProgress>,
    handle: JoinHandle<Result<SizedFolder, ScanError>>,
    cancel: CancellationToken,
}

impl ScanTask {
    /// Request the scan to stop before the next directory.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the scan result.
    pub async fn join(self) -> Result<SizedFolder, ScanError> {
        self.handle.await.unwrap_or_else(|e| {
            Err(ScanError::Other {
                message: e.to_string(),
            })
        })
    }
}

/// Start sizing `path` in the background.
///
/// Must be called from within a tokio runtime. Progress is delivered through
/// an unbounded channel so the worker never waits for the consumer. Tree
/// snapshots are throttled, see [`ScanProgress`].
pub fn start_scan(sizer: &FolderSizer, path: impl Into<PathBuf>) -> ScanTask {
    let (tx, progress_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let sizer = sizer.clone().with_cancellation(cancel.clone());
    let path = path.into();

    let handle = tokio::task::spawn_blocking(move || {
        let mut publisher = ProgressPublisher::new(tx, SNAPSHOT_INTERVAL);
        sizer.scan(&path, |fraction, tree| publisher.publish(fraction, tree))
    });

    ScanTask {
        progress_rx,
        handle,
        cancel,
    }
}
