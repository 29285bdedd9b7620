//! Scan progress reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use fatfinder_core::EntryTree;

/// Minimum time between two fresh tree snapshots of one scan.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

/// Progress of one scan, sent once per finished top-level subfolder.
///
/// The snapshot is an immutable copy of the tree. Copies are taken at most
/// once per [`SNAPSHOT_INTERVAL`], so consecutive events may share one
/// snapshot that lags behind `fraction`; the final event always carries a
/// copy of the finished tree. Subfolders that have not been sized yet show up
/// as placeholders with a zero total.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Completed share of the top-level subfolders, in `[0.0, 1.0]`.
    pub fraction: f64,
    /// Tree under construction.
    pub snapshot: Arc<EntryTree>,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    pub fn new(fraction: f64, snapshot: Arc<EntryTree>, elapsed: Duration) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            snapshot,
            elapsed,
        }
    }

    /// Whole percent done, as shown on a progress bar.
    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0) as u8
    }

    /// Whether this is the final event of its scan.
    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }
}

/// Turns sizer callbacks into [`ScanProgress`] events on a channel.
pub(crate) struct ProgressPublisher {
    tx: mpsc::UnboundedSender<ScanProgress>,
    started: Instant,
    interval: Duration,
    snapshot: Option<(Arc<EntryTree>, Instant)>,
    #[cfg_attr(not(test), allow(dead_code))]
    copies: usize,
}

impl ProgressPublisher {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ScanProgress>, interval: Duration) -> Self {
        Self {
            tx,
            started: Instant::now(),
            interval,
            snapshot: None,
            copies: 0,
        }
    }

    pub(crate) fn publish(&mut self, fraction: f64, tree: &EntryTree) {
        // nobody listening, skip the copy
        if self.tx.is_closed() {
            return;
        }

        let now = Instant::now();
        let stale = match &self.snapshot {
            Some((_, taken)) => fraction >= 1.0 || now.duration_since(*taken) >= self.interval,
            None => true,
        };
        if stale {
            self.snapshot = Some((Arc::new(tree.clone()), now));
            self.copies += 1;
        }

        if let Some((snapshot, _)) = &self.snapshot {
            let progress = ScanProgress::new(fraction, Arc::clone(snapshot), self.started.elapsed());
            let _ = self.tx.send(progress);
        }
    }

    #[cfg(test)]
    pub(crate) fn copies(&self) -> usize {
        self.copies
    }
}
