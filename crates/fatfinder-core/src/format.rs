//! Human-readable sizes, percentages and dates.

use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::node::NodeId;
use crate::tree::EntryTree;

const UNIT_FACTOR: u64 = 1000;
const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count with decimal units and two decimals.
///
/// A count equal to a unit threshold belongs to the larger unit, so
/// `1000` is `"1.00 KB"` while `999` is `"999.00 bytes"`. Counts beyond the
/// TB range stay in TB.
pub fn format_size(bytes: u64) -> String {
    let mut unit = 0;
    let mut divisor: u64 = 1;
    while unit + 1 < UNITS.len() && bytes / divisor >= UNIT_FACTOR {
        divisor *= UNIT_FACTOR;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}.00 {}", UNITS[0])
    } else {
        format!("{:.2} {}", bytes as f64 / divisor as f64, UNITS[unit])
    }
}

/// Share of an entry in its parent's total, in percent.
///
/// `None` for the root and for handles that are no longer in the tree.
pub fn percent_of_parent(tree: &EntryTree, id: NodeId) -> Option<f64> {
    let entry = tree.get(id)?;
    let parent = tree.directory(entry.parent()?)?;
    // totals are never 0, see `nonzero_total`
    Some(entry.size() as f64 / parent.total_size.max(1) as f64 * 100.0)
}

/// Format a percentage with two decimals.
pub fn format_percent(percent: f64) -> String {
    format!("{percent:.2}%")
}

/// Format a modification time as local date and time.
pub fn format_modified(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%x %X").to_string()
}
