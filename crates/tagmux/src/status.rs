//! Read-only status surface.
//!
//! Renders the live (tag, level) population as a text table. The transport
//! that publishes the stream is a deployment concern; the exchange only
//! provides the snapshot and byte-offset reads over it.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;

use crate::TagExchange;

// Column layout: four 10-wide right-aligned cells, `| ` / ` |` separators.
const LINE_WIDTH: usize = 53;

impl TagExchange {
    /// Renders a snapshot of every live (tag, level) pair:
    ///
    /// ```text
    /// |        KEY |       EUID |      LEVEL |    WAITERS |
    /// +---------------------------------------------------+
    /// ```
    ///
    /// one row per level, a divider row after each tag's block. Each tag's
    /// slot lock is held while its block renders, so a concurrent delete
    /// cannot tear a row.
    pub fn status_report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(
            report,
            "| {:>10} | {:>10} | {:>10} | {:>10} |",
            "KEY", "EUID", "LEVEL", "WAITERS"
        );
        report.push_str(&divider());

        for descriptor in 0..self.config().max_tags {
            let slot = self.table_slot(descriptor).read();
            let Some(tag) = slot.as_ref() else {
                continue;
            };

            for index in 0..self.config().levels {
                let level = tag.pin_level(index);
                let _ = writeln!(
                    report,
                    "| {:>10} | {:>10} | {:>10} | {:>10} |",
                    tag.key(),
                    tag.owner_euid(),
                    level.index(),
                    level.waiters.load(Ordering::Acquire)
                );
            }
            report.push_str(&divider());
        }

        report
    }

    /// Copies up to `out.len()` bytes of a fresh snapshot starting at byte
    /// `offset`; returns the number of bytes copied (0 at end of stream).
    ///
    /// Each call renders anew, so repeated reads walk a stream whose length
    /// tracks the live (tag, level) population.
    pub fn read_status(&self, offset: usize, out: &mut [u8]) -> usize {
        let report = self.status_report();
        let bytes = report.as_bytes();
        if offset >= bytes.len() {
            return 0;
        }
        let n = out.len().min(bytes.len() - offset);
        out[..n].copy_from_slice(&bytes[offset..offset + n]);
        n
    }
}

fn divider() -> String {
    let mut line = "-".repeat(LINE_WIDTH);
    line.replace_range(0..1, "+");
    line.replace_range(LINE_WIDTH - 1..LINE_WIDTH, "+");
    line.push('\n');
    line
}
