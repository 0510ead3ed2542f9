//! Debug assertion macros for exchange invariants.
//!
//! Active only in debug builds; zero overhead in release builds.

/// Assert that an epoch rollover produced the immediately following epoch.
///
/// **Invariant**: a level slot never goes backwards, and rollover advances
/// the epoch by exactly one.
macro_rules! debug_assert_epoch_advances {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new == $old + 1,
            "epoch rollover {} -> {} is not a single step",
            $old,
            $new
        )
    };
}

/// Assert that a tag being torn down has no receivers in flight.
///
/// **Invariant**: the exclusive slot lock taken by delete excludes every
/// transaction on the tag, so the waiter count must already be zero.
macro_rules! debug_assert_quiescent_delete {
    ($waiters:expr) => {
        debug_assert!(
            $waiters == 0,
            "delete reached a tag with {} waiters in flight",
            $waiters
        )
    };
}

/// Assert that a committed payload fits the level buffer.
///
/// **Invariant**: entry-point validation bounds the size before the level
/// is ever touched.
macro_rules! debug_assert_payload_fits {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "payload of {} bytes exceeds level buffer of {}",
            $len,
            $capacity
        )
    };
}

pub(crate) use debug_assert_epoch_advances;
pub(crate) use debug_assert_payload_fits;
pub(crate) use debug_assert_quiescent_delete;
