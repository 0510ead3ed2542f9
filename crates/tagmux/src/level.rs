//! Per-(tag, level) synchronization and storage record.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::invariants::debug_assert_payload_fits;

/// The single-slot message buffer, guarded by the record mutex.
///
/// `ready = true` means `buf[..len]` holds a committed payload for the
/// current epoch; the committing sender observed `waiters > 0`. `seq`
/// counts commits into this record, so a drain's trailing cleanup can tell
/// its own payload from one committed after it for a newer waiter.
pub(crate) struct Slot {
    pub ready: bool,
    pub len: usize,
    pub seq: u64,
    pub buf: Box<[u8]>,
}

/// Why a receiver left the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeReason {
    /// A sender committed a payload to this epoch.
    Message,
    /// A tag-wide wake-up was issued; no payload is consumed.
    AwakeAll,
    /// The caller's deadline elapsed; no payload is consumed.
    TimedOut,
}

/// How a receiver's wait ended.
pub(crate) struct WaitResult {
    pub reason: WakeReason,
    /// Bytes copied into the caller's buffer (0 unless `Message`).
    pub copied: usize,
    /// The slot's commit sequence at the moment the outcome was decided;
    /// the receiver's trailing cleanup only clears the slot while the
    /// sequence is still this one.
    pub seq: u64,
}

/// One epoch of one level of one tag.
///
/// Shared as `Arc<Level>`: a transaction pins the record by cloning the
/// `Arc` out of the tag's level slot, so a record superseded by an epoch
/// rollover stays alive until its last reader drops out, and is freed by
/// that reader's final `Arc` drop.
pub(crate) struct Level {
    index: usize,
    epoch: u64,
    /// Receivers currently registered on this epoch.
    pub waiters: CachePadded<AtomicUsize>,
    /// Record lock: every transaction on the record runs under it.
    pub slot: Mutex<Slot>,
    /// Wait set for receivers; predicate is `slot.ready || tag.ready`.
    pub wakeup: Condvar,
    /// Serializes senders; taken with `try_lock` only.
    sender: Mutex<()>,
}

impl Level {
    pub fn new(index: usize, epoch: u64, buffer_size: usize) -> Self {
        Self {
            index,
            epoch,
            waiters: CachePadded::new(AtomicUsize::new(0)),
            slot: Mutex::new(Slot {
                ready: false,
                len: 0,
                seq: 0,
                buf: vec![0u8; buffer_size].into_boxed_slice(),
            }),
            wakeup: Condvar::new(),
            sender: Mutex::new(()),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Best-effort sender commit.
    ///
    /// Returns `true` when the payload was committed and the wait set
    /// broadcast. Returns `false` on any transient obstacle: another sender
    /// holds the sender mutex, the epoch already carries a committed
    /// payload, or no receiver is registered on this epoch.
    pub fn try_commit(&self, payload: &[u8]) -> bool {
        let Some(_sender) = self.sender.try_lock() else {
            return false;
        };

        let mut slot = self.slot.lock();
        if slot.ready || self.waiters.load(Ordering::Acquire) == 0 {
            return false;
        }

        debug_assert_payload_fits!(payload.len(), slot.buf.len());
        slot.buf[..payload.len()].copy_from_slice(payload);
        slot.len = payload.len();
        // len is visible before ready: both stores happen under the slot
        // mutex, released only after ready is set.
        slot.ready = true;
        slot.seq += 1;

        self.wakeup.notify_all();
        true
    }

    /// Blocks until a payload is committed to this epoch or `tag_ready` is
    /// raised, then copies up to `out.len()` payload bytes.
    ///
    /// A tag-wide wake-up takes precedence over a committed payload. Wakeups
    /// may be spurious; the predicate is re-evaluated under the record mutex
    /// on every wake. With a deadline, an elapsed wait re-checks the
    /// predicate once and then gives up without consuming anything.
    ///
    /// The caller must have registered itself in `waiters` beforehand.
    pub fn await_payload(
        &self,
        tag_ready: &AtomicBool,
        out: &mut [u8],
        deadline: Option<Instant>,
    ) -> WaitResult {
        let mut slot = self.slot.lock();
        loop {
            if tag_ready.load(Ordering::Acquire) {
                return WaitResult {
                    reason: WakeReason::AwakeAll,
                    copied: 0,
                    seq: slot.seq,
                };
            }
            if slot.ready {
                let n = out.len().min(slot.len);
                out[..n].copy_from_slice(&slot.buf[..n]);
                return WaitResult {
                    reason: WakeReason::Message,
                    copied: n,
                    seq: slot.seq,
                };
            }
            match deadline {
                None => self.wakeup.wait(&mut slot),
                Some(until) => {
                    if self.wakeup.wait_until(&mut slot, until).timed_out()
                        && !slot.ready
                        && !tag_ready.load(Ordering::Acquire)
                    {
                        return WaitResult {
                            reason: WakeReason::TimedOut,
                            copied: 0,
                            seq: slot.seq,
                        };
                    }
                }
            }
        }
    }

    /// Clears the slot so the record can carry the next transaction.
    /// Called by the last receiver leaving a non-superseded epoch.
    ///
    /// A commit newer than `observed_seq` belongs to a receiver that
    /// registered after this drain and must not be wiped; its own drain
    /// cleans it up.
    pub fn reset(&self, observed_seq: u64) {
        let mut slot = self.slot.lock();
        if slot.seq == observed_seq {
            slot.ready = false;
            slot.len = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_commit_requires_waiters() {
        let level = Level::new(0, 0, 64);
        assert!(!level.try_commit(b"nobody listening"));

        level.waiters.fetch_add(1, Ordering::AcqRel);
        assert!(level.try_commit(b"hello"));
    }

    #[test]
    fn test_commit_rejected_while_slot_occupied() {
        let level = Level::new(0, 0, 64);
        level.waiters.fetch_add(1, Ordering::AcqRel);
        assert!(level.try_commit(b"first"));
        assert!(!level.try_commit(b"second"));

        let seq = level.slot.lock().seq;
        level.reset(seq);
        assert!(level.try_commit(b"third"));
    }

    #[test]
    fn test_stale_reset_leaves_newer_commit_intact() {
        let level = Level::new(0, 0, 64);
        level.waiters.fetch_add(1, Ordering::AcqRel);

        // a drain observed the slot at sequence 0, then a commit landed
        // for a receiver that registered after it
        assert!(level.try_commit(b"fresh"));
        level.reset(0);

        let slot = level.slot.lock();
        assert!(slot.ready, "newer commit survives the stale cleanup");
        assert_eq!(&slot.buf[..slot.len], b"fresh");
    }

    #[test]
    fn test_await_payload_receives_commit() {
        let level = Arc::new(Level::new(3, 0, 64));
        let tag_ready = Arc::new(AtomicBool::new(false));

        level.waiters.fetch_add(1, Ordering::AcqRel);
        let receiver = {
            let level = Arc::clone(&level);
            let tag_ready = Arc::clone(&tag_ready);
            thread::spawn(move || {
                let mut out = [0u8; 16];
                let result = level.await_payload(&tag_ready, &mut out, None);
                (result.reason, out[..result.copied].to_vec())
            })
        };

        while !level.try_commit(b"ping") {
            thread::yield_now();
        }

        let (reason, payload) = receiver.join().unwrap();
        assert_eq!(reason, WakeReason::Message);
        assert_eq!(payload, b"ping");
    }

    #[test]
    fn test_await_payload_timeout() {
        let level = Level::new(0, 0, 64);
        let tag_ready = AtomicBool::new(false);
        let mut out = [0u8; 8];

        level.waiters.fetch_add(1, Ordering::AcqRel);
        let deadline = Instant::now() + Duration::from_millis(20);
        let result = level.await_payload(&tag_ready, &mut out, Some(deadline));
        assert_eq!(result.reason, WakeReason::TimedOut);
        assert_eq!(result.copied, 0);
    }

    #[test]
    fn test_tag_ready_wins_over_payload() {
        let level = Level::new(0, 0, 64);
        let tag_ready = AtomicBool::new(false);
        let mut out = [0u8; 8];

        level.waiters.fetch_add(1, Ordering::AcqRel);
        assert!(level.try_commit(b"msg"));
        tag_ready.store(true, Ordering::Release);

        let result = level.await_payload(&tag_ready, &mut out, None);
        assert_eq!(result.reason, WakeReason::AwakeAll);
        assert_eq!(result.copied, 0);
    }
}
