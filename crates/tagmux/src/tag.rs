//! Per-descriptor tag record.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

use crate::config::Config;
use crate::level::Level;

/// Who may send, receive and wake on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Any identity may operate on the tag.
    Any,
    /// Only the creating identity (or the privileged identity) may operate.
    Owner,
}

/// A live tag: key, owner, wake state and the level records.
///
/// Each level slot is an `RwLock<Arc<Level>>`: transactions take it as
/// reader just long enough to pin the current epoch's record by cloning
/// the `Arc`; an epoch rollover takes it as writer to swap the record.
pub(crate) struct Tag {
    key: i32,
    descriptor: usize,
    owner_euid: u32,
    permission: Permission,
    /// Raised by a tag-wide wake-up, cleared by the last receiver leaving.
    pub ready: AtomicBool,
    /// Receivers currently inside a transaction on any level of this tag.
    pub waiters: CachePadded<AtomicUsize>,
    levels: Box<[RwLock<Arc<Level>>]>,
}

impl Tag {
    pub fn new(
        key: i32,
        descriptor: usize,
        owner_euid: u32,
        permission: Permission,
        config: &Config,
    ) -> Self {
        let levels = (0..config.levels)
            .map(|index| RwLock::new(Arc::new(Level::new(index, 0, config.buffer_size))))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            key,
            descriptor,
            owner_euid,
            permission,
            ready: AtomicBool::new(false),
            waiters: CachePadded::new(AtomicUsize::new(0)),
            levels,
        }
    }

    #[inline]
    pub fn key(&self) -> i32 {
        self.key
    }

    #[inline]
    pub fn descriptor(&self) -> usize {
        self.descriptor
    }

    #[inline]
    pub fn owner_euid(&self) -> u32 {
        self.owner_euid
    }

    /// Permission check: the privileged identity always passes, otherwise
    /// the tag must be open to any identity or owned by the caller.
    #[inline]
    pub fn permits(&self, euid: u32) -> bool {
        euid == 0 || self.permission == Permission::Any || euid == self.owner_euid
    }

    /// The slot holding level `index`'s current epoch record.
    #[inline]
    pub fn level_slot(&self, index: usize) -> &RwLock<Arc<Level>> {
        &self.levels[index]
    }

    /// Pins level `index`'s current epoch record.
    #[inline]
    pub fn pin_level(&self, index: usize) -> Arc<Level> {
        self.levels[index].read().clone()
    }

    /// Unregisters one receiver; the last one out re-arms the tag for a
    /// fresh tag-wide wake-up cycle.
    pub fn note_receiver_exit(&self) {
        if self.waiters.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.ready.store(false, Ordering::Release);
        }
    }
}
