//! The exchange: tag table, directory and the four entry points.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::{Config, ANONYMOUS_KEY};
use crate::directory::Directory;
use crate::invariants::{debug_assert_epoch_advances, debug_assert_quiescent_delete};
use crate::level::{Level, WakeReason};
use crate::tag::{Permission, Tag};
use crate::TagError;

// =============================================================================
// LOCK ORDERING & PINNING PROTOCOL
// =============================================================================
//
// Four lock ranks, coarsest first:
//
//   1. directory lock        (allocator + key directory, one per exchange)
//   2. table slot RwLock     (one per descriptor)
//   3. level slot RwLock     (one per (tag, level); guards the Arc<Level>)
//   4. level record locks    (slot mutex, then sender mutex)
//
// A thread may only acquire downward in this order, and never re-acquires a
// higher rank while holding a lower one. Two release-early rules keep the
// hot paths short:
//
// - The directory lock is never held across anything that can block on a
//   level (tag_get releases it before building level records).
// - The level slot RwLock is released as soon as the record is pinned by
//   cloning the Arc out of it; the pin keeps the record alive without a
//   lock, so a superseded epoch's record is freed exactly when its last
//   pinning transaction drops out.
//
// Transactions (send / receive / awake-all) hold the table slot lock as
// readers for their whole duration, including the receive wait. Delete
// takes the same lock as a writer with try_lock: contention means a
// transaction is in flight and delete backs off, which is what makes
// tearing a tag down while a receiver sleeps on it impossible.
//
// =============================================================================

/// Sub-command of [`TagExchange::tag_get`]. Discriminants match the wire
/// encoding of the original interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCommand {
    /// Translate a key into an existing tag's descriptor.
    Open = 0,
    /// Create a new tag.
    Create = 1,
}

/// Sub-command of [`TagExchange::tag_ctl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlCommand {
    /// Wake every receiver waiting on any level of the tag, without payload.
    AwakeAll = 0,
    /// Tear the tag down.
    Delete = 1,
}

/// Result of a successful [`TagExchange::tag_send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The payload was committed and the level's wait set was woken.
    Delivered,
    /// The send was silently dropped: no receiver, the level's slot was
    /// occupied, or another sender held the level. Callers may retry.
    Discarded,
}

impl SendOutcome {
    /// Scalar encoding: 1 delivered, 0 discarded.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Delivered => 1,
            Self::Discarded => 0,
        }
    }
}

/// Result of a successful [`TagExchange::tag_receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A payload arrived; the value is the number of bytes copied into the
    /// caller's buffer (bounded by both the payload and the buffer length).
    Delivered(usize),
    /// Woken without payload, by a tag-wide wake-up or an elapsed deadline.
    Woken,
}

impl ReceiveOutcome {
    /// Scalar encoding: 1 delivered, 0 woken.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Delivered(_) => 1,
            Self::Woken => 0,
        }
    }
}

/// Result of a successful [`TagExchange::tag_ctl`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlOutcome {
    /// The command took effect.
    Done,
    /// Nothing to do or the tag was busy: no receiver to wake, a wake-up
    /// already in flight, or a delete that lost the race for exclusive
    /// access. Callers may retry.
    Skipped,
}

impl CtlOutcome {
    /// Scalar encoding: 1 done, 0 skipped.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Done => 1,
            Self::Skipped => 0,
        }
    }
}

/// The tag/level message exchange.
///
/// One value per shared execution domain; every entry point takes the
/// caller's effective identity explicitly. Dropping the exchange frees all
/// live tags and their levels.
pub struct TagExchange {
    config: Config,
    directory: RwLock<Directory>,
    table: Box<[RwLock<Option<Tag>>]>,
}

impl TagExchange {
    /// Creates an empty exchange sized by `config`.
    pub fn new(config: Config) -> Self {
        let table = (0..config.max_tags)
            .map(|_| RwLock::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            config,
            directory: RwLock::new(Directory::new(config.max_tags)),
            table,
        }
    }

    /// The configuration this exchange was built with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of live tags, anonymous ones included.
    pub fn live_tags(&self) -> usize {
        self.directory.read().live_tags()
    }

    /// Number of keys currently published in the directory; anonymous tags
    /// are not counted.
    pub fn published_keys(&self) -> usize {
        self.directory.read().key_count()
    }

    /// Number of receivers currently registered on the level's current
    /// epoch: the figure the status report's WAITERS column shows.
    pub fn level_waiters(&self, descriptor: usize, level: usize) -> Result<usize, TagError> {
        self.validate(descriptor, level)?;
        let slot = self.table[descriptor].read();
        let tag = slot.as_ref().ok_or(TagError::NotFound)?;
        Ok(tag.pin_level(level).waiters.load(Ordering::Acquire))
    }

    // ---------------------------------------------------------------------
    // tag_get
    // ---------------------------------------------------------------------

    /// Creates a tag or opens an existing one by key.
    ///
    /// On `Create`, a fresh descriptor is reserved and, unless `key` is
    /// [`ANONYMOUS_KEY`], the key is published in the directory; the caller
    /// becomes the owner with the given `permission`. On `Open`, the key is
    /// translated to the descriptor of the live tag it names; `permission`
    /// is not consulted.
    pub fn tag_get(
        &self,
        key: i32,
        command: TagCommand,
        permission: Permission,
        euid: u32,
    ) -> Result<usize, TagError> {
        if key < 0 {
            return Err(TagError::Invalid);
        }
        match command {
            TagCommand::Create => self.create(key, permission, euid),
            TagCommand::Open => self.open(key),
        }
    }

    fn create(&self, key: i32, permission: Permission, euid: u32) -> Result<usize, TagError> {
        // Reserve the descriptor and publish the key in one directory
        // critical section; building the levels happens outside it.
        let descriptor = self.directory.write().register(key)?;

        let tag = Tag::new(key, descriptor, euid, permission, &self.config);

        // The descriptor is reserved exclusively, so the slot write lock is
        // uncontended; the write is what publishes the fully built record.
        *self.table[descriptor].write() = Some(tag);

        Ok(descriptor)
    }

    fn open(&self, key: i32) -> Result<usize, TagError> {
        if key == ANONYMOUS_KEY {
            return Err(TagError::Invalid);
        }

        let directory = self.directory.read();
        let descriptor = directory.lookup(key).ok_or(TagError::NotFound)?;

        // The mapping can outrun a concurrent delete by a moment; a slot
        // already cleared means the tag is gone.
        if self.table[descriptor].read().is_none() {
            return Err(TagError::NotFound);
        }

        Ok(descriptor)
    }

    // ---------------------------------------------------------------------
    // tag_send
    // ---------------------------------------------------------------------

    /// Best-effort, non-blocking delivery of `payload` on `(descriptor,
    /// level)`.
    ///
    /// An empty payload is a wake-up-only send. Delivery is committed only
    /// if at least one receiver is registered on the level's current epoch
    /// and its slot is free; otherwise the send is
    /// [`Discarded`](SendOutcome::Discarded).
    pub fn tag_send(
        &self,
        descriptor: usize,
        level: usize,
        payload: &[u8],
        euid: u32,
    ) -> Result<SendOutcome, TagError> {
        self.validate(descriptor, level)?;
        if payload.len() > self.config.buffer_size {
            return Err(TagError::Invalid);
        }

        let slot = self.table[descriptor].read();
        let tag = slot.as_ref().ok_or(TagError::NotFound)?;
        if !tag.permits(euid) {
            return Err(TagError::Forbidden);
        }

        // Fast path: nobody is receiving anywhere on this tag.
        if tag.waiters.load(Ordering::Acquire) == 0 {
            return Ok(SendOutcome::Discarded);
        }

        let pinned = tag.pin_level(level);
        if pinned.try_commit(payload) {
            Ok(SendOutcome::Delivered)
        } else {
            Ok(SendOutcome::Discarded)
        }
    }

    // ---------------------------------------------------------------------
    // tag_receive
    // ---------------------------------------------------------------------

    /// Blocks until a payload is delivered on `(descriptor, level)` or a
    /// tag-wide wake-up occurs.
    ///
    /// Up to `out.len()` bytes of the payload are copied out; an empty
    /// buffer is a wake-up-only receive.
    pub fn tag_receive(
        &self,
        descriptor: usize,
        level: usize,
        out: &mut [u8],
        euid: u32,
    ) -> Result<ReceiveOutcome, TagError> {
        self.receive_inner(descriptor, level, out, euid, None)
    }

    /// Like [`tag_receive`](Self::tag_receive), but gives up once `timeout`
    /// elapses, returning [`Woken`](ReceiveOutcome::Woken) with every
    /// counter unwound, the user-space equivalent of a signalled receiver.
    pub fn tag_receive_timeout(
        &self,
        descriptor: usize,
        level: usize,
        out: &mut [u8],
        euid: u32,
        timeout: Duration,
    ) -> Result<ReceiveOutcome, TagError> {
        let deadline = Instant::now() + timeout;
        self.receive_inner(descriptor, level, out, euid, Some(deadline))
    }

    fn receive_inner(
        &self,
        descriptor: usize,
        level: usize,
        out: &mut [u8],
        euid: u32,
        deadline: Option<Instant>,
    ) -> Result<ReceiveOutcome, TagError> {
        self.validate(descriptor, level)?;
        if out.len() > self.config.buffer_size {
            return Err(TagError::Invalid);
        }

        // Held for the whole transaction, wait included: this is what a
        // concurrent delete's try_write bounces off.
        let slot = self.table[descriptor].read();
        let tag = slot.as_ref().ok_or(TagError::NotFound)?;
        if !tag.permits(euid) {
            return Err(TagError::Forbidden);
        }

        tag.waiters.fetch_add(1, Ordering::AcqRel);

        let mut pinned = tag.pin_level(level);

        // The pinned epoch may already carry a committed payload destined
        // for the receivers that were registered when it was sent; this
        // receiver belongs to the next epoch.
        if pinned.slot.lock().ready {
            pinned = self.roll_over(tag, level);
        }

        pinned.waiters.fetch_add(1, Ordering::AcqRel);

        let result = pinned.await_payload(&tag.ready, out, deadline);

        // Last receiver out of this epoch: reset a record that is still
        // current; a superseded one is freed when its last pin drops. The
        // observed sequence keeps a tardy reset from wiping a commit made
        // for a receiver that registered after this drain.
        if pinned.waiters.fetch_sub(1, Ordering::AcqRel) == 1 {
            let current = tag.pin_level(level);
            if current.epoch() == pinned.epoch() {
                pinned.reset(result.seq);
            }
        }

        tag.note_receiver_exit();

        Ok(match result.reason {
            WakeReason::Message => ReceiveOutcome::Delivered(result.copied),
            WakeReason::AwakeAll | WakeReason::TimedOut => ReceiveOutcome::Woken,
        })
    }

    /// Replaces the level's record with a fresh next-epoch one, unless a
    /// concurrent receiver already did. The superseded record stays
    /// reachable through existing pins until its last reader exits.
    fn roll_over(&self, tag: &Tag, level: usize) -> Arc<Level> {
        let mut slot = tag.level_slot(level).write();

        // Re-read under the write lock: another receiver may have swapped
        // in a clean record while this one was upgrading. Roll over only if
        // the record in the slot is still committed-to.
        let current = Arc::clone(&slot);
        if !current.slot.lock().ready {
            return current;
        }

        let fresh = Arc::new(Level::new(
            level,
            current.epoch() + 1,
            self.config.buffer_size,
        ));
        debug_assert_epoch_advances!(current.epoch(), fresh.epoch());

        *slot = Arc::clone(&fresh);
        fresh
    }

    // ---------------------------------------------------------------------
    // tag_ctl
    // ---------------------------------------------------------------------

    /// Tag-wide control: wake every waiting receiver, or tear the tag down.
    pub fn tag_ctl(
        &self,
        descriptor: usize,
        command: CtlCommand,
        euid: u32,
    ) -> Result<CtlOutcome, TagError> {
        if descriptor >= self.config.max_tags {
            return Err(TagError::Invalid);
        }
        match command {
            CtlCommand::AwakeAll => self.awake_all(descriptor, euid),
            CtlCommand::Delete => self.delete(descriptor, euid),
        }
    }

    fn awake_all(&self, descriptor: usize, euid: u32) -> Result<CtlOutcome, TagError> {
        let slot = self.table[descriptor].read();
        let tag = slot.as_ref().ok_or(TagError::NotFound)?;
        if !tag.permits(euid) {
            return Err(TagError::Forbidden);
        }

        // An earlier wake-up is still draining; it will reach every current
        // receiver, so a second broadcast has nothing to add.
        if tag.ready.load(Ordering::Acquire) {
            return Ok(CtlOutcome::Skipped);
        }
        if tag.waiters.load(Ordering::Acquire) == 0 {
            return Ok(CtlOutcome::Skipped);
        }

        tag.ready.store(true, Ordering::Release);

        for index in 0..self.config.levels {
            let level = tag.pin_level(index);
            if level.waiters.load(Ordering::Acquire) > 0 {
                // Taking the record mutex orders the broadcast after any
                // receiver that checked the predicate before the store.
                let _slot = level.slot.lock();
                level.wakeup.notify_all();
            }
        }

        Ok(CtlOutcome::Done)
    }

    fn delete(&self, descriptor: usize, euid: u32) -> Result<CtlOutcome, TagError> {
        // Exclusive access to the slot excludes every transaction on the
        // tag; contention means one is in flight, so back off.
        let Some(mut slot) = self.table[descriptor].try_write() else {
            return Ok(CtlOutcome::Skipped);
        };

        let Some(tag) = slot.take() else {
            return Err(TagError::NotFound);
        };
        if !tag.permits(euid) {
            *slot = Some(tag);
            return Err(TagError::Forbidden);
        }

        let waiters = tag.waiters.load(Ordering::Acquire);
        if waiters != 0 {
            debug_assert_quiescent_delete!(waiters);
            *slot = Some(tag);
            return Err(TagError::Protocol);
        }

        drop(slot);

        // The tag is unreachable; unpublish the key and free the
        // descriptor, then let the record (and its levels) drop.
        self.directory
            .write()
            .unregister(tag.key(), tag.descriptor());

        Ok(CtlOutcome::Done)
    }

    // ---------------------------------------------------------------------
    // helpers
    // ---------------------------------------------------------------------

    pub(crate) fn table_slot(&self, descriptor: usize) -> &RwLock<Option<Tag>> {
        &self.table[descriptor]
    }

    fn validate(&self, descriptor: usize, level: usize) -> Result<(), TagError> {
        if descriptor >= self.config.max_tags || level >= self.config.levels {
            return Err(TagError::Invalid);
        }
        Ok(())
    }
}
