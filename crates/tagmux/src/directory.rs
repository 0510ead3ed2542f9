//! Key directory and descriptor registry.

use std::collections::HashMap;

use crate::bitmask::Bitmask;
use crate::config::ANONYMOUS_KEY;
use crate::TagError;

/// The state guarded by the exchange's single directory lock: the
/// descriptor allocator and the key -> descriptor mapping.
///
/// Anonymous tags occupy a descriptor but never appear in the mapping, so
/// the live-tag population is judged by the allocator, not by the key
/// count.
pub(crate) struct Directory {
    allocator: Bitmask,
    keys: HashMap<i32, usize>,
}

impl Directory {
    pub fn new(max_tags: usize) -> Self {
        Self {
            allocator: Bitmask::new(max_tags),
            keys: HashMap::new(),
        }
    }

    /// Number of live descriptors, anonymous tags included.
    #[inline]
    pub fn live_tags(&self) -> usize {
        self.allocator.in_use()
    }

    /// Number of published (non-anonymous) keys.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn lookup(&self, key: i32) -> Option<usize> {
        let descriptor = self.keys.get(&key).copied()?;
        debug_assert!(
            self.allocator.is_set(descriptor),
            "published key {key} maps to a free descriptor {descriptor}"
        );
        Some(descriptor)
    }

    /// Reserves a descriptor for a new tag and, for a non-anonymous key,
    /// publishes the key -> descriptor entry.
    ///
    /// Fails with `Capacity` when the exchange is full, `Busy` when the key
    /// is already published (the reserved descriptor is handed back), and
    /// `Protocol` if the allocator disagrees with the capacity check.
    pub fn register(&mut self, key: i32) -> Result<usize, TagError> {
        if self.allocator.in_use() >= self.allocator.capacity() {
            return Err(TagError::Capacity);
        }
        let descriptor = self.allocator.acquire().ok_or(TagError::Protocol)?;

        if key != ANONYMOUS_KEY {
            if self.keys.contains_key(&key) {
                let _ = self.allocator.release(descriptor);
                return Err(TagError::Busy);
            }
            self.keys.insert(key, descriptor);
        }

        Ok(descriptor)
    }

    /// Removes a tag's entry and frees its descriptor.
    ///
    /// The key is unpublished only when it still maps to `descriptor`, so a
    /// stale unregister cannot evict a newer tag that reused the key.
    pub fn unregister(&mut self, key: i32, descriptor: usize) {
        if key != ANONYMOUS_KEY && self.keys.get(&key) == Some(&descriptor) {
            self.keys.remove(&key);
        }
        let _ = self.allocator.release(descriptor);
    }
}
