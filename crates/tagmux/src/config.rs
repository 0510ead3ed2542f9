/// Key reserved for tags that are never published in the key directory.
///
/// A tag created with this key is reachable only through the descriptor
/// returned by the creating call; opening it by key always fails.
pub const ANONYMOUS_KEY: i32 = 0;

/// Configuration for a [`TagExchange`](crate::TagExchange).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Upper bound on simultaneously live tags (default: 256)
    pub max_tags: usize,
    /// Number of levels multiplexed on each tag (default: 32)
    pub levels: usize,
    /// Maximum message length per level, in bytes (default: 4096)
    pub buffer_size: usize,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `max_tags` is 0 or greater than 65 536, if `levels` is 0 or
    /// greater than 1024, or if `buffer_size` is 0.
    pub const fn new(max_tags: usize, levels: usize, buffer_size: usize) -> Self {
        assert!(
            max_tags > 0 && max_tags <= 1 << 16,
            "max_tags must be between 1 and 65536"
        );
        assert!(
            levels > 0 && levels <= 1024,
            "levels must be between 1 and 1024"
        );
        assert!(buffer_size > 0, "buffer_size must be non-zero");

        Self {
            max_tags,
            levels,
            buffer_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tags: 256,
            levels: 32,
            buffer_size: 4096,
        }
    }
}

/// Compact configuration (64 tags, 8 levels, 512-byte messages)
pub const COMPACT_CONFIG: Config = Config::new(64, 8, 512);

/// Wide configuration (1024 tags, 64 levels, 16 KiB messages)
pub const WIDE_CONFIG: Config = Config::new(1024, 64, 16 * 1024);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_original_sizing() {
        let config = Config::default();
        assert_eq!(config.max_tags, 256);
        assert_eq!(config.levels, 32);
        assert_eq!(config.buffer_size, 4096);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(COMPACT_CONFIG.max_tags > 0);
        assert!(WIDE_CONFIG.levels > COMPACT_CONFIG.levels);
    }

    #[test]
    #[should_panic(expected = "max_tags")]
    fn test_zero_tags_rejected() {
        let _ = Config::new(0, 32, 4096);
    }

    #[test]
    #[should_panic(expected = "buffer_size")]
    fn test_zero_buffer_rejected() {
        let _ = Config::new(256, 32, 0);
    }
}
