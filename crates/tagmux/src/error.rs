//! Error taxonomy for the exchange entry points.

use thiserror::Error;

/// Errors surfaced by the four entry points.
///
/// Transient conditions (no receiver, level busy, awake-all in flight,
/// contended delete) are not errors: they come back as the discard/skip
/// arms of the per-operation outcome enums.
///
/// `NoMemory`, `Fault` and `Interrupted` are reserved arms of the wire
/// taxonomy: the safe in-process API cannot produce them, but deployment
/// bindings that pass raw memory or support signal cancellation map onto
/// them and rely on the [`code`](TagError::code) values staying stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TagError {
    /// An argument is out of range (descriptor, level, key or size).
    #[error("invalid argument")]
    Invalid,

    /// No live tag is registered under the requested key or descriptor.
    #[error("tag not found")]
    NotFound,

    /// A tag with this key already exists.
    #[error("tag key already in use")]
    Busy,

    /// The caller's effective identity may not operate on this tag.
    #[error("operation not permitted for this identity")]
    Forbidden,

    /// The maximum number of live tags has been reached.
    #[error("tag capacity exhausted")]
    Capacity,

    /// An internal allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// A caller-supplied buffer was not accessible.
    #[error("bad caller buffer")]
    Fault,

    /// The wait was cancelled before completion.
    #[error("wait interrupted")]
    Interrupted,

    /// Internal state violated an invariant. Asserts in debug builds.
    #[error("internal protocol violation")]
    Protocol,
}

impl TagError {
    /// Stable negative scalar code, for deployments that surface errors as
    /// raw integers.
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            Self::Invalid => -1,
            Self::NotFound => -2,
            Self::Busy => -3,
            Self::Forbidden => -4,
            Self::Capacity => -5,
            Self::NoMemory => -6,
            Self::Fault => -7,
            Self::Interrupted => -8,
            Self::Protocol => -9,
        }
    }

    /// Returns `true` if the error was caused by the caller's arguments or
    /// identity rather than by the state of the exchange.
    #[inline]
    pub const fn is_caller_error(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::Busy | Self::Forbidden | Self::Capacity
        )
    }

    /// Returns `true` if the error indicates a broken internal invariant.
    #[inline]
    pub const fn is_protocol_error(self) -> bool {
        matches!(self, Self::Protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TagError; 9] = [
        TagError::Invalid,
        TagError::NotFound,
        TagError::Busy,
        TagError::Forbidden,
        TagError::Capacity,
        TagError::NoMemory,
        TagError::Fault,
        TagError::Interrupted,
        TagError::Protocol,
    ];

    #[test]
    fn test_codes_negative_and_distinct() {
        let mut seen = std::collections::HashSet::new();
        for err in ALL {
            assert!(err.code() < 0, "{err:?} has non-negative code");
            assert!(seen.insert(err.code()), "{err:?} shares a code");
        }
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(TagError::Invalid.is_caller_error());
        assert!(TagError::Forbidden.is_caller_error());
        assert!(!TagError::Protocol.is_caller_error());
        assert!(TagError::Protocol.is_protocol_error());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(TagError::NotFound.to_string(), "tag not found");
        assert_eq!(TagError::Busy.to_string(), "tag key already in use");
    }
}
