//! Error types for the zonekit library.
//!
//! ## Key Components
//!
//! - [`Error`]: the single error taxonomy returned by every fallible zone
//!   operation. Absence of a key is deliberately **not** an error for
//!   read-style operations (`fetch`, `pop`, `llen`); those return a nil/zero
//!   result instead.
//!
//! ## Example Usage
//!
//! ```
//! use zonekit::error::Error;
//! use zonekit::zone::Zone;
//!
//! let zone = Zone::new("cfg", 1024);
//! assert!(matches!(zone.unwrap_err(), Error::InvalidArgument(_)));
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error returned by zone and registry operations.
///
/// Every variant is reported synchronously to the caller; the zone stays
/// usable afterwards, including after [`Error::CorruptData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The key does not exist (replace-flagged stores, `incr` without an
    /// init value, TTL updates) or a named zone was not found.
    NotFound,
    /// An add-flagged store found a live entry, or a zone name is taken.
    AlreadyExists,
    /// The stored value type does not support the requested operation
    /// (e.g. list operations on a scalar, `incr` on a string).
    TypeMismatch,
    /// A stored value tag was not recognized.
    UnsupportedValueType(u8),
    /// A malformed argument: empty key or zone name, oversized key,
    /// capacity below the minimum floor, nil with add/replace flags.
    InvalidArgument(String),
    /// The arena is exhausted after eviction attempts, or a safe store
    /// declined to evict.
    OutOfMemory,
    /// A stored record violated an internal size or type invariant.
    /// Defensive; should not occur absent memory corruption.
    CorruptData(String),
}

impl Error {
    /// Creates an [`Error::InvalidArgument`] with the given description.
    #[inline]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an [`Error::CorruptData`] with the given description.
    #[inline]
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => f.write_str("not found"),
            Error::AlreadyExists => f.write_str("exists"),
            Error::TypeMismatch => f.write_str("value type mismatch"),
            Error::UnsupportedValueType(tag) => {
                write!(f, "unsupported value type {tag}")
            }
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::OutOfMemory => f.write_str("no memory"),
            Error::CorruptData(msg) => write!(f, "corrupt data: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
