//! Sorted Key-Value Block Module
//!
//! This module implements the **block**: the unit a table writer flushes
//! to disk and a table reader loads back: a run of strictly increasing
//! key/value entries packed into one contiguous, independently parseable
//! byte buffer.
//!
//! ## Design Overview
//!
//! Keys are **prefix-compressed**: each record stores only the suffix that
//! differs from the previous key. Every `restart_interval` records the
//! compression is broken and the full key is stored again. These
//! **restart points** are listed in a trailing index, which lets a reader
//! binary-search the block and then decode only a short run of records.
//!
//! # On-disk layout
//!
//! ```text
//! [RECORD 0] [RECORD 1] ... [RECORD N-1]
//! [RESTART_0_LE32] [RESTART_1_LE32] ... [RESTART_R-1_LE32]
//! [NUM_RESTARTS_LE32]
//! ```
//!
//! Each record:
//!
//! ```text
//! [SHARED varint32][UNSHARED varint32][VALUE_LEN varint32][KEY_SUFFIX][VALUE]
//! ```
//!
//! - `SHARED`: bytes shared with the previous key; always `0` at a restart.
//! - `UNSHARED`: length of the key suffix that follows the header.
//! - `VALUE_LEN`: length of the value bytes that follow the suffix.
//!
//! `RESTART_0` is always `0`. A block with no entries still carries that
//! single restart, so its encoded form is the 8 bytes
//! `00 00 00 00 01 00 00 00`.
//!
//! # Sub-modules
//!
//! - [`builder`]: [`BlockBuilder`], the encoder.
//! - [`reader`]: [`Block`], a validated read-only view over finished bytes.
//! - [`iterator`]: [`BlockIter`] cursor and the [`Entries`] iterator adapter.
//!
//! # Concurrency model
//!
//! - A [`BlockBuilder`] is owned by a single producer and is not `Clone`.
//! - A finished block is immutable. Any number of [`Block`] views and
//!   [`BlockIter`] cursors may read the same bytes concurrently; each cursor
//!   carries its own position.
//!
//! # Guarantees
//!
//! - **Round-trip:** decoding yields exactly the entries that were added, in order.
//! - **Ordering:** the builder refuses keys that are not strictly increasing.
//! - **Fail-closed decoding:** truncated or mutated bytes surface as
//!   [`BlockError::Corruption`]; the decoder never reads out of bounds.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;
pub mod reader;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Re-exports: public API surface
// ------------------------------------------------------------------------------------------------

pub use builder::BlockBuilder;
pub use iterator::{BlockEntry, BlockIter, Entries};
pub use reader::Block;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use crate::encoding::EncodingError;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Default number of records between restart points.
pub const DEFAULT_RESTART_INTERVAL: usize = 16;

/// Size of one entry in the restart index.
pub const RESTART_ENTRY_SIZE: usize = 4;

/// Size of the trailing restart count.
pub const RESTART_COUNT_SIZE: usize = 4;

/// Smallest byte length a block can have (the restart count alone).
pub const MIN_BLOCK_SIZE: usize = RESTART_COUNT_SIZE;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by block encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// The encoded bytes are structurally invalid.
    #[error("corruption: {0}")]
    Corruption(String),

    /// A key was added that is not strictly greater than its predecessor.
    #[error("key ordering violation: {key:?} is not greater than {previous:?}")]
    OrderingViolation {
        /// The most recently added key.
        previous: Vec<u8>,
        /// The rejected key.
        key: Vec<u8>,
    },

    /// `add` or `finish` was called on a finished builder without `reset`.
    #[error("block already finished")]
    AlreadyFinished,

    /// Invalid builder configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A primitive could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

impl BlockError {
    /// Shorthand for building a [`BlockError::Corruption`].
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`BlockBuilder`].
///
/// # Example
///
/// ```rust
/// use sortblock::block::{BlockBuilder, BlockOptions};
///
/// let builder = BlockBuilder::new(BlockOptions {
///     restart_interval: 4,
/// })
/// .unwrap();
/// assert_eq!(builder.restart_interval(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOptions {
    /// Number of records between restart points.
    ///
    /// Smaller values make seeks cheaper and blocks larger. `1` disables
    /// prefix compression entirely.
    ///
    /// Default: 16. Must be ≥ 1.
    pub restart_interval: usize,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            restart_interval: DEFAULT_RESTART_INTERVAL,
        }
    }
}

impl BlockOptions {
    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.restart_interval < 1 {
            return Err(BlockError::InvalidConfig(
                "restart_interval must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
