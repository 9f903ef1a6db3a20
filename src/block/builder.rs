//! Block builder: packs sorted key/value pairs into one block.
//!
//! The [`BlockBuilder`] is driven entry by entry by an upstream writer
//! (typically a table builder) and produces a single immutable byte buffer
//! when [`BlockBuilder::finish`] is called.
//!
//! # Input Requirements
//!
//! - Keys **must be strictly increasing** under byte-wise comparison.
//!   Violations are rejected with [`BlockError::OrderingViolation`] and the
//!   block built so far is left untouched.
//!
//! # Lifecycle
//!
//! ```text
//! new / reset ──add*──▶ finish ──▶ (bytes valid until reset or drop)
//!      ▲                               │
//!      └───────────── reset ◀──────────┘
//! ```
//!
//! `add` and `finish` after a `finish` return [`BlockError::AlreadyFinished`].

use tracing::{debug, trace};

use crate::encoding::{self, len_to_u32};

use super::{BlockError, BlockOptions, RESTART_COUNT_SIZE, RESTART_ENTRY_SIZE};

// ------------------------------------------------------------------------------------------------
// BlockBuilder
// ------------------------------------------------------------------------------------------------

/// Encoder for a single prefix-compressed block.
///
/// Not `Clone`: a builder has exactly one owner between `reset` and `finish`.
#[derive(Debug)]
pub struct BlockBuilder {
    /// Validated configuration.
    options: BlockOptions,

    /// Encoded records, followed by the restart index once finished.
    buffer: Vec<u8>,

    /// Offsets of restart records inside `buffer`. Always starts with `0`.
    restarts: Vec<u32>,

    /// Records emitted since the last restart point.
    counter: usize,

    /// Total records added since the last reset.
    entries: usize,

    /// Has `finish` been called since the last reset?
    finished: bool,

    /// Full bytes of the most recently added key.
    last_key: Vec<u8>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::with_options(BlockOptions::default())
    }
}

impl BlockBuilder {
    /// Creates a builder with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::InvalidConfig`] if `restart_interval` is zero.
    pub fn new(options: BlockOptions) -> Result<Self, BlockError> {
        options.validate()?;
        Ok(Self::with_options(options))
    }

    fn with_options(options: BlockOptions) -> Self {
        Self {
            options,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            entries: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Clears all accumulated state, as if the builder was just constructed.
    ///
    /// Allocated capacity is kept for reuse.
    pub fn reset(&mut self) {
        trace!(entries = self.entries, "block builder reset");
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.entries = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Appends one entry to the block.
    ///
    /// # Errors
    ///
    /// - [`BlockError::AlreadyFinished`] if `finish` was called since the last `reset`.
    /// - [`BlockError::OrderingViolation`] if `key` is not strictly greater
    ///   than the previously added key.
    /// - [`BlockError::Encoding`] if the key or value length exceeds `u32::MAX`.
    ///
    /// On error the builder is unchanged.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), BlockError> {
        if self.finished {
            return Err(BlockError::AlreadyFinished);
        }
        if self.entries > 0 && key <= self.last_key.as_slice() {
            return Err(BlockError::OrderingViolation {
                previous: self.last_key.clone(),
                key: key.to_vec(),
            });
        }

        let restart = self.counter >= self.options.restart_interval;
        let shared = if restart {
            0
        } else {
            encoding::shared_prefix_len(&self.last_key, key)
        };
        let non_shared = key.len() - shared;

        // Validate every length before touching the buffer.
        let shared_u32 = len_to_u32(shared)?;
        let non_shared_u32 = len_to_u32(non_shared)?;
        let value_len_u32 = len_to_u32(value.len())?;
        let offset = len_to_u32(self.buffer.len())?;

        if restart {
            self.restarts.push(offset);
            self.counter = 0;
        }

        encoding::put_varint32(&mut self.buffer, shared_u32);
        encoding::put_varint32(&mut self.buffer, non_shared_u32);
        encoding::put_varint32(&mut self.buffer, value_len_u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
        self.entries += 1;
        Ok(())
    }

    /// Appends the restart index and count and returns the finished block.
    ///
    /// The returned slice borrows the builder and stays valid until the
    /// builder is reset or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::AlreadyFinished`] if called twice without `reset`.
    pub fn finish(&mut self) -> Result<&[u8], BlockError> {
        if self.finished {
            return Err(BlockError::AlreadyFinished);
        }

        let restart_count = len_to_u32(self.restarts.len())?;
        self.buffer
            .reserve(self.restarts.len() * RESTART_ENTRY_SIZE + RESTART_COUNT_SIZE);
        for &offset in &self.restarts {
            encoding::put_fixed32(&mut self.buffer, offset);
        }
        encoding::put_fixed32(&mut self.buffer, restart_count);
        self.finished = true;

        debug!(
            entries = self.entries,
            restarts = restart_count,
            bytes = self.buffer.len(),
            "block finished"
        );
        Ok(self.buffer.as_slice())
    }

    /// Estimated size of the block if it were finished now.
    ///
    /// Counts the records so far, the restart index, the restart count, and
    /// headroom for one further restart point. The value never decreases as
    /// entries are added and is never below the length `finish` returns.
    pub fn current_size_estimate(&self) -> usize {
        if self.finished {
            return self.buffer.len();
        }
        self.buffer.len() + RESTART_ENTRY_SIZE * (self.restarts.len() + 1) + RESTART_COUNT_SIZE
    }

    /// Returns `true` if no entry has been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of entries added since the last reset.
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Number of restart points recorded so far (at least 1).
    pub fn num_restarts(&self) -> usize {
        self.restarts.len()
    }

    /// The most recently added key, or empty if none.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Configured restart interval.
    pub fn restart_interval(&self) -> usize {
        self.options.restart_interval
    }
}
