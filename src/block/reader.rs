//! Block reader: a validated, read-only view over finished block bytes.
//!
//! [`Block::new`] parses and checks the restart index once; cursors created
//! with [`Block::iter`] then rely on it for binary search.
//!
//! The view borrows the caller's buffer (heap bytes, an mmap, a slice of a
//! larger file) and never copies or mutates it.

use tracing::warn;

use crate::encoding;

use super::{BlockError, BlockIter, Entries, MIN_BLOCK_SIZE, RESTART_COUNT_SIZE, RESTART_ENTRY_SIZE};

// ------------------------------------------------------------------------------------------------
// Block
// ------------------------------------------------------------------------------------------------

/// A parsed block whose restart index has been validated.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    /// The complete block bytes, including the restart index and count.
    data: &'a [u8],

    /// Offset of the restart index; also the end of the record region.
    restarts_offset: usize,

    /// Number of entries in the restart index.
    num_restarts: usize,
}

impl<'a> Block<'a> {
    /// Parses the block footer and validates the restart index.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::Corruption`] if:
    ///
    /// - `data` is shorter than the 4-byte restart count,
    /// - the restart index would extend past the start of the buffer,
    /// - the first restart offset is not `0`,
    /// - restart offsets are not strictly increasing or point outside the
    ///   record region,
    /// - the restart count is zero.
    pub fn new(data: &'a [u8]) -> Result<Self, BlockError> {
        if data.len() < MIN_BLOCK_SIZE {
            return Err(Self::reject(format!(
                "block too small: {} bytes",
                data.len()
            )));
        }

        let count_offset = data.len() - RESTART_COUNT_SIZE;
        let num_restarts = encoding::decode_fixed32(&data[count_offset..])? as usize;

        let max_restarts = count_offset / RESTART_ENTRY_SIZE;
        if num_restarts > max_restarts {
            return Err(Self::reject(format!(
                "restart count {num_restarts} exceeds block capacity {max_restarts}"
            )));
        }

        let restarts_offset = count_offset - num_restarts * RESTART_ENTRY_SIZE;
        let block = Self {
            data,
            restarts_offset,
            num_restarts,
        };

        // Even an empty block carries restart 0.
        if num_restarts == 0 {
            return Err(Self::reject("restart index is empty"));
        }

        let mut previous: Option<usize> = None;
        for i in 0..num_restarts {
            let offset = block.restart_point(i)?;
            match previous {
                None if offset != 0 => {
                    return Err(Self::reject(format!(
                        "first restart offset is {offset}, expected 0"
                    )));
                }
                Some(prev) if offset <= prev => {
                    return Err(Self::reject(format!(
                        "restart {i} offset {offset} not greater than {prev}"
                    )));
                }
                _ => {}
            }
            // Offset 0 of an empty block is the only one allowed at the region end.
            if offset >= restarts_offset && !(offset == 0 && restarts_offset == 0) {
                return Err(Self::reject(format!(
                    "restart {i} offset {offset} outside record region of {restarts_offset} bytes"
                )));
            }
            previous = Some(offset);
        }

        Ok(block)
    }

    fn reject(msg: impl Into<String>) -> BlockError {
        let msg = msg.into();
        warn!(reason = %msg, "rejecting block");
        BlockError::Corruption(msg)
    }

    /// Offset of restart point `index` inside the record region.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::Corruption`] if `index` is out of range.
    pub fn restart_point(&self, index: usize) -> Result<usize, BlockError> {
        if index >= self.num_restarts {
            return Err(BlockError::corruption(format!(
                "restart index {index} out of range ({} restarts)",
                self.num_restarts
            )));
        }
        let at = self.restarts_offset + index * RESTART_ENTRY_SIZE;
        Ok(encoding::decode_fixed32(&self.data[at..])? as usize)
    }

    /// Number of restart points.
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    /// Total size of the block in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The underlying block bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The record region, i.e. the bytes before the restart index.
    pub(crate) fn records(&self) -> &'a [u8] {
        &self.data[..self.restarts_offset]
    }

    /// Returns `true` if the block holds no records.
    pub fn is_empty(&self) -> bool {
        self.restarts_offset == 0
    }

    /// Creates a cursor positioned before the first entry.
    pub fn iter(&self) -> BlockIter<'a> {
        BlockIter::new(*self)
    }

    /// Iterates over every entry in order.
    pub fn entries(&self) -> Entries<'a> {
        Entries::new(self.iter())
    }

    /// Looks up the value stored under exactly `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<&'a [u8]>, BlockError> {
        let mut iter = self.iter();
        iter.seek(key)?;
        if iter.valid() && iter.key() == key {
            Ok(Some(iter.value()))
        } else {
            Ok(None)
        }
    }
}
