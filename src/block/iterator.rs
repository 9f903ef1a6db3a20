//! Block iterators: the seekable cursor and an owned-key iterator adapter.
//!
//! This module provides two types:
//!
//! - [`BlockIter`]: a forward-only cursor over one [`Block`] with
//!   `seek_to_first()`, `seek(target)`, `next()`, `key()` and `value()`.
//! - [`Entries`]: wraps a cursor as a standard [`Iterator`] yielding
//!   [`BlockEntry`] values.
//!
//! # Seeking
//!
//! `seek(target)` runs in two phases:
//!
//! 1. **Binary search over restart points.** A restart record stores its
//!    key in full, so each step decodes one header and compares a direct
//!    slice of the block. The search finds the last restart whose key is
//!    `<= target`.
//! 2. **Linear scan.** From that restart, records are decoded one by one,
//!    rebuilding each key from its predecessor, until a key `>= target`
//!    appears or the block ends.
//!
//! # Corruption
//!
//! While decoding sequentially the cursor checks that:
//!
//! - header varints are well formed and lengths stay inside the record region,
//! - the shared length never exceeds the previous key,
//! - records land exactly on every restart offset with a shared length of 0,
//! - keys strictly increase.
//!
//! Any violation makes the cursor invalid and the error sticky: every later
//! positioning call returns the same [`BlockError::Corruption`].

use std::ops::Range;

use tracing::warn;

use crate::encoding;

use super::{Block, BlockError};

// ------------------------------------------------------------------------------------------------
// Block Entry
// ------------------------------------------------------------------------------------------------

/// A decoded entry. The key is rebuilt from prefix-compressed records and
/// therefore owned; the value borrows the block bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry<'a> {
    /// The full key bytes.
    pub key: Vec<u8>,

    /// The value bytes.
    pub value: &'a [u8],
}

// ------------------------------------------------------------------------------------------------
// Record header
// ------------------------------------------------------------------------------------------------

/// Decoded `[shared][unshared][value_len]` header of one record.
struct RecordHeader {
    shared: usize,
    non_shared: usize,
    value_len: usize,
    /// Offset of the key suffix, just past the header.
    key_start: usize,
}

impl RecordHeader {
    /// Decodes the header of the record at `offset` and checks that the key
    /// suffix and value fit inside `records`.
    fn decode(records: &[u8], offset: usize) -> Result<Self, BlockError> {
        let mut pos = offset;
        let mut field = |name: &str| -> Result<usize, BlockError> {
            let buf = records.get(pos..).unwrap_or_default();
            let (v, n) = encoding::decode_varint32(buf).map_err(|e| {
                BlockError::corruption(format!("bad {name} length at offset {pos}: {e}"))
            })?;
            pos += n;
            Ok(v as usize)
        };
        let shared = field("shared")?;
        let non_shared = field("unshared")?;
        let value_len = field("value")?;

        let end = pos
            .checked_add(non_shared)
            .and_then(|p| p.checked_add(value_len));
        match end {
            Some(end) if end <= records.len() => Ok(Self {
                shared,
                non_shared,
                value_len,
                key_start: pos,
            }),
            _ => Err(BlockError::corruption(format!(
                "record at offset {offset} overruns record region of {} bytes",
                records.len()
            ))),
        }
    }

    fn key_suffix(&self) -> Range<usize> {
        self.key_start..self.key_start + self.non_shared
    }

    fn value(&self) -> Range<usize> {
        let start = self.key_start + self.non_shared;
        start..start + self.value_len
    }
}

// ------------------------------------------------------------------------------------------------
// Block Iterator
// ------------------------------------------------------------------------------------------------

/// Forward-only cursor over the entries of one [`Block`].
///
/// A fresh cursor is not positioned; call [`seek_to_first`](Self::seek_to_first)
/// or [`seek`](Self::seek) before reading.
#[derive(Debug, Clone)]
pub struct BlockIter<'a> {
    /// Validated block view.
    block: Block<'a>,

    /// Record region of the block.
    records: &'a [u8],

    /// Offset of the current record; `records.len()` when not valid.
    current: usize,

    /// Offset of the record following the current one.
    next_offset: usize,

    /// Restart run that contains the current record.
    restart_index: usize,

    /// Whether `key` holds a previously decoded key to compare against.
    has_prev: bool,

    /// Full key of the current record.
    key: Vec<u8>,

    /// Byte range of the current value inside `records`.
    value: Range<usize>,

    /// Whether the cursor points at an entry.
    valid: bool,

    /// Sticky corruption error.
    status: Option<BlockError>,
}

impl<'a> BlockIter<'a> {
    pub(crate) fn new(block: Block<'a>) -> Self {
        let records = block.records();
        Self {
            block,
            records,
            current: records.len(),
            next_offset: records.len(),
            restart_index: 0,
            has_prev: false,
            key: Vec::new(),
            value: 0..0,
            valid: false,
            status: None,
        }
    }

    /// Returns `true` if the cursor points at an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Key of the current entry. Empty when not [`valid`](Self::valid).
    pub fn key(&self) -> &[u8] {
        if self.valid { self.key.as_slice() } else { &[] }
    }

    /// Value of the current entry. Empty when not [`valid`](Self::valid).
    pub fn value(&self) -> &'a [u8] {
        let records: &'a [u8] = self.records;
        if self.valid {
            &records[self.value.clone()]
        } else {
            &[]
        }
    }

    /// The corruption error that stopped this cursor, if any.
    pub fn status(&self) -> Option<&BlockError> {
        self.status.as_ref()
    }

    /// Positions the cursor at the first entry, or at the end if the block
    /// is empty.
    pub fn seek_to_first(&mut self) -> Result<(), BlockError> {
        self.check_status()?;
        let result = self
            .seek_to_restart_point(0)
            .and_then(|()| self.parse_next())
            .map(|_| ());
        self.guard(result)
    }

    /// Positions the cursor at the first entry whose key is `>= target`, or
    /// at the end if every key is smaller.
    pub fn seek(&mut self, target: &[u8]) -> Result<(), BlockError> {
        self.check_status()?;
        let result = self.seek_inner(target);
        self.guard(result)
    }

    /// Advances to the next entry. Leaves a cursor that is not valid untouched.
    pub fn next(&mut self) -> Result<(), BlockError> {
        self.check_status()?;
        if !self.valid {
            return Ok(());
        }
        let result = self.parse_next().map(|_| ());
        self.guard(result)
    }

    fn seek_inner(&mut self, target: &[u8]) -> Result<(), BlockError> {
        let mut left = 0;
        let mut right = self.block.num_restarts().saturating_sub(1);
        while left < right {
            let mid = (left + right + 1) / 2;
            let offset = self.block.restart_point(mid)?;
            let header = RecordHeader::decode(self.records, offset)?;
            if header.shared != 0 {
                return Err(BlockError::corruption(format!(
                    "restart record at offset {offset} has shared length {}",
                    header.shared
                )));
            }
            let mid_key = &self.records[header.key_suffix()];
            if mid_key <= target {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart_point(left)?;
        while self.parse_next()? {
            if self.key.as_slice() >= target {
                break;
            }
        }
        Ok(())
    }

    fn seek_to_restart_point(&mut self, index: usize) -> Result<(), BlockError> {
        self.key.clear();
        self.has_prev = false;
        self.valid = false;
        self.restart_index = index;
        self.next_offset = self.block.restart_point(index)?;
        Ok(())
    }

    /// Decodes the record at `next_offset`. Returns `false` at the end of
    /// the record region.
    fn parse_next(&mut self) -> Result<bool, BlockError> {
        self.current = self.next_offset;
        if self.current >= self.records.len() {
            self.mark_end();
            return Ok(false);
        }

        let mut at_restart = self.block.restart_point(self.restart_index)? == self.current;
        if self.restart_index + 1 < self.block.num_restarts() {
            let next_restart = self.block.restart_point(self.restart_index + 1)?;
            if self.current == next_restart {
                self.restart_index += 1;
                at_restart = true;
            } else if self.current > next_restart {
                return Err(BlockError::corruption(format!(
                    "record at offset {} skips restart point {next_restart}",
                    self.current
                )));
            }
        }

        let header = RecordHeader::decode(self.records, self.current)?;
        if at_restart && header.shared != 0 {
            return Err(BlockError::corruption(format!(
                "restart record at offset {} has shared length {}",
                self.current, header.shared
            )));
        }
        if header.shared > self.key.len() {
            return Err(BlockError::corruption(format!(
                "record at offset {} shares {} bytes with a {}-byte key",
                self.current,
                header.shared,
                self.key.len()
            )));
        }

        let records: &'a [u8] = self.records;
        let suffix = &records[header.key_suffix()];
        if self.has_prev && suffix <= &self.key[header.shared..] {
            return Err(BlockError::corruption(format!(
                "key at offset {} does not increase",
                self.current
            )));
        }

        self.key.truncate(header.shared);
        self.key.extend_from_slice(suffix);
        self.value = header.value();
        self.next_offset = self.value.end;
        self.has_prev = true;
        self.valid = true;
        Ok(true)
    }

    fn mark_end(&mut self) {
        self.current = self.records.len();
        self.next_offset = self.records.len();
        self.valid = false;
    }

    fn check_status(&self) -> Result<(), BlockError> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Records a failed positioning call so the cursor fails closed.
    fn guard(&mut self, result: Result<(), BlockError>) -> Result<(), BlockError> {
        if let Err(err) = &result {
            warn!(offset = self.current, error = %err, "block corruption detected");
            self.mark_end();
            self.key.clear();
            self.status = Some(err.clone());
        }
        result
    }
}

// ------------------------------------------------------------------------------------------------
// Entries
// ------------------------------------------------------------------------------------------------

/// Standard iterator over every entry of a block, in order.
///
/// Yields one `Err` and then stops if the block is corrupt.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    iter: BlockIter<'a>,
    started: bool,
    done: bool,
}

impl<'a> Entries<'a> {
    pub(crate) fn new(iter: BlockIter<'a>) -> Self {
        Self {
            iter,
            started: false,
            done: false,
        }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<BlockEntry<'a>, BlockError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let step = if self.started {
            self.iter.next()
        } else {
            self.started = true;
            self.iter.seek_to_first()
        };

        match step {
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
            Ok(()) if self.iter.valid() => Some(Ok(BlockEntry {
                key: self.iter.key().to_vec(),
                value: self.iter.value(),
            })),
            Ok(()) => {
                self.done = true;
                None
            }
        }
    }
}
