//! # sortblock
//!
//! The on-disk **block format** of a sorted key-value storage engine: many
//! strictly increasing key/value pairs packed into one compact byte buffer
//! with **shared-prefix key compression** and a trailing **restart index**
//! for binary search.
//!
//! ## Quick Start
//!
//! ```rust
//! use sortblock::block::{Block, BlockBuilder, BlockOptions};
//!
//! let mut builder = BlockBuilder::new(BlockOptions { restart_interval: 2 }).unwrap();
//! builder.add(b"a", b"1").unwrap();
//! builder.add(b"ab", b"2").unwrap();
//! builder.add(b"abc", b"3").unwrap();
//! builder.add(b"b", b"4").unwrap();
//! let bytes = builder.finish().unwrap().to_vec();
//!
//! let block = Block::new(&bytes).unwrap();
//! assert_eq!(block.num_restarts(), 2);
//!
//! // Seek
//! let mut iter = block.iter();
//! iter.seek(b"ab").unwrap();
//! assert_eq!((iter.key(), iter.value()), (&b"ab"[..], &b"2"[..]));
//!
//! // Point lookup
//! assert_eq!(block.get(b"abc").unwrap(), Some(&b"3"[..]));
//! assert_eq!(block.get(b"zzz").unwrap(), None);
//!
//! // Full scan
//! let keys: Vec<Vec<u8>> = block.entries().map(|e| e.unwrap().key).collect();
//! assert_eq!(keys, [b"a".to_vec(), b"ab".to_vec(), b"abc".to_vec(), b"b".to_vec()]);
//! ```
//!
//! ## Modules
//!
//! - [`block`]: the encoder ([`block::BlockBuilder`]) and decoder
//!   ([`block::Block`], [`block::BlockIter`]).
//! - [`encoding`]: varint, fixed32 and shared-prefix helpers.
//! - [`env`]: the file-system collaborator used to persist and load
//!   finished blocks.
//!
//! ## Features
//!
//! - **Prefix compression**: keys store only the suffix that differs from their predecessor.
//! - **Restart points**: binary search over full keys, then a short linear scan.
//! - **Checked ordering**: out-of-order keys are rejected instead of corrupting the block.
//! - **Fail-closed decoding**: malformed bytes surface as corruption, never as wrong answers.

pub mod block;
pub mod encoding;
pub mod env;

use std::io;

use thiserror::Error;

pub use block::{Block, BlockBuilder, BlockEntry, BlockError, BlockIter, BlockOptions};
pub use env::{Env, EnvWrapper, FsEnv};

/// Result alias for crate-level operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// The kind of an [`Error`], without its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested item does not exist.
    NotFound,
    /// Stored data is structurally invalid.
    Corruption,
    /// The operation is not supported by this implementation.
    NotSupported,
    /// The caller passed an invalid argument or violated a precondition.
    InvalidArgument,
    /// The operating system reported an I/O failure.
    IoError,
}

/// Errors returned by environment operations and by block operations once
/// lifted to the crate level.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data is structurally invalid.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The operation is not supported by this implementation.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The caller passed an invalid argument or violated a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Corruption(_) => ErrorKind::Corruption,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Io(_) => ErrorKind::IoError,
        }
    }

    /// Returns `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns `true` for [`Error::Corruption`].
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }

    /// Returns `true` for [`Error::NotSupported`].
    pub fn is_not_supported(&self) -> bool {
        self.kind() == ErrorKind::NotSupported
    }

    /// Returns `true` for [`Error::InvalidArgument`].
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// Returns `true` for [`Error::Io`].
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }
}

impl From<BlockError> for Error {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::Corruption(_) | BlockError::Encoding(_) => {
                Self::Corruption(err.to_string())
            }
            BlockError::OrderingViolation { .. }
            | BlockError::AlreadyFinished
            | BlockError::InvalidConfig(_) => Self::InvalidArgument(err.to_string()),
        }
    }
}
