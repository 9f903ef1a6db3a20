//! File-system and OS collaborator.
//!
//! Blocks are persisted and loaded through this narrow interface rather
//! than through `std::fs` directly, so an engine can substitute its own
//! implementation (in-memory, encrypted, instrumented).
//!
//! # Contracts
//!
//! - A [`WritableFile`] is used by one thread at a time.
//! - A [`RandomAccessFile`] is `Sync` and may be read concurrently.
//! - [`Env::new_appendable_file`] may legitimately return
//!   [`Error::NotSupported`]; callers must tolerate that.
//! - Missing files are reported as [`Error::NotFound`]; other OS failures
//!   as [`Error::Io`].
//!
//! [`FsEnv`] is the `std::fs` implementation. [`EnvWrapper`] forwards every
//! call to another env, so an implementation can override a few operations
//! and inherit the rest.

mod fs;
mod wrapper;


pub use fs::FsEnv;
pub use wrapper::EnvWrapper;

use std::{
    borrow::Cow,
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use crate::{Error, Result};

/// Work item run by [`Env::schedule`] or [`Env::start_thread`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Chunk size used by [`read_file_to_vec`].
const READ_CHUNK_SIZE: usize = 8192;

// ------------------------------------------------------------------------------------------------
// File traits
// ------------------------------------------------------------------------------------------------

/// A file read front to back.
pub trait SequentialFile: Send {
    /// Reads up to `buf.len()` bytes. Returns `0` at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Skips `n` bytes. Skipping past the end is not an error.
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// A file read at arbitrary offsets, safe for concurrent use.
pub trait RandomAccessFile: Send + Sync {
    /// Reads up to `n` bytes starting at `offset`.
    ///
    /// Returns fewer than `n` bytes only at end of file. Implementations
    /// backed by memory maps return borrowed bytes.
    fn read(&self, offset: u64, n: usize) -> Result<Cow<'_, [u8]>>;

    /// Length of the file in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the file is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A buffered, append-only file.
pub trait WritableFile: Send {
    /// Appends `data` to the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Pushes buffered bytes to the operating system.
    fn flush(&mut self) -> Result<()>;

    /// Flushes and asks the operating system to persist the contents.
    fn sync(&mut self) -> Result<()>;

    /// Flushes and closes the file. Further appends fail.
    fn close(&mut self) -> Result<()>;
}

/// An advisory lock on a file, released by [`Env::unlock_file`] or when
/// dropped.
pub struct FileLock {
    pub(crate) path: PathBuf,
    /// Holds the OS lock for as long as the descriptor stays open.
    pub(crate) file: fd_lock::RwLock<std::fs::File>,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock").field("path", &self.path).finish_non_exhaustive()
    }
}

impl FileLock {
    /// Path of the locked file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ------------------------------------------------------------------------------------------------
// Env
// ------------------------------------------------------------------------------------------------

/// Operating-system services used to persist and load blocks.
pub trait Env: Send + Sync {
    /// Opens an existing file for sequential reading.
    fn new_sequential_file(&self, path: &Path) -> Result<Box<dyn SequentialFile>>;

    /// Opens an existing file for random-access reading.
    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>>;

    /// Creates a new file for writing, truncating any existing file.
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    /// Opens a file for appending, creating it if needed.
    ///
    /// The default implementation reports [`Error::NotSupported`].
    fn new_appendable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        Err(Error::NotSupported(format!(
            "new_appendable_file: {}",
            path.display()
        )))
    }

    /// Returns `true` if `path` exists.
    fn file_exists(&self, path: &Path) -> bool;

    /// Names of the entries in `dir` (not full paths).
    fn get_children(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Removes a file.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Creates a directory.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Removes an empty directory.
    fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Size of a file in bytes.
    fn get_file_size(&self, path: &Path) -> Result<u64>;

    /// Atomically renames `from` to `to`, replacing `to` if it exists.
    fn rename_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Acquires an advisory lock on `path`, creating the file if needed.
    ///
    /// Fails if the lock is already held.
    fn lock_file(&self, path: &Path) -> Result<FileLock>;

    /// Releases a lock acquired by [`Env::lock_file`].
    fn unlock_file(&self, lock: FileLock) -> Result<()>;

    /// Runs `job` once on a background thread. Jobs run in FIFO order.
    fn schedule(&self, job: Job);

    /// Runs `job` on a new thread.
    fn start_thread(&self, job: Job) -> Result<()>;

    /// Microseconds since an arbitrary fixed point. Never decreases.
    fn now_micros(&self) -> u64;

    /// Blocks the calling thread for `micros` microseconds.
    fn sleep_for_micros(&self, micros: u64) {
        thread::sleep(Duration::from_micros(micros));
    }

    /// A scratch directory for tests, created if missing.
    ///
    /// The default is a per-process directory under the system temp dir.
    /// It may be shared with other envs in the same process.
    fn get_test_directory(&self) -> Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!("sortblock-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).map_err(|e| map_io_error(&dir, e))?;
        Ok(dir)
    }
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Maps an I/O error on `path` to the crate error, turning "not found"
/// into [`Error::NotFound`].
pub(crate) fn map_io_error(path: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(format!("{}: {err}", path.display()))
    } else {
        Error::Io(err)
    }
}

fn write_bytes<E: Env + ?Sized>(env: &E, data: &[u8], path: &Path, sync: bool) -> Result<()> {
    let mut file = env.new_writable_file(path)?;
    let mut result = file.append(data);
    if result.is_ok() && sync {
        result = file.sync();
    }
    if result.is_ok() {
        result = file.close();
    }
    drop(file);
    if result.is_err() {
        let _ = env.remove_file(path);
    }
    result
}

/// Writes `data` to a new file at `path`. The file is removed on failure.
pub fn write_bytes_to_file<E: Env + ?Sized>(env: &E, data: &[u8], path: &Path) -> Result<()> {
    write_bytes(env, data, path, false)
}

/// Like [`write_bytes_to_file`], but syncs before closing.
pub fn write_bytes_to_file_sync<E: Env + ?Sized>(
    env: &E,
    data: &[u8],
    path: &Path,
) -> Result<()> {
    write_bytes(env, data, path, true)
}

/// Reads the whole file at `path` sequentially.
pub fn read_file_to_vec<E: Env + ?Sized>(env: &E, path: &Path) -> Result<Vec<u8>> {
    let mut file = env.new_sequential_file(path)?;
    let mut data = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data)
}
