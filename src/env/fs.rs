//! `std::fs`-backed [`Env`].
//!
//! - Writable files are wrapped in a [`BufWriter`].
//! - Random-access files are memory-mapped; empty files, which cannot be
//!   mapped portably, fall back to positional reads.
//! - Locks are OS advisory locks (`flock` on Unix) taken with `fd-lock`, so
//!   other processes are excluded and the lock dies with the process. A
//!   process-wide table also rejects a second `lock_file` from this process.
//! - `schedule` feeds a single background thread through a channel. The
//!   thread is started on first use and joined when the env is dropped. A
//!   panicking job is logged and does not stop the worker.

use std::{
    borrow::Cow,
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io::{self, BufReader, BufWriter, Read, Write},
    os::unix::fs::FileExt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex, PoisonError},
    thread,
    time::Instant,
};

use crossbeam::channel::{self, SendError, Sender};
use fd_lock::RwLock;
use memmap2::Mmap;
use tracing::{debug, error, warn};

use super::{
    map_io_error, Env, FileLock, Job, RandomAccessFile, SequentialFile, WritableFile,
};
use crate::{Error, Result};

/// Paths currently locked by any [`FsEnv`] in this process.
static LOCKED_FILES: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

// ------------------------------------------------------------------------------------------------
// Files
// ------------------------------------------------------------------------------------------------

struct FsSequentialFile {
    path: PathBuf,
    reader: BufReader<File>,
}

impl SequentialFile for FsSequentialFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader
            .read(buf)
            .map_err(|e| map_io_error(&self.path, e))
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let n = i64::try_from(n)
            .map_err(|_| Error::InvalidArgument(format!("skip of {n} bytes too large")))?;
        self.reader
            .seek_relative(n)
            .map_err(|e| map_io_error(&self.path, e))
    }
}

/// Memory-mapped random-access file.
struct MmapFile {
    mmap: Mmap,
}

impl RandomAccessFile for MmapFile {
    fn read(&self, offset: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        let len = self.mmap.len();
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start <= len)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("read offset {offset} beyond file size {len}"))
            })?;
        let end = start.saturating_add(n).min(len);
        Ok(Cow::Borrowed(&self.mmap[start..end]))
    }

    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }
}

/// Random-access file read with `pread`.
struct PreadFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl RandomAccessFile for PreadFile {
    fn read(&self, offset: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        if offset > self.len {
            return Err(Error::InvalidArgument(format!(
                "read offset {offset} beyond file size {}",
                self.len
            )));
        }
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = self
                .file
                .read_at(&mut buf[filled..], offset + filled as u64)
                .map_err(|e| map_io_error(&self.path, e))?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(Cow::Owned(buf))
    }

    fn len(&self) -> u64 {
        self.len
    }
}

struct FsWritableFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FsWritableFile {
    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument(format!("{} is closed", path.display())))
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer()?.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The descriptor closes right after this, which releases the OS lock.
        LOCKED_FILES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

// ------------------------------------------------------------------------------------------------
// Background worker
// ------------------------------------------------------------------------------------------------

/// Holds the job sender and the worker handle.
/// Taken (`Option::take`) on drop to ensure single cleanup.
struct BackgroundWorker {
    sender: Sender<Job>,
    worker: thread::JoinHandle<()>,
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

// ------------------------------------------------------------------------------------------------
// FsEnv
// ------------------------------------------------------------------------------------------------

/// [`Env`] implementation on top of the local file system.
pub struct FsEnv {
    /// Origin of [`Env::now_micros`].
    started: Instant,

    /// Lazily started background worker.
    background: Mutex<Option<BackgroundWorker>>,
}

impl std::fmt::Debug for FsEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsEnv").finish_non_exhaustive()
    }
}

impl Default for FsEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl FsEnv {
    /// Creates a new file-system env.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            background: Mutex::new(None),
        }
    }

    fn spawn_worker() -> io::Result<BackgroundWorker> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let worker = thread::Builder::new()
            .name("sortblock-bg".into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        error!("background job panicked: {}", panic_message(&*payload));
                    }
                }
            })?;
        Ok(BackgroundWorker { sender, worker })
    }

    /// Drains queued jobs and joins the worker thread.
    fn shutdown_worker(&self) {
        let taken = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(bg) = taken {
            // Dropping the sender lets the worker drain the queue and exit.
            drop(bg.sender);
            let _ = bg.worker.join();
        }
    }
}

impl Drop for FsEnv {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

impl Env for FsEnv {
    fn new_sequential_file(&self, path: &Path) -> Result<Box<dyn SequentialFile>> {
        let file = File::open(path).map_err(|e| map_io_error(path, e))?;
        Ok(Box::new(FsSequentialFile {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>> {
        let file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Box::new(PreadFile {
                path: path.to_path_buf(),
                file,
                len,
            }));
        }

        // SAFETY: the mapping is read-only. Files handed to the decoder are
        // finished blocks that are never modified in place.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Box::new(MmapFile { mmap }))
    }

    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let file = File::create(path).map_err(|e| map_io_error(path, e))?;
        debug!(path = %path.display(), "created writable file");
        Ok(Box::new(FsWritableFile {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn new_appendable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| map_io_error(path, e))?;
        debug!(path = %path.display(), "opened appendable file");
        Ok(Box::new(FsWritableFile {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn get_children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| map_io_error(dir, e))? {
            children.push(PathBuf::from(entry?.file_name()));
        }
        Ok(children)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| map_io_error(path, e))?;
        debug!(path = %path.display(), "removed file");
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(|e| map_io_error(path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|e| map_io_error(path, e))
    }

    fn get_file_size(&self, path: &Path) -> Result<u64> {
        let meta = fs::metadata(path).map_err(|e| map_io_error(path, e))?;
        Ok(meta.len())
    }

    fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| map_io_error(from, e))?;
        debug!(from = %from.display(), to = %to.display(), "renamed file");
        Ok(())
    }

    fn lock_file(&self, path: &Path) -> Result<FileLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| map_io_error(path, e))?;

        let mut locked = LOCKED_FILES.lock().unwrap_or_else(PoisonError::into_inner);
        if locked.contains(path) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("lock on {} already held", path.display()),
            )));
        }

        let mut file = RwLock::new(file);
        match file.try_write() {
            // The OS lock lasts as long as the descriptor; `unlock_file`
            // releases it by closing the file.
            Ok(guard) => std::mem::forget(guard),
            Err(e) => {
                warn!(path = %path.display(), "file lock held by another process");
                return Err(Error::Io(e));
            }
        }

        locked.insert(path.to_path_buf());
        debug!(path = %path.display(), "acquired file lock");
        Ok(FileLock {
            path: path.to_path_buf(),
            file,
        })
    }

    fn unlock_file(&self, lock: FileLock) -> Result<()> {
        let held = LOCKED_FILES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&lock.path);
        if !held {
            return Err(Error::InvalidArgument(format!(
                "{} is not locked",
                lock.path.display()
            )));
        }
        debug!(path = %lock.path.display(), "released file lock");
        drop(lock);
        Ok(())
    }

    fn schedule(&self, job: Job) {
        let mut guard = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let job = match guard.as_ref() {
            Some(bg) => match bg.sender.send(job) {
                Ok(()) => return,
                Err(SendError(job)) => {
                    error!("background thread exited, restarting it");
                    job
                }
            },
            None => job,
        };

        match Self::spawn_worker() {
            Ok(bg) => {
                let sent = bg.sender.send(job);
                if let Some(dead) = guard.replace(bg) {
                    let _ = dead.worker.join();
                }
                if let Err(SendError(job)) = sent {
                    drop(guard);
                    error!("background thread exited immediately, running job inline");
                    job();
                }
            }
            Err(e) => {
                error!("failed to spawn background thread: {e}");
                drop(guard);
                job();
            }
        }
    }

    fn start_thread(&self, job: Job) -> Result<()> {
        thread::Builder::new()
            .name("sortblock-thread".into())
            .spawn(job)?;
        Ok(())
    }

    fn now_micros(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}
