//! Forwarding [`Env`].

use std::path::{Path, PathBuf};

use super::{Env, FileLock, Job, RandomAccessFile, SequentialFile, WritableFile};
use crate::Result;

/// An [`Env`] that forwards every call to `target`.
///
/// Wrap an env in a newtype around `EnvWrapper`, implement [`Env`] by
/// delegating to the wrapper, and replace only the calls you need to
/// intercept.
#[derive(Debug, Default)]
pub struct EnvWrapper<E> {
    target: E,
}

impl<E: Env> EnvWrapper<E> {
    /// Wraps `target`.
    pub fn new(target: E) -> Self {
        Self { target }
    }

    /// The env calls are forwarded to.
    pub fn target(&self) -> &E {
        &self.target
    }

    /// Unwraps the target env.
    pub fn into_inner(self) -> E {
        self.target
    }
}

impl<E: Env> Env for EnvWrapper<E> {
    fn new_sequential_file(&self, path: &Path) -> Result<Box<dyn SequentialFile>> {
        self.target.new_sequential_file(path)
    }

    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>> {
        self.target.new_random_access_file(path)
    }

    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        self.target.new_writable_file(path)
    }

    fn new_appendable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        self.target.new_appendable_file(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.target.file_exists(path)
    }

    fn get_children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.target.get_children(dir)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.target.remove_file(path)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.target.create_dir(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        self.target.remove_dir(path)
    }

    fn get_file_size(&self, path: &Path) -> Result<u64> {
        self.target.get_file_size(path)
    }

    fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.target.rename_file(from, to)
    }

    fn lock_file(&self, path: &Path) -> Result<FileLock> {
        self.target.lock_file(path)
    }

    fn unlock_file(&self, lock: FileLock) -> Result<()> {
        self.target.unlock_file(lock)
    }

    fn schedule(&self, job: Job) {
        self.target.schedule(job);
    }

    fn start_thread(&self, job: Job) -> Result<()> {
        self.target.start_thread(job)
    }

    fn now_micros(&self) -> u64 {
        self.target.now_micros()
    }

    fn sleep_for_micros(&self, micros: u64) {
        self.target.sleep_for_micros(micros);
    }

    fn get_test_directory(&self) -> Result<PathBuf> {
        self.target.get_test_directory()
    }
}
