//! Newline-delimited work queue shared between producers and the daemon.
//!
//! Producers append one path per line; the daemon drains the whole file in one
//! step. Both sides hold an exclusive `flock` on the queue file for the duration
//! of the operation, so an append never lands between the read and the truncate
//! of a drain.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to lock queue file {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid queue entry {0:?}: entries must be a single non-empty line")]
    InvalidEntry(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub path: String,
}

impl QueueEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// File name without directory or extension, used as the display title.
    pub fn title(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone())
    }
}

/// Exclusive advisory lock held for as long as the guard lives.
struct LockedFile {
    file: File,
}

impl LockedFile {
    fn acquire(file: File) -> std::io::Result<Self> {
        loop {
            // SAFETY: the descriptor is owned by `file` and stays open for the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                return Ok(Self { file });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        // SAFETY: see `acquire`. Closing the descriptor would release the lock
        // as well; unlocking first keeps the release explicit.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

impl Deref for LockedFile {
    type Target = File;
    fn deref(&self) -> &File {
        &self.file
    }
}

impl DerefMut for LockedFile {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

#[derive(Debug, Clone)]
pub struct WorkQueueStore {
    path: PathBuf,
}

impl WorkQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> QueueError {
        QueueError::Io { path: self.path.clone(), source }
    }

    /// Opens and locks the queue file. Returns `None` when the file does not
    /// exist and `create` is false.
    fn open_locked(&self, create: bool) -> Result<Option<LockedFile>, QueueError> {
        if create {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
                }
            }
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&self.path)
        {
            Ok(f) => f,
            Err(e) if !create && e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };

        LockedFile::acquire(file)
            .map(Some)
            .map_err(|source| QueueError::Lock { path: self.path.clone(), source })
    }

    fn read_entries(&self, file: &mut File) -> Result<Vec<QueueEntry>, QueueError> {
        let mut raw = Vec::new();
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_err(e))?;
        file.read_to_end(&mut raw).map_err(|e| self.io_err(e))?;
        Ok(parse_entries(&String::from_utf8_lossy(&raw)))
    }

    fn rewrite(&self, file: &mut File, entries: &[QueueEntry]) -> Result<(), QueueError> {
        file.set_len(0).map_err(|e| self.io_err(e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_err(e))?;
        file.write_all(render_entries(entries).as_bytes()).map_err(|e| self.io_err(e))?;
        file.sync_data().map_err(|e| self.io_err(e))
    }

    /// Appends paths in order, one per line.
    pub fn append<S: AsRef<str>>(&self, paths: &[S]) -> Result<(), QueueError> {
        let mut entries = Vec::with_capacity(paths.len());
        for p in paths {
            let trimmed = p.as_ref().trim();
            if trimmed.is_empty() || trimmed.contains('\n') || trimmed.contains('\r') {
                return Err(QueueError::InvalidEntry(p.as_ref().to_string()));
            }
            entries.push(QueueEntry::new(trimmed));
        }
        if entries.is_empty() {
            return Ok(());
        }

        let Some(mut file) = self.open_locked(true)? else {
            return Ok(());
        };
        file.seek(SeekFrom::End(0)).map_err(|e| self.io_err(e))?;
        file.write_all(render_entries(&entries).as_bytes()).map_err(|e| self.io_err(e))?;
        file.sync_data().map_err(|e| self.io_err(e))?;
        tracing::debug!("[QUEUE] Appended {} entr(ies) to {:?}", entries.len(), self.path);
        Ok(())
    }

    /// Reads every entry and truncates the file as one locked step.
    pub fn drain(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let Some(mut file) = self.open_locked(false)? else {
            return Ok(Vec::new());
        };
        let entries = self.read_entries(&mut file)?;
        file.set_len(0).map_err(|e| self.io_err(e))?;
        file.sync_data().map_err(|e| self.io_err(e))?;
        Ok(entries)
    }

    /// Puts previously drained entries back ahead of anything appended since.
    pub fn restore_front(&self, entries: &[QueueEntry]) -> Result<(), QueueError> {
        if entries.is_empty() {
            return Ok(());
        }
        let Some(mut file) = self.open_locked(true)? else {
            return Ok(());
        };
        let newer = self.read_entries(&mut file)?;
        let mut combined = entries.to_vec();
        combined.extend(newer);
        self.rewrite(&mut file, &combined)
    }

    /// Current contents without consuming them.
    pub fn snapshot(&self) -> Result<Vec<QueueEntry>, QueueError> {
        match self.open_locked(false)? {
            Some(mut file) => self.read_entries(&mut file),
            None => Ok(Vec::new()),
        }
    }

    /// Cheap emptiness check on file size. Unreadable counts as empty.
    pub fn has_pending(&self) -> bool {
        std::fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false)
    }
}

fn parse_entries(content: &str) -> Vec<QueueEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(QueueEntry::new)
        .collect()
}

fn render_entries(entries: &[QueueEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.path);
        out.push('\n');
    }
    out
}
