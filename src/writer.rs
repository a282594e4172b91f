//! Buffered append-mode writer for one active log file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One open log file wrapped in a sized in-memory buffer.
///
/// Bytes accumulate in the buffer and only reach the OS when the buffer fills
/// or [`flush`](LevelWriter::flush) runs; [`sync`](LevelWriter::sync) forces
/// them onward to stable storage. The writer records the path it was opened
/// at; rotation renames the file on disk underneath it, and the recorded path
/// keeps pointing at the active name so the monitor can heal the slot.
pub(crate) struct LevelWriter {
    buf: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl LevelWriter {
    /// Open (create-if-absent, append-mode) the file at `path`.
    pub fn open(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            buf: BufWriter::with_capacity(buffer_size, file),
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Path this writer was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cumulative bytes accepted by [`write`](LevelWriter::write).
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append `bytes` to the buffer.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Push buffered bytes to the OS.
    pub fn flush(&mut self) -> io::Result<()> {
        self.buf.flush()
    }

    /// Force written bytes to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        self.buf.get_ref().sync_all()
    }

    /// Flush and sync, then release the handle.
    ///
    /// The handle is released regardless of the outcome; the first flush or
    /// sync error is returned so the caller can report it.
    pub fn close(mut self) -> io::Result<()> {
        let flushed = self.buf.flush();
        let synced = self.buf.get_ref().sync_all();
        flushed.and(synced)
    }
}
