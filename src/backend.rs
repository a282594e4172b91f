//! The file backend: per-level buffered writers behind one lock, plus the
//! periodic flush, rotation and monitor work.
//!
//! All four paths — foreground [`log`](FileBackend::log) and the three
//! background tasks — serialize through a single mutex guarding the writer
//! table and rotation state. There is no finer-grained locking and no nested
//! acquisition, so the paths are mutually exclusive in time and cannot
//! deadlock. A slow disk slows every lock holder; there is deliberately no
//! queue or admission control in front of the lock.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::BackendConfig;
use crate::diagnostics::{DiagnosticSink, Op, StderrSink};
use crate::level::Level;
use crate::rotation::{self, RotationPolicy};
use crate::writer::LevelWriter;

/// Error constructing a [`FileBackend`].
///
/// Construction is the only fallible public surface; every steady-state
/// failure afterward goes to the configured [`DiagnosticSink`] instead.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The log directory could not be created.
    #[error("failed to create log directory {path}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An active log file could not be opened.
    #[error("failed to open log file {path}")]
    OpenFile {
        /// File that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Handle to a leveled, file-based log sink.
///
/// One buffered append-mode file per [`Level`] lives in a single directory.
/// Messages are buffered in memory and flushed by a periodic task (or
/// immediately, for `Fatal`); a rotation task seals the active files into
/// hour-stamped archives and deletes archives past the retention window; a
/// monitor task recreates active files that were rotated or externally
/// removed.
///
/// Cloning is cheap; clones share the same backend. The handle is
/// fire-and-forget: after construction no call returns an error.
#[derive(Clone)]
pub struct FileBackend {
    inner: Arc<Inner>,
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("dir", &self.inner.dir)
            .finish_non_exhaustive()
    }
}

struct Inner {
    dir: PathBuf,
    buffer_size: usize,
    monitor_interval: Duration,
    rotate_check_interval: Duration,
    sink: Arc<dyn DiagnosticSink>,
    now: NowFn,
    state: Mutex<State>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct State {
    writers: [Option<LevelWriter>; Level::COUNT],
    rotation: RotationPolicy,
    flush_interval: Duration,
    closed: bool,
}

impl FileBackend {
    /// Open `dir` (creating it and its parents if needed) with one active log
    /// file per level, and spawn the flush, rotation and monitor tasks.
    ///
    /// Must be called within a tokio runtime. The background tasks run until
    /// [`close`](FileBackend::close); dropping the handle without closing
    /// leaves them running.
    pub fn open(dir: impl AsRef<Path>) -> Result<FileBackend, BackendError> {
        Self::open_with_config(dir, BackendConfig::default())
    }

    /// Like [`open`](FileBackend::open) with explicit tunables.
    pub fn open_with_config(
        dir: impl AsRef<Path>,
        config: BackendConfig,
    ) -> Result<FileBackend, BackendError> {
        Self::open_with_sink(dir, config, Arc::new(StderrSink))
    }

    /// Like [`open_with_config`](FileBackend::open_with_config) with an
    /// injected diagnostic sink.
    pub fn open_with_sink(
        dir: impl AsRef<Path>,
        config: BackendConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<FileBackend, BackendError> {
        let backend = Self::build(dir.as_ref(), config, sink, Arc::new(Utc::now))?;
        backend.spawn_maintenance();
        Ok(backend)
    }

    /// Construct the backend without spawning background tasks.
    ///
    /// Tests drive `tick_*` directly through this.
    fn build(
        dir: &Path,
        config: BackendConfig,
        sink: Arc<dyn DiagnosticSink>,
        now: NowFn,
    ) -> Result<FileBackend, BackendError> {
        fs::create_dir_all(dir).map_err(|source| BackendError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut writers: [Option<LevelWriter>; Level::COUNT] = Default::default();
        for level in Level::ALL {
            let path = dir.join(level.file_name());
            let writer = LevelWriter::open(&path, config.buffer_size)
                .map_err(|source| BackendError::OpenFile { path, source })?;
            writers[level.index()] = Some(writer);
        }

        let rotation = RotationPolicy::new(config.rotate_hourly, config.keep_hours, now());

        Ok(FileBackend {
            inner: Arc::new(Inner {
                dir: dir.to_path_buf(),
                buffer_size: config.buffer_size,
                monitor_interval: config.monitor_interval,
                rotate_check_interval: config.rotate_check_interval,
                sink,
                now,
                state: Mutex::new(State {
                    writers,
                    rotation,
                    flush_interval: config.flush_interval,
                    closed: false,
                }),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    fn spawn_maintenance(&self) {
        let flush = {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                loop {
                    // Re-read each iteration so set_flush_interval takes
                    // effect on the next tick.
                    let period = inner.lock_state().flush_interval;
                    tokio::time::sleep(period).await;
                    inner.tick_flush();
                }
            })
        };
        let monitor = {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(inner.monitor_interval).await;
                    inner.tick_monitor();
                }
            })
        };
        let rotate = {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(inner.rotate_check_interval).await;
                    inner.tick_rotate();
                }
            })
        };
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.extend([flush, monitor, rotate]);
        }
    }

    /// Directory holding the active and archived log files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Append `message` verbatim to `level`'s buffer.
    ///
    /// Fire-and-forget: failures (including logging after close) are reported
    /// to the diagnostic sink, never returned. A `Fatal` message flushes and
    /// syncs every level before returning, so it survives the process dying
    /// right after the call.
    pub fn log(&self, level: Level, message: &[u8]) {
        self.inner.log(level, message);
    }

    /// Cumulative bytes accepted for `level` by the current writer.
    ///
    /// The counter belongs to the writer slot: it restarts when the monitor
    /// replaces a missing file, and reads zero after close.
    pub fn bytes_written(&self, level: Level) -> u64 {
        self.inner.lock_state().writers[level.index()]
            .as_ref()
            .map(LevelWriter::written)
            .unwrap_or(0)
    }

    /// Force all buffered data to durable storage now.
    pub fn flush(&self) {
        self.inner.tick_flush();
    }

    /// Enable or disable hourly rotation.
    ///
    /// `keep_hours` is the retention window for archives; zero or negative
    /// keeps archives forever. Enabling seeds the rotation clock to the
    /// current hour so the call itself does not trigger a rotation.
    pub fn set_rotation(&self, enabled: bool, keep_hours: i64) {
        let now = (self.inner.now)();
        self.inner
            .lock_state()
            .rotation
            .configure(enabled, keep_hours, now);
    }

    /// Change the periodic flush interval; takes effect on the next tick.
    pub fn set_flush_interval(&self, interval: Duration) {
        self.inner.lock_state().flush_interval = interval;
    }

    /// Flush, sync and release every writer, and stop the background tasks.
    ///
    /// Call exactly once, after the last `log`; this is the only way buffered
    /// tails are guaranteed on disk before process exit. Logging afterward
    /// reports a diagnostic and drops the message.
    pub fn close(&self) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        let mut state = self.inner.lock_state();
        state.closed = true;
        for level in Level::ALL {
            if let Some(writer) = state.writers[level.index()].take() {
                let path = writer.path().to_path_buf();
                if let Err(err) = writer.close() {
                    self.inner.sink.report(Op::Close, Some(level), Some(&path), &err);
                }
            }
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves writer state consistent
        // enough to keep logging; recover rather than poison the sink.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, level: Level, message: &[u8]) {
        let mut state = self.lock_state();
        match state.writers[level.index()].as_mut() {
            Some(writer) => {
                if let Err(err) = writer.write(message) {
                    let path = writer.path().to_path_buf();
                    self.sink.report(Op::Write, Some(level), Some(&path), &err);
                }
            }
            None => {
                self.sink
                    .report(Op::Write, Some(level), None, &"backend is closed");
            }
        }
        if level == Level::Fatal {
            self.flush_locked(&mut state);
        }
    }

    fn tick_flush(&self) {
        let mut state = self.lock_state();
        self.flush_locked(&mut state);
    }

    /// Flush and sync every open writer. Callers hold the state lock.
    fn flush_locked(&self, state: &mut State) {
        for level in Level::ALL {
            if let Some(writer) = state.writers[level.index()].as_mut() {
                if let Err(err) = writer.flush() {
                    let path = writer.path().to_path_buf();
                    self.sink.report(Op::Flush, Some(level), Some(&path), &err);
                }
                if let Err(err) = writer.sync() {
                    let path = writer.path().to_path_buf();
                    self.sink.report(Op::Sync, Some(level), Some(&path), &err);
                }
            }
        }
    }

    /// One rotation check: seal active files into the current hour bucket if
    /// an hour boundary has passed, then sweep expired archives.
    ///
    /// Rotation only renames; recreating active files is the monitor's job.
    fn tick_rotate(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if state.closed {
            return;
        }
        let now = (self.now)();
        if let Some(bucket) = state.rotation.due_bucket(now) {
            let suffix = rotation::format_hour_suffix(bucket);
            for level in Level::ALL {
                if state.writers[level.index()].is_none() {
                    continue;
                }
                let active = self.dir.join(level.file_name());
                let archived = self.dir.join(format!("{}.{}", level.file_name(), suffix));
                if let Err(err) = fs::rename(&active, &archived) {
                    self.sink.report(Op::Rename, Some(level), Some(&active), &err);
                }
            }
            // Recorded even if some renames failed; the failures were
            // reported and the next boundary gets a fresh attempt.
            state.rotation.mark_rotated(bucket);
        }
        if state.rotation.sweeps() {
            self.sweep_expired(state, now);
        }
    }

    /// Delete archives that have aged past the retention window.
    fn sweep_expired(&self, state: &State, now: DateTime<Utc>) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.sink.report(Op::ReadDir, None, Some(&self.dir), &err);
                return;
            }
        };
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((level, suffix)) = rotation::match_archive(name) else {
                continue;
            };
            let path = entry.path();
            let Some(sealed) = rotation::parse_hour_suffix(suffix) else {
                self.sink.report(
                    Op::ParseSuffix,
                    Some(level),
                    Some(&path),
                    &"invalid hour-bucket suffix",
                );
                continue;
            };
            if state.rotation.expired(sealed, now) {
                if let Err(err) = fs::remove_file(&path) {
                    self.sink.report(Op::Remove, Some(level), Some(&path), &err);
                }
            }
        }
    }

    /// One monitor pass: recreate the active file for every slot whose
    /// recorded path no longer exists.
    ///
    /// The old writer is closed only after the fresh one is installed, so its
    /// buffered tail flushes into the renamed (or unlinked) file it still has
    /// open.
    fn tick_monitor(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        for level in Level::ALL {
            let path = match state.writers[level.index()].as_ref() {
                Some(writer) => writer.path().to_path_buf(),
                None => continue,
            };
            match fs::metadata(&path) {
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    // Report and retry on the next tick.
                    self.sink.report(Op::Stat, Some(level), Some(&path), &err);
                    continue;
                }
            }
            let fresh = match LevelWriter::open(&path, self.buffer_size) {
                Ok(writer) => writer,
                Err(err) => {
                    self.sink.report(Op::Open, Some(level), Some(&path), &err);
                    continue;
                }
            };
            if let Some(stale) = state.writers[level.index()].replace(fresh) {
                if let Err(err) = stale.close() {
                    self.sink.report(Op::Close, Some(level), Some(&path), &err);
                }
            }
        }
    }
}
