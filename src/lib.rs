//! Logshed - leveled, file-based log sink
//!
//! One buffered append-mode file per severity level (`DEBUG.log` ..
//! `FATAL.log`) in a single directory, with periodic flushing, hourly
//! rotation into `<LEVEL>.log.<YYYYMMDDHH>` archives, retention-based
//! cleanup, and self-healing when an active file disappears out from under
//! its writer.
//!
//! Logging is fire-and-forget: after construction nothing returns an error
//! to the caller. Internal failures are reported once to a
//! [`DiagnosticSink`] and retried implicitly by the next periodic tick.
//!
//! ```no_run
//! use logshed::{FileBackend, Level};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), logshed::BackendError> {
//! let backend = FileBackend::open("/var/log/myapp")?;
//! backend.set_rotation(true, 24 * 7);
//! backend.log(Level::Info, b"service started\n");
//! // ... on shutdown:
//! backend.close();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod level;

mod rotation;
mod writer;

pub use backend::{BackendError, FileBackend};
pub use config::BackendConfig;
pub use diagnostics::{DiagnosticSink, Op, StderrSink};
pub use level::Level;
