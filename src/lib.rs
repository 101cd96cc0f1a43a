//! # daemon_warden
//!
//! **daemon_warden** turns an arbitrary long-running process into a
//! supervised UNIX daemon: it forks into the background, records a pid
//! file, installs POSIX signal handlers, drops privileges to a target
//! UID/GID, and routes every diagnostic through a structured logging
//! pipeline with runtime `{variable}` substitution.
//!
//! The daemon is configured through a flat key/value map validated
//! against a static option schema, and controlled through
//! `start`/`stop`/`restart` plus an `is_running` liveness check backed
//! by the pid file.

mod daemon;
mod error;
mod log;
mod options;
mod pidfile;
mod signals;
mod stdio;
mod sys;
mod types;

// Re-export public types to keep the API flat
pub use daemon::{DaemonState, WardenDaemon};
pub use error::{DaemonError, DaemonResult};
pub use log::{LogArg, LogBackend, LogHandler, LogLevel};
pub use options::OptionValue;
pub use signals::{SigAction, SignalRef};
pub use stdio::Stdio;
pub use types::{Group, User};
