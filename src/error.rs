use std::io;

use thiserror::Error;

/// Error type for daemon_warden.
/// Provides specific details about why an operation failed.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A single configuration problem (bad app name, no log destination, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Accumulated option-validation failures, collected so the whole
    /// list can be logged before startup aborts.
    #[error("required options are not set: {}", .0.join("; "))]
    InvalidOptions(Vec<String>),

    /// Standard IO errors (pid file, log file, directory creation).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A system call failed (fork, setsid, kill, chown).
    #[error("syscall '{call}' failed with errno {errno}")]
    Syscall { call: &'static str, errno: i32 },

    /// Failed to change identity (user/group not found or permission denied).
    #[error("privilege change failed: {0}")]
    Privilege(String),

    /// Installing a signal handler with the OS failed.
    #[error("signal setup failed: {0}")]
    Signal(String),
}

/// A specialized Result type for daemon_warden operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
