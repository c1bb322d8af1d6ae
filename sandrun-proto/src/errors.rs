//! Error kinds for the sandbox supervisor.
//!
//! Mirrors the five failure kinds of the bootstrap/control protocol:
//! precondition, spawn, readiness, RPC, and destroy races (the last of
//! which is folded into success rather than represented here).

use std::path::PathBuf;

use thiserror::Error;

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// A capability or input required before any child is spawned is missing.
    #[error("precondition failed for sandbox {id}: {reason}")]
    Precondition { id: String, reason: String },

    /// The child could not be spawned: donated file could not be opened,
    /// a namespace could not be entered, or exec failed.
    #[error("failed to spawn sandbox {id}: {reason}")]
    Spawn { id: String, reason: String },

    /// The child never reached a ready state within the allotted time,
    /// or died before the control socket accepted a connection.
    #[error("sandbox {id} did not become ready: {reason}")]
    Readiness { id: String, reason: String },

    /// A control-channel RPC failed: connection refused, transport error,
    /// or the sandbox returned an error string.
    #[error("rpc {method} failed for sandbox {id} (pid {pid}): {reason}")]
    Rpc {
        id: String,
        pid: i32,
        method: String,
        reason: String,
    },

    /// The requested sandbox or container could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation requires a live sandbox, but the handle's `pid` is 0
    /// (not yet started, or already reaped by `Destroy`) — §3's handle
    /// invariant.
    #[error("sandbox {id} is not running")]
    NotRunning { id: String },

    /// An I/O error occurred outside the spawn path (chroot teardown,
    /// archive handling, config loading).
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Anything else; always carries a human-readable cause.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    pub fn precondition(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Precondition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn readiness(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Readiness {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_running(id: impl Into<String>) -> Self {
        Self::NotRunning { id: id.into() }
    }

    pub fn rpc(id: impl Into<String>, pid: i32, method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rpc {
            id: id.into(),
            pid,
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}
