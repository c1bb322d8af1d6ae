//! Inputs to [`Create`](crate::handle::SandboxHandle::create): the
//! [`SandboxConfig`] data model of §3.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Platform selector. Determines whether a device FD is donated (C3) and
/// whether the sandbox runs in a new or the current PID namespace (§4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// ptrace-like platform: traces syscalls of the guest process tree, so
    /// the sandbox must share the host's PID namespace.
    Ptrace,
    /// accelerator-like platform (e.g. KVM): requires a `/dev/*` device FD.
    Accelerator,
}

impl Platform {
    /// Whether this platform mandates running in the *current* PID
    /// namespace rather than a fresh one (§4.4.1).
    pub fn requires_current_pid_namespace(&self) -> bool {
        matches!(self, Platform::Ptrace)
    }

    /// Whether this platform needs a kernel device FD donated (C3).
    pub fn needs_device(&self) -> bool {
        matches!(self, Platform::Accelerator)
    }
}

/// Network mode. Drives both the network and user namespace policy of
/// §4.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    None,
    Host,
    SandboxInternal,
}

impl From<NetworkMode> for sandrun_proto::NetworkConfig {
    fn from(mode: NetworkMode) -> Self {
        match mode {
            NetworkMode::None => sandrun_proto::NetworkConfig::None,
            NetworkMode::Host => sandrun_proto::NetworkConfig::Host,
            NetworkMode::SandboxInternal => sandrun_proto::NetworkConfig::SandboxInternal,
        }
    }
}

/// Test-mode opt-outs (§4.4.2). Only meant for tests; production callers
/// must leave these `false` or the corresponding preconditions are enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestModeFlags {
    /// Skip the chroot and run as the current user instead of "nobody".
    #[serde(default)]
    pub allow_run_as_current_user_without_chroot: bool,
}

/// Inputs to Create (§3 `SandboxConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub platform: Platform,
    pub network: NetworkMode,
    /// Log file path; opened append/create/write-only and donated as
    /// `--log-fd`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Debug log directory; a per-boot file is created inside it and
    /// donated as `--debug-log-fd`.
    #[serde(default)]
    pub debug_log_dir: Option<PathBuf>,
    /// OCI runtime spec file (`config.json`). Required.
    pub spec_file: PathBuf,
    /// OCI bundle directory passed as `--bundle`.
    pub bundle_dir: PathBuf,
    /// Path to the supervisor binary to re-exec as the sandbox ("boot").
    /// Defaults to the current executable's path when `None`.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,
    /// Optional console socket path; when set a pty pair is allocated and
    /// the master is sent over this socket (§4.4 step 8).
    #[serde(default)]
    pub console_socket: Option<PathBuf>,
    /// Device file to open and donate for [`Platform::Accelerator`] (§4.3,
    /// §6 "Platform device"). Required when `platform.needs_device()`.
    #[serde(default)]
    pub device_path: Option<PathBuf>,
    #[serde(default)]
    pub test_mode: TestModeFlags,
}

impl SandboxConfig {
    pub fn console_enabled(&self) -> bool {
        self.console_socket.is_some()
    }
}
