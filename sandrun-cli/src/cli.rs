//! Global flag groups shared across subcommands (§10.3: "flattened
//! `clap::Args` groups for global, resource, and process flags").

use std::path::PathBuf;

use clap::{Args, ValueEnum};

/// Flags that apply regardless of which subcommand is running.
#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Directory holding per-sandbox state (id -> pid/chroot records).
    /// Defaults to `/run/sandrun`, mirroring this family of runtimes'
    /// default root.
    #[arg(long, global = true, env = "SANDRUN_HOME")]
    pub home: Option<PathBuf>,

    /// Tracing filter, e.g. `info` or `sandrun=debug,sandrun_cli=trace`.
    #[arg(long, global = true, default_value = "info", env = "SANDRUN_LOG")]
    pub log_level: String,
}

impl GlobalFlags {
    pub fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .unwrap_or_else(|| PathBuf::from("/run/sandrun"))
    }
}

/// Resource flags reserved for future cgroup wiring. cgroup *enforcement*
/// is a non-goal of this supervisor, but the flag-parsing surface can
/// exist ahead of it without a breaking CLI change later.
#[derive(Args, Debug, Clone, Default)]
pub struct ResourceFlags {
    #[arg(long)]
    pub cpu_shares: Option<u64>,
    #[arg(long)]
    pub memory_limit_bytes: Option<u64>,
}

/// Flags describing how a process's stdio should be wired up.
#[derive(Args, Debug, Clone, Default)]
pub struct ProcessFlags {
    /// Allocate a pty and use it as the process's stdio.
    #[arg(short = 't', long)]
    pub tty: bool,
    /// Keep stdin open even when not attached to a terminal.
    #[arg(short = 'i', long)]
    pub interactive: bool,
    /// Run in the background; don't wait for completion.
    #[arg(short = 'd', long)]
    pub detach: bool,
}

/// CLI-facing mirror of [`sandrun::Platform`] (§3 "platform selector").
/// `clap::ValueEnum` can't be derived on the library type directly without
/// pulling a CLI dependency into `sandrun`, so the flag surface gets its
/// own copy and a conversion.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformArg {
    Ptrace,
    Accelerator,
}

impl From<PlatformArg> for sandrun::Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Ptrace => sandrun::Platform::Ptrace,
            PlatformArg::Accelerator => sandrun::Platform::Accelerator,
        }
    }
}

/// CLI-facing mirror of [`sandrun::NetworkMode`] (§3 "network mode").
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkArg {
    #[default]
    None,
    Host,
    SandboxInternal,
}

impl From<NetworkArg> for sandrun::NetworkMode {
    fn from(value: NetworkArg) -> Self {
        match value {
            NetworkArg::None => sandrun::NetworkMode::None,
            NetworkArg::Host => sandrun::NetworkMode::Host,
            NetworkArg::SandboxInternal => sandrun::NetworkMode::SandboxInternal,
        }
    }
}
