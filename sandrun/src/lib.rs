//! `sandrun`: host-side supervisor that launches, manages and tears down an
//! isolated sandbox process hosting one or more containerized workloads.
//!
//! The crate is organized around the components of the bootstrap and
//! control protocol:
//!
//! - [`config`] / [`constants`] — the data model inputs to [`handle::SandboxHandle::create`].
//! - [`control`] — the one-shot control channel (C1).
//! - [`chroot`] — the chroot builder (C2).
//! - [`device`] — the platform device opener (C3).
//! - [`launcher`] — the process launcher (C4): FD donation, namespaces,
//!   credentials and the pre-exec hook.
//! - [`readiness`] — the readiness waiter (C5).
//! - [`handle`] — the sandbox handle (C6) and its container-lifecycle operations.
//! - [`reno`] — the illustrative guest-side TCP Reno fast-recovery state machine (C7).

pub mod chroot;
pub mod config;
pub mod constants;
pub mod control;
pub mod device;
pub mod handle;
pub mod launcher;
pub mod readiness;
pub mod reno;

pub use config::{NetworkMode, Platform, SandboxConfig, TestModeFlags};
pub use handle::SandboxHandle;
pub use reno::{AckOutcome, AckSegment, CongestionState, FastRecoveryState, RenoRecovery};

pub use sandrun_proto::{
    CheckpointArgs, CidArgs, ContainerEvent, ExecArgs, ExecuteResult, Method, NetworkConfig,
    ProcessInfo, RestoreArgs, RootStartArgs, SandboxError, SandboxResult, SignalArgs,
    StacksResult, StartArgs, WaitPidArgs, WaitStatus,
};
