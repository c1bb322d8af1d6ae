//! Shared error types and control-channel wire protocol for the sandrun
//! supervisor and anything that talks to it.

pub mod errors;
pub mod protocol;

pub use errors::{SandboxError, SandboxResult};
pub use protocol::{
    CheckpointArgs, CidArgs, ContainerEvent, ControlRequest, ControlResponse, ExecArgs,
    ExecuteResult, FilePayload, Method, NetworkConfig, ProcessInfo, RestoreArgs, RootStartArgs,
    SignalArgs, StacksResult, StartArgs, WaitPidArgs, WaitStatus,
};
