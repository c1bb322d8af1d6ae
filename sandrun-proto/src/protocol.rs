//! Wire protocol for the supervisor <-> sandbox control channel (C1).
//!
//! Each control-channel exchange is one request and one response over a
//! short-lived stream connection. A frame is a 4-byte big-endian length
//! prefix followed by a JSON-encoded envelope. JSON is used rather than a
//! binary framing because these payloads are small, occasionally inspected
//! by hand, and exchanged with a peer (the sandbox's own control server)
//! whose schemas are otherwise opaque to the supervisor.
//!
//! File descriptors never appear in the JSON payload itself — they ride as
//! ancillary data (SCM_RIGHTS) on the same `sendmsg`/`recvmsg` call that
//! carries the frame bytes. [`FilePayload`] only records how many FDs
//! accompany a message, mirroring the sandbox's own `urpc.FilePayload`.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::errors::{SandboxError, SandboxResult};

/// Maximum frame size accepted on the control channel. Guards against a
/// misbehaving peer claiming an absurd length prefix.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// The enumerated set of control-channel RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    RootContainerStart,
    ContainerStart,
    ContainerRestore,
    ContainerProcesses,
    ContainerExecuteAsync,
    ContainerEvent,
    ContainerWaitForLoader,
    ContainerWait,
    ContainerWaitPID,
    ContainerSignal,
    ContainerCheckpoint,
    ContainerPause,
    ContainerResume,
    SandboxStacks,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::RootContainerStart => "RootContainerStart",
            Method::ContainerStart => "ContainerStart",
            Method::ContainerRestore => "ContainerRestore",
            Method::ContainerProcesses => "ContainerProcesses",
            Method::ContainerExecuteAsync => "ContainerExecuteAsync",
            Method::ContainerEvent => "ContainerEvent",
            Method::ContainerWaitForLoader => "ContainerWaitForLoader",
            Method::ContainerWait => "ContainerWait",
            Method::ContainerWaitPID => "ContainerWaitPID",
            Method::ContainerSignal => "ContainerSignal",
            Method::ContainerCheckpoint => "ContainerCheckpoint",
            Method::ContainerPause => "ContainerPause",
            Method::ContainerResume => "ContainerResume",
            Method::SandboxStacks => "SandboxStacks",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records how many donated FDs ride alongside a request or response.
/// The FDs themselves travel out of band as SCM_RIGHTS ancillary data.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilePayload {
    pub fd_count: usize,
}

/// A control-channel request: method name, opaque payload, and a count of
/// FDs the caller is donating alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub method: Method,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub files: FilePayload,
}

impl ControlRequest {
    pub fn new(method: Method, payload: impl Serialize) -> SandboxResult<Self> {
        Ok(Self {
            method,
            payload: serde_json::to_value(payload)
                .map_err(|e| SandboxError::Internal(format!("encoding request payload: {e}")))?,
            files: FilePayload::default(),
        })
    }

    pub fn with_files(mut self, fd_count: usize) -> Self {
        self.files = FilePayload { fd_count };
        self
    }
}

/// A control-channel response: success/error plus an opaque payload and a
/// count of FDs the sandbox is returning alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub files: FilePayload,
}

impl ControlResponse {
    pub fn ok(payload: impl Serialize) -> SandboxResult<Self> {
        Ok(Self {
            ok: true,
            payload: serde_json::to_value(payload)
                .map_err(|e| SandboxError::Internal(format!("encoding response payload: {e}")))?,
            error: None,
            files: FilePayload::default(),
        })
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
            files: FilePayload::default(),
        }
    }

    /// Decode the payload into `T`, turning a remote error into
    /// [`SandboxError::Internal`] (callers typically re-wrap with RPC
    /// context, which needs the sandbox id/pid not known to this layer).
    pub fn into_payload<T: for<'de> Deserialize<'de>>(self) -> SandboxResult<T> {
        if !self.ok {
            return Err(SandboxError::Internal(
                self.error.unwrap_or_else(|| "remote error".to_string()),
            ));
        }
        serde_json::from_value(self.payload)
            .map_err(|e| SandboxError::Internal(format!("decoding response payload: {e}")))
    }
}

/// Write one length-prefixed JSON frame to `w`.
pub fn write_frame<W: Write, T: Serialize>(mut w: W, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    w.write_all(&(bytes.len() as u32).to_be_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

/// Read one length-prefixed JSON frame from `r`.
pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(mut r: R) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// --- Typed payloads for individual RPCs ---

/// Arguments for `ContainerStart`/`ContainerRestore`: container id plus the
/// number of io FDs donated alongside (the FDs themselves are out of band).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartArgs {
    pub cid: String,
    pub io_fd_count: usize,
}

/// Arguments for `ContainerWaitPID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitPidArgs {
    pub cid: String,
    pub pid: i32,
    pub clear_status: bool,
}

/// Arguments for `ContainerSignal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalArgs {
    pub cid: String,
    pub signo: i32,
}

/// Arguments for `ContainerExecuteAsync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecArgs {
    pub cid: String,
    pub argv: Vec<String>,
    pub envv: Vec<String>,
    pub cwd: String,
}

/// Process metadata returned by `ContainerProcesses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub ppid: i32,
    pub command: String,
}

/// CPU/memory stats returned by `ContainerEvent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerEvent {
    pub cpu_nanos: u64,
    pub memory_bytes: u64,
}

/// The standard OS wait-status word, decoded by the sandbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStatus {
    pub exit_status: i32,
    pub signaled: bool,
    pub signal: i32,
}

/// Wire form of [`crate::config`]'s network mode (kept independent of the
/// `sandrun` crate so this crate has no dependency back on it). Carried
/// alongside `RootContainerStart`/`ContainerRestore` so the sandbox knows
/// how to wire up the container's networking before it runs (§4.6
/// StartRoot/Restore rows: "configure network, then ...").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkConfig {
    None,
    Host,
    SandboxInternal,
}

/// Arguments for `RootContainerStart`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RootStartArgs {
    pub network: NetworkConfig,
}

/// Arguments for `ContainerRestore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreArgs {
    pub cid: String,
    pub network: NetworkConfig,
    pub io_fd_count: usize,
}

/// Arguments for `ContainerCheckpoint`; the destination file rides as a
/// donated FD alongside this payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointArgs {
    pub cid: String,
}

/// Arguments shared by `ContainerProcesses`, `ContainerEvent`,
/// `ContainerPause`, `ContainerResume` and `ContainerWait`: a container id
/// that, per the open question recorded in this crate's design ledger, is
/// accepted for wire-shape future-proofing but does not yet filter the
/// (sandbox-wide) response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CidArgs {
    pub cid: String,
}

/// Result of `ContainerExecuteAsync`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub pid: i32,
}

/// Result of `SandboxStacks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacksResult {
    pub dump: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let req = ControlRequest::new(
            Method::ContainerSignal,
            SignalArgs {
                cid: "c1".into(),
                signo: 15,
            },
        )
        .unwrap();

        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();

        let decoded: ControlRequest = read_frame(&buf[..]).unwrap();
        assert_eq!(decoded.method, Method::ContainerSignal);
        let args: SignalArgs = serde_json::from_value(decoded.payload).unwrap();
        assert_eq!(args.cid, "c1");
        assert_eq!(args.signo, 15);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let result: io::Result<serde_json::Value> = read_frame(&buf[..]);
        assert!(result.is_err());
    }

    #[test]
    fn response_err_roundtrip() {
        let resp = ControlResponse::err("sandbox refused connection");
        let decoded: SandboxResult<serde_json::Value> = resp.into_payload();
        assert!(decoded.is_err());
    }
}
