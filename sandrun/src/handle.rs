//! Sandbox handle (C6, §4.6): an immutable record (id, pid, chroot) plus
//! methods that open a short-lived control connection per operation and
//! invoke an RPC.
//!
//! [`SandboxHandle::create`] is the supervisor's entry point: it launches
//! the sandbox child (C4), waits for it to become ready (C5), and returns a
//! handle the caller owns. Every other method on the handle opens one
//! control connection (C1), issues one RPC, and closes — none of them keep
//! a connection open across calls, per §4.6 and §9 "per-call short-lived
//! connections".

use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Instant;

use nix::sys::signal::{self, Signal};
use oci_spec::runtime::Spec;

use sandrun_proto::{
    CheckpointArgs, CidArgs, ContainerEvent, ExecArgs, ExecuteResult, Method, ProcessInfo,
    RestoreArgs, RootStartArgs, SandboxError, SandboxResult, SignalArgs, StacksResult, StartArgs,
    WaitPidArgs, WaitStatus,
};

use crate::chroot;
use crate::config::{NetworkMode, SandboxConfig};
use crate::constants::{RETRY_INTERVAL, STOP_TIMEOUT};
use crate::control;
use crate::device;
use crate::launcher;
use crate::readiness;

/// Host-side record of one running (or no-longer-running) sandbox.
///
/// `id` never changes after construction. `pid` and `chroot` use interior
/// mutability only so that [`Destroy`](Self::destroy) can record that the
/// child has been reaped and the chroot reclaimed on the *same* handle the
/// caller already holds, instead of requiring callers to discard it and
/// track a separate "destroyed" flag themselves — see DESIGN.md for the
/// reasoning behind this compared to a strictly field-frozen struct.
#[derive(Debug)]
pub struct SandboxHandle {
    id: String,
    pid: AtomicI32,
    chroot: Mutex<Option<PathBuf>>,
}

impl SandboxHandle {
    /// Create (§2, §4.4): launch the sandbox child with the FD donation
    /// table, namespace set and credentials §4.4 describes, then block
    /// until it is ready (C5) before returning the handle.
    ///
    /// On any failure the partially-created child (if one was spawned) is
    /// killed and no handle is returned, per §7 kinds 2 and 3.
    pub fn create(
        id: impl Into<String>,
        config: &SandboxConfig,
        spec: &Spec,
        io_files: Vec<File>,
    ) -> SandboxResult<Self> {
        let id = id.into();
        let outcome = launcher::launch(&id, config, spec, io_files)?;

        if let Err(e) = readiness::wait_for_created(&id, outcome.pid) {
            kill_best_effort(outcome.pid);
            if let Some(dir) = &outcome.chroot {
                let _ = chroot::teardown(dir);
            }
            return Err(e);
        }

        Ok(Self {
            id,
            pid: AtomicI32::new(outcome.pid),
            chroot: Mutex::new(outcome.chroot),
        })
    }

    /// Rehydrate a handle for a sandbox that a previous `create` call
    /// already launched and recorded elsewhere (e.g. a CLI front end's
    /// on-disk state, since each CLI invocation is a separate process).
    /// Skips launch and readiness entirely — the caller is vouching that
    /// `pid`/`chroot` came from a real prior `create`.
    pub fn attach(id: impl Into<String>, pid: i32, chroot: Option<PathBuf>) -> Self {
        Self {
            id: id.into(),
            pid: AtomicI32::new(pid),
            chroot: Mutex::new(chroot),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> i32 {
        self.pid.load(Ordering::SeqCst)
    }

    pub fn chroot(&self) -> Option<PathBuf> {
        self.chroot.lock().unwrap().clone()
    }

    fn require_running(&self) -> SandboxResult<i32> {
        let pid = self.pid();
        if pid == 0 {
            return Err(SandboxError::not_running(&self.id));
        }
        Ok(pid)
    }

    fn debug_enter(&self, op: &str) {
        tracing::debug!(id = %self.id, pid = self.pid(), op, "sandbox handle operation");
    }

    /// StartRoot (§4.6): configure the root container's network, then
    /// `RootContainerStart`. Runs the first container's argv.
    pub fn start_root(&self, network: NetworkMode) -> SandboxResult<()> {
        self.debug_enter("StartRoot");
        self.require_running()?;
        let payload = RootStartArgs {
            network: network.into(),
        };
        let (_, _): ((), _) = self.rpc(Method::RootContainerStart, payload, &[], 0)?;
        Ok(())
    }

    /// Start (§4.6): `ContainerStart` for a non-root container, donating
    /// `io_files` alongside the request. The parent's copies are closed
    /// when `io_files` is dropped at the end of this call.
    pub fn start(&self, cid: impl Into<String>, io_files: Vec<File>) -> SandboxResult<()> {
        self.debug_enter("Start");
        self.require_running()?;
        let cid = cid.into();
        let fds: Vec<_> = io_files.iter().map(|f| f.as_raw_fd()).collect();
        let payload = StartArgs {
            cid,
            io_fd_count: io_files.len(),
        };
        let (_, _): ((), _) = self.rpc(Method::ContainerStart, payload, &fds, 0)?;
        drop(io_files);
        Ok(())
    }

    /// Restore (§4.6): optionally donate the platform device, configure
    /// network, then `ContainerRestore` — recreates a container from
    /// `state_file`.
    pub fn restore(
        &self,
        cid: impl Into<String>,
        config: &SandboxConfig,
        network: NetworkMode,
        state_file: File,
    ) -> SandboxResult<()> {
        self.debug_enter("Restore");
        self.require_running()?;
        let cid = cid.into();

        let device_file = device::open(config)?;
        let mut fds = vec![state_file.as_raw_fd()];
        if let Some(dev) = &device_file {
            fds.push(dev.as_raw_fd());
        }

        let payload = RestoreArgs {
            cid,
            network: network.into(),
            io_fd_count: fds.len(),
        };
        let (_, _): ((), _) = self.rpc(Method::ContainerRestore, payload, &fds, 0)?;
        drop(state_file);
        drop(device_file);
        Ok(())
    }

    /// Processes (§4.6): `ContainerProcesses`. Returns sandbox-wide process
    /// metadata (see DESIGN.md for the `cid`-filtering open question).
    pub fn processes(&self, cid: impl Into<String>) -> SandboxResult<Vec<ProcessInfo>> {
        self.debug_enter("Processes");
        self.require_running()?;
        let payload = CidArgs { cid: cid.into() };
        let (processes, _) = self.rpc(Method::ContainerProcesses, payload, &[], 0)?;
        Ok(processes)
    }

    /// Execute (§4.6): `ContainerExecuteAsync`. Returns the new pid.
    pub fn execute(
        &self,
        cid: impl Into<String>,
        argv: Vec<String>,
        envv: Vec<String>,
        cwd: impl Into<String>,
    ) -> SandboxResult<i32> {
        self.debug_enter("Execute");
        self.require_running()?;
        let payload = ExecArgs {
            cid: cid.into(),
            argv,
            envv,
            cwd: cwd.into(),
        };
        let (result, _): (ExecuteResult, _) =
            self.rpc(Method::ContainerExecuteAsync, payload, &[], 0)?;
        Ok(result.pid)
    }

    /// Event (§4.6): `ContainerEvent`. Returns CPU/memory stats.
    pub fn event(&self, cid: impl Into<String>) -> SandboxResult<ContainerEvent> {
        self.debug_enter("Event");
        self.require_running()?;
        let payload = CidArgs { cid: cid.into() };
        let (event, _) = self.rpc(Method::ContainerEvent, payload, &[], 0)?;
        Ok(event)
    }

    /// Wait (§4.6): `ContainerWait`. Blocks until the container exits.
    pub fn wait(&self, cid: impl Into<String>) -> SandboxResult<WaitStatus> {
        self.debug_enter("Wait");
        self.require_running()?;
        let payload = CidArgs { cid: cid.into() };
        let (status, _) = self.rpc(Method::ContainerWait, payload, &[], 0)?;
        Ok(status)
    }

    /// WaitPID (§4.6): `ContainerWaitPID`. `clear_status` controls whether
    /// the sandbox reaps the zombie once the status has been reported.
    pub fn wait_pid(
        &self,
        cid: impl Into<String>,
        pid: i32,
        clear_status: bool,
    ) -> SandboxResult<WaitStatus> {
        self.debug_enter("WaitPID");
        self.require_running()?;
        let payload = WaitPidArgs {
            cid: cid.into(),
            pid,
            clear_status,
        };
        let (status, _) = self.rpc(Method::ContainerWaitPID, payload, &[], 0)?;
        Ok(status)
    }

    /// Signal (§4.6): `ContainerSignal`, best-effort delivery.
    pub fn signal(&self, cid: impl Into<String>, signo: i32) -> SandboxResult<()> {
        self.debug_enter("Signal");
        self.require_running()?;
        let payload = SignalArgs {
            cid: cid.into(),
            signo,
        };
        let (_, _): ((), _) = self.rpc(Method::ContainerSignal, payload, &[], 0)?;
        Ok(())
    }

    /// Checkpoint (§4.6): donates `out_file`, then `ContainerCheckpoint`.
    /// `out_file` is owned by the sandbox for the duration of the call.
    pub fn checkpoint(&self, cid: impl Into<String>, out_file: File) -> SandboxResult<()> {
        self.debug_enter("Checkpoint");
        self.require_running()?;
        let fd = out_file.as_raw_fd();
        let payload = CheckpointArgs { cid: cid.into() };
        let (_, _): ((), _) = self.rpc(Method::ContainerCheckpoint, payload, &[fd], 0)?;
        drop(out_file);
        Ok(())
    }

    /// Pause (§4.6): `ContainerPause`, suspends guest execution.
    pub fn pause(&self, cid: impl Into<String>) -> SandboxResult<()> {
        self.debug_enter("Pause");
        self.require_running()?;
        let payload = CidArgs { cid: cid.into() };
        let (_, _): ((), _) = self.rpc(Method::ContainerPause, payload, &[], 0)?;
        Ok(())
    }

    /// Resume (§4.6): `ContainerResume`, resumes guest execution.
    pub fn resume(&self, cid: impl Into<String>) -> SandboxResult<()> {
        self.debug_enter("Resume");
        self.require_running()?;
        let payload = CidArgs { cid: cid.into() };
        let (_, _): ((), _) = self.rpc(Method::ContainerResume, payload, &[], 0)?;
        Ok(())
    }

    /// Stacks (§4.6): `SandboxStacks`. Returns a textual stack dump.
    pub fn stacks(&self) -> SandboxResult<String> {
        self.debug_enter("Stacks");
        self.require_running()?;
        let (result, _): (StacksResult, _) = self.rpc(Method::SandboxStacks, (), &[], 0)?;
        Ok(result.dump)
    }

    /// IsRunning (§4.6): `true` iff the child is alive from the host's
    /// point of view (`kill(pid, 0)`), not whether the guest considers
    /// itself ready.
    pub fn is_running(&self) -> bool {
        let pid = self.pid();
        pid != 0 && readiness::is_alive(pid)
    }

    /// IsRootContainer (§4.6, §8): pure string comparison, no RPC.
    pub fn is_root_container(&self, cid: &str) -> bool {
        cid == self.id
    }

    /// Destroy (§4.6, §7 kind 5, §8 "Idempotent destroy"): kill the child,
    /// wait (bounded) for it to exit, then tear down the chroot. Safe to
    /// call repeatedly; a sandbox that has already exited is success, not
    /// an error.
    pub fn destroy(&self) -> SandboxResult<()> {
        self.debug_enter("Destroy");
        let pid = self.pid();

        if pid != 0 {
            match signal::kill(nix::unistd::Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(nix::Error::ESRCH) => {}
                Err(e) => {
                    return Err(SandboxError::internal(format!(
                        "failed to signal sandbox {} (pid {pid}): {e}",
                        self.id
                    )));
                }
            }
            self.wait_for_stopped(pid);
            self.pid.store(0, Ordering::SeqCst);
        }

        if let Some(dir) = self.chroot.lock().unwrap().take() {
            chroot::teardown(&dir)?;
        }

        tracing::info!(id = %self.id, "sandbox destroyed");
        Ok(())
    }

    /// Bounded, constant-interval backoff waiting for `pid` to stop being
    /// alive (§5 "the backoff in Destroy runs in a bounded time window...
    /// using a constant-interval retry"). Gives up silently after
    /// `STOP_TIMEOUT`; the sandbox is presumed gone either way since the
    /// kill above already succeeded or found no such process.
    fn wait_for_stopped(&self, pid: i32) {
        let deadline = Instant::now() + STOP_TIMEOUT;
        while readiness::is_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    fn rpc<Req, Resp>(
        &self,
        method: Method,
        payload: Req,
        send_fds: &[std::os::fd::RawFd],
        expected_recv_fds: usize,
    ) -> SandboxResult<(Resp, Vec<std::os::fd::OwnedFd>)>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        control::call(&self.id, method, payload, send_fds, expected_recv_fds).map_err(|e| {
            if let SandboxError::Rpc {
                id, method, reason, ..
            } = e
            {
                SandboxError::rpc(id, self.pid(), method, reason)
            } else {
                e
            }
        })
    }
}

/// Used when readiness fails after a successful spawn (§7 kind 3): the
/// partially-created child is killed before the error is surfaced.
fn kill_best_effort(pid: i32) {
    let _ = signal::kill(nix::unistd::Pid::from_raw(pid), Signal::SIGKILL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn handle_with(pid: i32, chroot: Option<PathBuf>) -> SandboxHandle {
        SandboxHandle {
            id: "test-sandbox".to_string(),
            pid: AtomicI32::new(pid),
            chroot: Mutex::new(chroot),
        }
    }

    #[test]
    fn is_root_container_compares_against_handle_id() {
        let handle = handle_with(0, None);
        assert!(handle.is_root_container("test-sandbox"));
        assert!(!handle.is_root_container("some-other-cid"));
    }

    #[test]
    fn not_running_operations_fail_without_rpc() {
        let handle = handle_with(0, None);
        let err = handle.signal("c1", 15).unwrap_err();
        assert!(matches!(err, SandboxError::NotRunning { .. }));
    }

    #[test]
    fn is_running_is_false_with_pid_zero() {
        let handle = handle_with(0, None);
        assert!(!handle.is_running());
    }

    #[test]
    fn destroy_not_running_tears_down_chroot_without_killing() {
        let scratch = tempdir().unwrap();
        let dir = scratch.path().join("chroot");
        fs::create_dir_all(&dir).unwrap();

        let handle = handle_with(0, Some(dir.clone()));
        handle.destroy().expect("destroy should succeed");
        assert!(!dir.exists());
    }

    #[test]
    fn destroy_is_idempotent() {
        let scratch = tempdir().unwrap();
        let dir = scratch.path().join("chroot");
        fs::create_dir_all(&dir).unwrap();
        assert!(dir.exists());

        let handle = handle_with(0, Some(dir.clone()));
        handle.destroy().expect("first destroy should succeed");
        assert!(!dir.exists());
        handle.destroy().expect("second destroy should still succeed");
        assert!(!dir.exists());
    }

    #[test]
    fn destroy_on_a_dead_pid_reports_success() {
        // An implausibly high pid that cannot exist: kill(2) returns ESRCH,
        // which §7 kind 5 treats as success rather than an error.
        let handle = handle_with(i32::MAX - 1, None);
        handle.destroy().expect("ESRCH should be treated as success");
        assert_eq!(handle.pid(), 0);
    }
}
