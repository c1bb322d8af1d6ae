//! Readiness waiter (C5, §4.5): poll for the sandbox's control socket to
//! accept connections, then block on a `ContainerWaitForLoader` RPC.

use std::time::Instant;

use nix::sys::signal;
use nix::unistd::Pid;

use sandrun_proto::{Method, SandboxError, SandboxResult};

use crate::constants::{READY_TIMEOUT, RETRY_INTERVAL};
use crate::control;

/// `true` iff `pid` is still alive from the host's point of view, checked
/// with `kill(pid, 0)` (§4.6 `IsRunning`, reused here so a dead child
/// aborts the readiness wait immediately rather than waiting out the full
/// timeout — §10.5, grounded on `waitForCreated`'s liveness re-check).
pub(crate) fn is_alive(pid: i32) -> bool {
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // Process exists but we lack permission to signal it: still alive.
        Err(nix::Error::EPERM) => true,
        Err(_) => false,
    }
}

/// Block until `id`'s control socket accepts a connection, or `pid` dies,
/// or `READY_TIMEOUT` elapses — then issue `ContainerWaitForLoader` and
/// return once it completes.
pub fn wait_for_created(id: &str, pid: i32) -> SandboxResult<()> {
    let deadline = Instant::now() + READY_TIMEOUT;

    loop {
        if !is_alive(pid) {
            return Err(SandboxError::readiness(
                id,
                format!("sandbox process {pid} exited before becoming ready"),
            ));
        }

        match control::try_connect(id) {
            Ok(_) => break,
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(SandboxError::readiness(
                    id,
                    format!("timed out waiting for control socket: {e}"),
                ));
            }
        }
    }

    let (_, _fds): ((), _) = control::call(id, Method::ContainerWaitForLoader, (), &[], 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_alive_is_true_for_current_process() {
        assert!(is_alive(std::process::id() as i32));
    }

    #[test]
    fn is_alive_is_false_for_a_pid_that_cannot_exist() {
        // PID 1 always exists on a real system so pick an implausibly high
        // value instead, which kill(2) reports ESRCH for.
        assert!(!is_alive(i32::MAX - 1));
    }

    #[test]
    fn wait_for_created_aborts_immediately_on_a_dead_child() {
        let result = wait_for_created("sandrun-test-readiness", i32::MAX - 1);
        assert!(result.is_err());
    }
}
