//! Utility functions shared across commands

use std::fs::File;
use std::os::unix::net::UnixStream;
use std::path::Path;

use sandrun::WaitStatus;

/// Connect to each gofer/io socket path in order and hand back the
/// connections as plain [`File`]s, ready to be donated via
/// [`sandrun::SandboxHandle::create`]/`start`/`restore` (§3 "FD donation
/// table", role `io`). The CLI's own copy is closed by the callee once the
/// donating RPC has been sent, matching §3's single-ownership policy.
pub fn connect_io_sockets(paths: &[impl AsRef<Path>]) -> anyhow::Result<Vec<File>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let stream = UnixStream::connect(path)
                .map_err(|e| anyhow::anyhow!("connecting to io socket {}: {e}", path.display()))?;
            Ok(File::from(std::os::fd::OwnedFd::from(stream)))
        })
        .collect()
}

/// Convert a sandbox [`WaitStatus`] (§6 "Exit status propagation") to a
/// shell-convention exit code: `128 + signal` for signal termination,
/// the raw exit status otherwise.
///
/// # Examples
///
/// ```
/// # use sandrun::WaitStatus;
/// # use sandrun_cli::util::to_shell_exit_code;
/// assert_eq!(to_shell_exit_code(&WaitStatus { exit_status: 0, signaled: false, signal: 0 }), 0);
/// assert_eq!(to_shell_exit_code(&WaitStatus { exit_status: 0, signaled: true, signal: 9 }), 137);
/// ```
pub fn to_shell_exit_code(status: &WaitStatus) -> i32 {
    if status.signaled {
        128 + status.signal
    } else {
        status.exit_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn connect_io_sockets_connects_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("io.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let accepted = std::thread::spawn(move || listener.accept().unwrap());
        let files = connect_io_sockets(&[&path]).unwrap();
        accepted.join().unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn connect_io_sockets_missing_socket_is_an_error() {
        let result = connect_io_sockets(&["/nonexistent/sandrun-io.sock"]);
        assert!(result.is_err());
    }

    fn exited(code: i32) -> WaitStatus {
        WaitStatus {
            exit_status: code,
            signaled: false,
            signal: 0,
        }
    }

    fn signaled(signal: i32) -> WaitStatus {
        WaitStatus {
            exit_status: 0,
            signaled: true,
            signal,
        }
    }

    #[test]
    fn test_to_shell_exit_code_success() {
        assert_eq!(to_shell_exit_code(&exited(0)), 0);
    }

    #[test]
    fn test_to_shell_exit_code_normal_failure() {
        assert_eq!(to_shell_exit_code(&exited(1)), 1);
        assert_eq!(to_shell_exit_code(&exited(127)), 127);
    }

    #[test]
    fn test_to_shell_exit_code_signal_termination() {
        assert_eq!(to_shell_exit_code(&signaled(9)), 137);
        assert_eq!(to_shell_exit_code(&signaled(15)), 143);
        assert_eq!(to_shell_exit_code(&signaled(2)), 130);
    }
}
