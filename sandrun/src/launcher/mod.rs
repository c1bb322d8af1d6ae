//! Process launcher (C4, §4.4): builds the argument vector, FD donation
//! table, namespace set, credential map and chroot, then enters the
//! requested namespaces and execs the sandbox binary.

pub mod credentials;
pub mod fd;
pub mod namespaces;
pub mod pre_exec;

use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use nix::sys::socket::{self, ControlMessage, MsgFlags};
use nix::sys::uio::IoSlice;
use oci_spec::runtime::Spec;

use sandrun_proto::SandboxError;
use sandrun_proto::SandboxResult;

use crate::chroot;
use crate::config::SandboxConfig;
use crate::control;
use crate::device;
use fd::{FdRole, FdTable};
use namespaces::{NamespacePlan, UserNsPolicy};

/// Result of a successful launch: the child's pid and the chroot directory,
/// if one was built — both go straight onto the resulting
/// [`SandboxHandle`](crate::handle::SandboxHandle).
pub struct LaunchOutcome {
    pub pid: i32,
    pub chroot: Option<PathBuf>,
}

/// Launch the sandbox process for `id` per §4.4's numbered steps.
///
/// `io_files` are gofer/io socket endpoints the caller has already opened;
/// each is donated under [`FdRole::Io`] in the order given.
pub fn launch(
    id: &str,
    config: &SandboxConfig,
    spec: &Spec,
    io_files: Vec<File>,
) -> SandboxResult<LaunchOutcome> {
    // Step 1: resolve the supervisor binary.
    let binary_path = match &config.binary_path {
        Some(path) => path.clone(),
        None => std::env::current_exe().map_err(|e| SandboxError::spawn(id, e.to_string()))?,
    };

    // Steps 10-11 data: namespace set and credential policy.
    let plan = namespaces::build_plan(config, spec);
    check_preconditions(id, config, &plan)?;

    // Step 12: build the chroot, if this run calls for one.
    let chroot_dir = maybe_build_chroot(id, config, &plan, &binary_path)?;

    let mut table = FdTable::new();

    // Step 2: pre-command flags (parent's view: log/debug-log).
    if let Some(log_path) = &config.log_file {
        let file = open_append(log_path).map_err(|e| SandboxError::io(log_path, e))?;
        table.push(FdRole::Log, file);
    }
    if let Some(debug_dir) = &config.debug_log_dir {
        std::fs::create_dir_all(debug_dir).map_err(|e| SandboxError::io(debug_dir, e))?;
        let path = debug_dir.join(format!("boot.{id}.log"));
        let file = open_append(&path).map_err(|e| SandboxError::io(&path, e))?;
        table.push(FdRole::DebugLog, file);
    }

    // Step 4: controller FD (listening control socket).
    let listener = control::bind_listener(id)?;
    let controller_file: File = File::from(OwnedFd::from(listener));
    table.push(FdRole::Controller, controller_file);

    // Step 5: spec file, read-only.
    let spec_file = File::open(&config.spec_file).map_err(|e| SandboxError::io(&config.spec_file, e))?;
    table.push(FdRole::Spec, spec_file);

    // Step 6: gofer/io endpoints, in the order supplied.
    for file in io_files {
        table.push(FdRole::Io, file);
    }

    // Step 7: platform device, if required.
    if let Some(device_file) = device::open(config)? {
        table.push(FdRole::Device, device_file);
    }

    // Step 3: assemble the argv around the donated-FD flags.
    let mut args: Vec<String> = table.pre_command_flags().map(str::to_string).collect();
    args.push("boot".to_string());
    args.push(format!("--bundle={}", config.bundle_dir.display()));
    args.push(format!("--console={}", config.console_enabled()));
    args.extend(table.post_command_flags().map(str::to_string));
    if plan.apply_caps() {
        args.push("--apply-caps=true".to_string());
    }

    // Step 12 (cont'd): once chrooted, the child execs its in-chroot path.
    let program = match &chroot_dir {
        Some(_) => PathBuf::from(chroot::IN_CHROOT_BINARY_PATH),
        None => binary_path,
    };

    let mut cmd = Command::new(&program);
    cmd.args(&args);
    cmd.current_dir(&config.bundle_dir);

    // Step 8: console handling, or default stdio.
    if let Some(console_socket) = &config.console_socket {
        setup_console(id, &mut cmd, console_socket)?;
    } else {
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
    }

    table.install(&mut cmd);

    // Steps 9, 10, 11, 13: session leader, namespace entry, credential
    // mapping, chroot — all inside the async-signal-safe pre-exec hook.
    pre_exec::install(&mut cmd, plan, chroot_dir.clone(), table.next_fd())
        .map_err(|e| SandboxError::spawn(id, e.to_string()))?;

    let mut child = cmd.spawn().map_err(|e| SandboxError::spawn(id, e.to_string()))?;
    let pid = child.id() as i32;

    // §3: the parent closes its copies of donated FDs immediately after
    // spawn; std::process::Child drops its stdio handles on `into()`/drop,
    // and dropping `table` here closes every donated file's parent-side copy.
    drop(table);

    // The handle tracks the child only by pid (§3 SandboxHandle), not via
    // `Child`, since it must survive being handed across threads and
    // outlive this function. But someone still has to reap it: a child
    // nobody ever `wait()`s for sits as a zombie forever, which would make
    // `kill(pid, 0)` (readiness polling, `IsRunning`, `Destroy`'s
    // wait-for-stopped loop) see it as alive even after it has exited. A
    // detached reaper thread blocks on `wait()` so the kernel can recycle
    // the pid as soon as the sandbox actually exits.
    let reaper_id = id.to_string();
    std::thread::spawn(move || match child.wait() {
        Ok(status) => tracing::debug!(id = %reaper_id, pid, %status, "sandbox process reaped"),
        Err(e) => tracing::warn!(id = %reaper_id, pid, error = %e, "failed to reap sandbox process"),
    });

    // Step 14: caller records the pid on the handle.
    Ok(LaunchOutcome {
        pid,
        chroot: chroot_dir,
    })
}

fn check_preconditions(id: &str, config: &SandboxConfig, plan: &NamespacePlan) -> SandboxResult<()> {
    if matches!(plan.user_policy, UserNsPolicy::NewNobody)
        && !config.test_mode.allow_run_as_current_user_without_chroot
        && !credentials::can_set_uid_gid()
    {
        return Err(SandboxError::precondition(
            id,
            "cannot set UID/GID mappings for a new user namespace (or enable test-mode opt-out)",
        ));
    }
    Ok(())
}

fn maybe_build_chroot(
    id: &str,
    config: &SandboxConfig,
    plan: &NamespacePlan,
    binary_path: &std::path::Path,
) -> SandboxResult<Option<PathBuf>> {
    if !matches!(plan.user_policy, UserNsPolicy::NewNobody) {
        return Ok(None);
    }
    if config.test_mode.allow_run_as_current_user_without_chroot {
        return Ok(None);
    }
    let parent = std::env::temp_dir().join("sandrun-chroots");
    let dir = chroot::build(id, &parent, binary_path, false)?;
    Ok(Some(dir))
}

fn open_append(path: &std::path::Path) -> std::io::Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

/// Allocate a pty pair, send the master down `console_socket` as SCM_RIGHTS
/// ancillary data on a one-shot connection, and wire the slave up as the
/// child's stdio (§4.4 step 8). The slave becomes the controlling terminal
/// once `setsid()` runs in the pre-exec hook.
fn setup_console(id: &str, cmd: &mut Command, console_socket: &std::path::Path) -> SandboxResult<()> {
    let pty = nix::pty::openpty(None, None).map_err(|e| SandboxError::spawn(id, e.to_string()))?;

    let stream =
        UnixStream::connect(console_socket).map_err(|e| SandboxError::io(console_socket, e))?;
    let marker = b"console";
    let iov = [IoSlice::new(marker)];
    let master_fd = pty.master.as_raw_fd();
    let cmsg = [ControlMessage::ScmRights(std::slice::from_ref(&master_fd))];
    socket::sendmsg::<()>(stream.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)
        .map_err(|e| SandboxError::spawn(id, format!("sending console master: {e}")))?;
    // The master is now owned by whoever accepted it on the other end of
    // console_socket; drop our copy.
    drop(pty.master);
    drop(stream);

    let slave = pty.slave;
    cmd.stdin(Stdio::from(
        slave
            .try_clone()
            .map_err(|e| SandboxError::spawn(id, e.to_string()))?,
    ));
    cmd.stdout(Stdio::from(
        slave
            .try_clone()
            .map_err(|e| SandboxError::spawn(id, e.to_string()))?,
    ));
    cmd.stderr(Stdio::from(slave));

    Ok(())
}
