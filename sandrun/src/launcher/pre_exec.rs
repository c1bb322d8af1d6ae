//! Pre-execution hook: namespace entry, credential mapping, chroot and FD
//! cleanup (§4.4 steps 9-13, §9 "single atomic fork+enter-ns+exec").
//!
//! # Safety
//!
//! Everything in [`install`]'s closure runs after `fork()` but before
//! `exec()`, in a child that is still single-threaded but otherwise as
//! constrained as a signal handler:
//! - Only async-signal-safe syscalls are allowed.
//! - No memory allocation (no `Box`, `Vec`, `String`, `format!`).
//! - No mutex operations.
//! - No logging (`tracing`, `println`) — failures are reported to the
//!   parent as an `io::Error` and surface as [`SandboxError::Spawn`]
//!   (crate::error) once the parent's `spawn()` call returns.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use crate::launcher::fd::close_fds_from;
use crate::launcher::namespaces::{NamespacePlan, NsKind, NsSpec, UserNsPolicy};

fn clone_flag(kind: NsKind) -> libc::c_int {
    match kind {
        NsKind::Ipc => libc::CLONE_NEWIPC,
        NsKind::Uts => libc::CLONE_NEWUTS,
        NsKind::Mount => libc::CLONE_NEWNS,
        NsKind::Pid => libc::CLONE_NEWPID,
        NsKind::Network => libc::CLONE_NEWNET,
        NsKind::User => libc::CLONE_NEWUSER,
    }
}

fn path_to_cstring(path: &std::path::Path) -> std::io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from_raw_os_error(libc::EINVAL))
}

/// Join an existing namespace by opening its `/proc/.../ns/<kind>` path and
/// calling `setns(2)`. Async-signal-safe: the path is pre-converted to a
/// `CString` by the caller before fork, so no allocation happens here.
unsafe fn join_namespace(kind: NsKind, path: &CString) -> std::io::Result<()> {
    unsafe {
        let fd = libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let rc = libc::setns(fd, clone_flag(kind));
        libc::close(fd);
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

unsafe fn unshare_namespace(kind: NsKind) -> std::io::Result<()> {
    unsafe {
        if libc::unshare(clone_flag(kind)) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Pre-converted, async-signal-safe form of a [`NamespacePlan`]: every
/// `Join` path is turned into a `CString` ahead of time so the pre-exec
/// closure never allocates.
enum PreparedSpec {
    New(NsKind),
    Join(NsKind, CString),
}

fn prepare(plan: &NamespacePlan) -> std::io::Result<Vec<PreparedSpec>> {
    plan.ordered_for_exec()
        .into_iter()
        .map(|spec| match spec {
            NsSpec::New(kind) => Ok(PreparedSpec::New(*kind)),
            NsSpec::Join(kind, path) => Ok(PreparedSpec::Join(*kind, path_to_cstring(path)?)),
        })
        .collect()
}

/// Install the pre-exec hook that carries out §4.4 steps 9-13 in the child,
/// between `fork()` and `exec()`:
///
/// 1. `setsid()` — detach from the caller's controlling terminal/session.
/// 2. Enter the user namespace first (joined or newly created) so an
///    unprivileged caller still holds full capabilities *within* it for
///    the namespaces that follow — see [`NamespacePlan::ordered_for_exec`].
/// 3. Enter the remaining namespaces (IPC/UTS/mount/PID/network).
/// 4. Apply the credential mapping the namespace plan calls for.
/// 5. `chroot()` + `chdir("/")` into the prepared chroot, if one was built.
/// 6. Close any FD at or above `first_non_donated_fd` that wasn't already
///    marked `CLOEXEC`, as a defense-in-depth backstop.
///
/// # Safety
///
/// The closure only performs async-signal-safe syscalls. `plan` and
/// `chroot_dir` are consumed into pre-converted `CString`s before the fork
/// happens, so nothing in the closure body allocates.
pub fn install(
    cmd: &mut Command,
    plan: NamespacePlan,
    chroot_dir: Option<PathBuf>,
    first_non_donated_fd: i32,
) -> std::io::Result<()> {
    let specs = prepare(&plan)?;
    let user_policy = plan.user_policy;
    let chroot_cpath = chroot_dir.as_deref().map(path_to_cstring).transpose()?;

    // SAFETY: the closure below only issues raw syscalls and touches no
    // Rust runtime state shared with the parent (see module docs).
    unsafe {
        cmd.pre_exec(move || {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }

            for spec in &specs {
                match spec {
                    PreparedSpec::Join(kind, path) => {
                        join_namespace(*kind, path)?;
                        if *kind == NsKind::User {
                            apply_join_credentials(&user_policy)?;
                        }
                    }
                    PreparedSpec::New(kind) => {
                        unshare_namespace(*kind)?;
                        if *kind == NsKind::User {
                            if let UserNsPolicy::NewNobody = user_policy {
                                crate::launcher::credentials::write_nobody_id_maps(
                                    crate::constants::NOBODY_ID,
                                )
                                .map_err(|_| std::io::Error::last_os_error())?;
                                if libc::setresgid(
                                    crate::constants::NOBODY_ID,
                                    crate::constants::NOBODY_ID,
                                    crate::constants::NOBODY_ID,
                                ) != 0
                                {
                                    return Err(std::io::Error::last_os_error());
                                }
                                if libc::setresuid(
                                    crate::constants::NOBODY_ID,
                                    crate::constants::NOBODY_ID,
                                    crate::constants::NOBODY_ID,
                                ) != 0
                                {
                                    return Err(std::io::Error::last_os_error());
                                }
                            }
                        }
                    }
                }
            }

            if let Some(ref path) = chroot_cpath {
                if libc::chroot(path.as_ptr()) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                let root = CString::new("/").unwrap();
                if libc::chdir(root.as_ptr()) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }

            close_fds_from(first_non_donated_fd).map_err(std::io::Error::from_raw_os_error)?;

            Ok(())
        });
    }

    Ok(())
}

/// Apply the spec-provided UID/GID mappings after joining (rather than
/// creating) the user namespace, per §4.4.1's host-network-plus-joined-
/// user-namespace case. Only the first mapping row of each kind is applied,
/// matching the single-row shape [`write_id_maps`](crate::launcher::credentials::write_id_maps)
/// accepts; additional rows in the spec are not supported.
unsafe fn apply_join_credentials(policy: &UserNsPolicy) -> std::io::Result<()> {
    let UserNsPolicy::JoinWithCaps {
        uid_mappings,
        gid_mappings,
    } = policy
    else {
        return Ok(());
    };
    let (Some(uid), Some(gid)) = (uid_mappings.first(), gid_mappings.first()) else {
        return Ok(());
    };
    unsafe {
        crate::launcher::credentials::write_id_maps(
            uid.container_id,
            uid.host_id,
            gid.container_id,
            gid.host_id,
        )
        .map_err(|_| std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::namespaces::IdMapping;

    #[test]
    fn prepare_converts_join_paths_without_error() {
        let plan = NamespacePlan {
            specs: vec![
                NsSpec::New(NsKind::Ipc),
                NsSpec::Join(NsKind::Network, PathBuf::from("/proc/1/ns/net")),
            ],
            user_policy: UserNsPolicy::NewNobody,
        };
        let prepared = prepare(&plan).expect("valid paths should prepare");
        assert_eq!(prepared.len(), 2);
    }

    #[test]
    fn install_accepts_a_plan_without_joins() {
        let mut cmd = Command::new("/bin/true");
        let plan = NamespacePlan {
            specs: vec![NsSpec::New(NsKind::Ipc), NsSpec::New(NsKind::User)],
            user_policy: UserNsPolicy::NewNobody,
        };
        install(&mut cmd, plan, None, 3).expect("install should succeed");
    }

    #[test]
    fn install_accepts_a_chroot_path() {
        let mut cmd = Command::new("/bin/true");
        let plan = NamespacePlan {
            specs: vec![NsSpec::New(NsKind::Mount)],
            user_policy: UserNsPolicy::JoinWithCaps {
                uid_mappings: vec![IdMapping {
                    container_id: 0,
                    host_id: 1000,
                    size: 1,
                }],
                gid_mappings: vec![IdMapping {
                    container_id: 0,
                    host_id: 1000,
                    size: 1,
                }],
            },
        };
        install(&mut cmd, plan, Some(PathBuf::from("/tmp/chroot")), 3)
            .expect("install should succeed");
    }
}
