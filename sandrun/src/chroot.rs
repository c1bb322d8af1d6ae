//! Chroot builder (C2, §4.2): a minimal directory tree containing only the
//! supervisor binary, built before spawn and torn down on destroy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sandrun_proto::{SandboxError, SandboxResult};

use crate::launcher::credentials::has_cap_sys_admin;

/// Name the supervisor binary is copied to inside the chroot, and the path
/// `argv[0]`/the exec path are rewritten to once the chroot is in place
/// (§4.4 step 12).
pub const IN_CHROOT_BINARY_PATH: &str = "/sandrun";

/// Build a fresh chroot directory under `parent_dir/<id>` containing a copy
/// of `binary_path`. Returns the chroot's path, to be stored on the handle.
///
/// Preconditions (§4.4.2): the caller must hold `CAP_SYS_ADMIN`, unless
/// `allow_without_cap_sys_admin` opts out for tests. Missing the capability
/// with no opt-out is a fatal precondition error, surfaced before any child
/// is forked.
pub fn build(
    id: &str,
    parent_dir: &Path,
    binary_path: &Path,
    allow_without_cap_sys_admin: bool,
) -> SandboxResult<PathBuf> {
    if !allow_without_cap_sys_admin && !has_cap_sys_admin() {
        return Err(SandboxError::precondition(
            id,
            "CAP_SYS_ADMIN is required to build a chroot (or enable test-mode opt-out)",
        ));
    }

    let dir = parent_dir.join(id);
    fs::create_dir_all(&dir).map_err(|e| SandboxError::io(&dir, e))?;

    let dest = dir.join(IN_CHROOT_BINARY_PATH.trim_start_matches('/'));
    copy_if_newer(binary_path, &dest).map_err(|e| SandboxError::io(&dest, e))?;

    Ok(dir)
}

/// Tear down a chroot built by [`build`]. Safe to call on a directory that
/// no longer exists (§4.2 "tear-down is safe to retry").
pub fn teardown(chroot: &Path) -> SandboxResult<()> {
    match fs::remove_dir_all(chroot) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SandboxError::io(chroot, e)),
    }
}

/// Copy `src` to `dest` if `dest` is missing, older, or a different size
/// than `src`. Uses a reflink (copy-on-write clone) where the filesystem
/// supports one, falling back to a regular copy otherwise.
fn copy_if_newer(src: &Path, dest: &Path) -> io::Result<bool> {
    if !should_copy(src, dest) {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match reflink_copy::reflink(src, dest) {
        Ok(()) => Ok(true),
        Err(_) => {
            fs::copy(src, dest)?;
            Ok(true)
        }
    }
}

fn should_copy(src: &Path, dest: &Path) -> bool {
    if !dest.exists() {
        return true;
    }
    match (fs::metadata(src), fs::metadata(dest)) {
        (Ok(src_meta), Ok(dst_meta)) => {
            src_meta.modified().ok() > dst_meta.modified().ok() || src_meta.len() != dst_meta.len()
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn build_copies_binary_into_chroot() {
        let scratch = tempdir().unwrap();
        let binary = scratch.path().join("fake-sandrun");
        fs::write(&binary, b"#!/bin/sh\necho hi\n").unwrap();

        let chroot = build("test-id", scratch.path(), &binary, true).expect("build should succeed");
        assert!(chroot.join("sandrun").exists());
    }

    #[test]
    fn teardown_is_idempotent() {
        let scratch = tempdir().unwrap();
        let binary = scratch.path().join("fake-sandrun");
        fs::write(&binary, b"binary").unwrap();

        let chroot = build("test-id", scratch.path(), &binary, true).unwrap();
        teardown(&chroot).expect("first teardown should succeed");
        assert!(!chroot.exists());
        teardown(&chroot).expect("second teardown on a missing dir should still succeed");
    }

    #[test]
    fn build_without_cap_sys_admin_and_no_opt_out_fails() {
        let scratch = tempdir().unwrap();
        let binary = scratch.path().join("fake-sandrun");
        fs::write(&binary, b"binary").unwrap();

        // This test only makes a meaningful assertion when the test runner
        // itself lacks CAP_SYS_ADMIN (the common case in CI containers).
        if has_cap_sys_admin() {
            return;
        }
        let result = build("test-id", scratch.path(), &binary, false);
        assert!(result.is_err());
    }
}
