//! FD donation table (§3 "FD donation table", §8 "FD donation order").
//!
//! The launcher appends files to [`Command::extra_files`](std::process::Command::extra_files)
//! in the exact order donation slots are reserved. `std::process::Command`
//! places `extra_files[i]` at FD `3 + i` in the child and applies
//! `FD_CLOEXEC` to everything else, so the position in this table *is* the
//! child's FD number — there is no separate bookkeeping step that could
//! drift from the `--*-fd=N` flags built alongside it.

use std::fs::File;
use std::process::Command;

use crate::constants::FIRST_DONATED_FD;

/// Semantic role of a donated FD, matching §3's donation-table roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdRole {
    Log,
    DebugLog,
    Controller,
    Spec,
    Io,
    Device,
}

impl FdRole {
    /// The `--<role>-fd` flag name for this role. `Io` is plural
    /// (`--io-fds`) because it is the one role donated more than once.
    fn flag_name(&self) -> &'static str {
        match self {
            FdRole::Log => "--log-fd",
            FdRole::DebugLog => "--debug-log-fd",
            FdRole::Controller => "--controller-fd",
            FdRole::Spec => "--spec-fd",
            FdRole::Io => "--io-fds",
            FdRole::Device => "--device-fd",
        }
    }

    /// Whether this role's flag is a *pre-command* flag (before the
    /// literal `boot` token) per §6 flag ordering.
    pub fn is_pre_command(&self) -> bool {
        matches!(self, FdRole::Log | FdRole::DebugLog)
    }
}

/// Accumulates donated files and their matching CLI flags in lock step.
///
/// Appending to this table is the *only* way donated files reach the
/// child's argv, which is what guarantees the FD-donation-order property
/// of §8: table position and flag value are always derived together.
#[derive(Default)]
pub struct FdTable {
    files: Vec<File>,
    /// One flag string per appended file, e.g. `--spec-fd=4`.
    flags: Vec<(bool, String)>,
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next FD number a newly-appended file would receive.
    pub fn next_fd(&self) -> i32 {
        FIRST_DONATED_FD + self.files.len() as i32
    }

    /// Donate `file` under `role`, returning the FD number it was assigned.
    pub fn push(&mut self, role: FdRole, file: File) -> i32 {
        let fd = self.next_fd();
        self.flags
            .push((role.is_pre_command(), format!("{}={}", role.flag_name(), fd)));
        self.files.push(file);
        fd
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Pre-command flags (`--log-fd`, `--debug-log-fd`), in donation order.
    pub fn pre_command_flags(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(pre, _)| *pre)
            .map(|(_, s)| s.as_str())
    }

    /// Post-`boot` flags (`--controller-fd`, `--spec-fd`, `--io-fds`,
    /// `--device-fd`), in donation order.
    pub fn post_command_flags(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(pre, _)| !*pre)
            .map(|(_, s)| s.as_str())
    }

    /// Hand the accumulated files to `cmd.extra_files`. Borrows rather than
    /// consumes: `std::process::Command::extra_files` only records the FD
    /// numbers at this point and dup2's them during the fork inside
    /// `spawn()`, so the table — and the parent's copies of these FDs —
    /// must stay alive until spawn returns. Drop the table explicitly
    /// right after spawning to close the parent's copies (§3 "the parent
    /// closes its copies immediately after spawn").
    pub fn install(&self, cmd: &mut Command) {
        cmd.extra_files(&self.files);
    }
}

/// Close all FDs from `first_fd` onwards. Async-signal-safe.
///
/// Defense in depth: `std::process::Command` already arranges for every FD
/// other than stdio and `extra_files` to carry `FD_CLOEXEC` and thus close
/// automatically across exec. This is only a backstop for FDs that slipped
/// past that (e.g. opened with an explicit `O_CLOEXEC`-less flag deep in a
/// dependency), so it is safe to call unconditionally from the pre-exec hook.
///
/// # Safety
///
/// This function only uses async-signal-safe syscalls (close, syscall).
/// Do NOT add logging, allocation, or anything that isn't a raw syscall.
pub fn close_fds_from(first_fd: i32) -> Result<(), i32> {
    #[cfg(target_os = "linux")]
    {
        let result = unsafe {
            libc::syscall(
                libc::SYS_close_range,
                first_fd as libc::c_uint,
                libc::c_uint::MAX,
                0 as libc::c_uint,
            )
        };
        if result == 0 {
            return Ok(());
        }

        for fd in first_fd..1024 {
            unsafe { libc::close(fd) };
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        for fd in first_fd..4096 {
            unsafe { libc::close(fd) };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_file() -> File {
        fs::File::open("/dev/null").expect("/dev/null should always be openable")
    }

    #[test]
    fn donation_order_starts_at_three_and_is_monotonic() {
        let mut table = FdTable::new();
        let fd1 = table.push(FdRole::Log, tmp_file());
        let fd2 = table.push(FdRole::Controller, tmp_file());
        let fd3 = table.push(FdRole::Spec, tmp_file());

        assert_eq!(fd1, 3);
        assert_eq!(fd2, 4);
        assert_eq!(fd3, 5);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn pre_command_flags_precede_boot() {
        let mut table = FdTable::new();
        table.push(FdRole::Log, tmp_file());
        table.push(FdRole::Controller, tmp_file());
        table.push(FdRole::Spec, tmp_file());

        let pre: Vec<_> = table.pre_command_flags().collect();
        let post: Vec<_> = table.post_command_flags().collect();
        assert_eq!(pre, vec!["--log-fd=3"]);
        assert_eq!(post, vec!["--controller-fd=4", "--spec-fd=5"]);
    }

    #[test]
    fn io_flag_is_plural_and_repeatable() {
        let mut table = FdTable::new();
        table.push(FdRole::Controller, tmp_file());
        table.push(FdRole::Spec, tmp_file());
        table.push(FdRole::Io, tmp_file());
        table.push(FdRole::Io, tmp_file());

        let post: Vec<_> = table.post_command_flags().collect();
        assert_eq!(
            post,
            vec!["--controller-fd=3", "--spec-fd=4", "--io-fds=5", "--io-fds=6"]
        );
    }

    #[test]
    fn close_fds_from_closes_target_and_above() {
        let fd = unsafe { libc::dup(1) };
        assert!(fd >= 3);
        close_fds_from(fd).expect("should succeed");
        let result = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_eq!(result, -1, "target fd should be closed");
    }
}
