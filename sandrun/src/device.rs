//! Platform device opener (C3, §4.3).

use std::fs::{File, OpenOptions};
use std::path::Path;

use sandrun_proto::{SandboxError, SandboxResult};

use crate::config::{Platform, SandboxConfig};

/// For [`Platform::Accelerator`], open `config.device_path` read/write and
/// return it for donation. For software/tracing platforms, return `None`
/// (§6 "Platform device: omitted for software/tracing platforms").
///
/// Errors propagate verbatim (§4.3): a missing or unopenable device file is
/// surfaced as-is rather than translated into a generic message.
pub fn open(config: &SandboxConfig) -> SandboxResult<Option<File>> {
    if !config.platform.needs_device() {
        return Ok(None);
    }
    let path = config.device_path.as_deref().ok_or_else(|| {
        SandboxError::precondition(
            "<pending>",
            "platform requires a device file but none was configured",
        )
    })?;
    let file = open_rw(path).map_err(|e| SandboxError::io(path, e))?;
    Ok(Some(file))
}

fn open_rw(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkMode, TestModeFlags};
    use std::path::PathBuf;

    fn config(platform: Platform, device_path: Option<PathBuf>) -> SandboxConfig {
        SandboxConfig {
            platform,
            network: NetworkMode::None,
            log_file: None,
            debug_log_dir: None,
            spec_file: PathBuf::from("/bundle/config.json"),
            bundle_dir: PathBuf::from("/bundle"),
            binary_path: None,
            console_socket: None,
            device_path,
            test_mode: TestModeFlags::default(),
        }
    }

    #[test]
    fn software_platform_opens_no_device() {
        let result = open(&config(Platform::Ptrace, None)).expect("should not fail");
        assert!(result.is_none());
    }

    #[test]
    fn accelerator_platform_without_device_path_is_precondition_error() {
        let result = open(&config(Platform::Accelerator, None));
        assert!(matches!(result, Err(SandboxError::Precondition { .. })));
    }

    #[test]
    fn accelerator_platform_opens_configured_device() {
        let result = open(&config(Platform::Accelerator, Some(PathBuf::from("/dev/null"))))
            .expect("opening /dev/null should succeed");
        assert!(result.is_some());
    }
}
