//! `sandrun create`: launch a new sandbox (§4.4 Create/the process launcher).

use std::fs;
use std::path::PathBuf;

use clap::Args;
use oci_spec::runtime::Spec;
use serde::Deserialize;

use sandrun::{SandboxConfig, SandboxHandle, TestModeFlags};

use crate::cli::{GlobalFlags, NetworkArg, PlatformArg};
use crate::state::{self, HandleState};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Sandbox id; also the logical id of its root container.
    #[arg(index = 1)]
    pub id: String,

    /// OCI bundle directory containing `config.json` and the rootfs.
    #[arg(long)]
    pub bundle: Option<PathBuf>,

    /// Path to the OCI runtime spec file. Defaults to `<bundle>/config.json`.
    #[arg(long)]
    pub spec: Option<PathBuf>,

    /// Platform selector.
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,

    /// Network mode.
    #[arg(long, value_enum)]
    pub network: Option<NetworkArg>,

    /// Append supervisor log output to this file, donated as `--log-fd`.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Directory to write a per-boot debug log into, donated as `--debug-log-fd`.
    #[arg(long)]
    pub debug_log_dir: Option<PathBuf>,

    /// Unix socket to receive the console pty master over.
    #[arg(long)]
    pub console_socket: Option<PathBuf>,

    /// Accelerator device file; required when `--platform=accelerator`.
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Gofer/io socket endpoints to connect to and donate, in order given.
    #[arg(long = "io-socket")]
    pub io_sockets: Vec<PathBuf>,

    /// Path to the sandrun binary to re-exec as the sandbox. Defaults to the
    /// current executable.
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Load additional `SandboxConfig` defaults from a JSON/YAML file; the
    /// flags above override whatever the file sets (§10.3 config overlay).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip the chroot and run as the current user instead of "nobody"
    /// (§4.4.2 test-mode opt-out; never set this in production).
    #[arg(long)]
    pub allow_run_as_current_user_without_chroot: bool,
}

/// JSON/YAML overlay read by `--config`. Every field is optional: flags
/// passed on the command line always win over what the file sets.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigOverlay {
    bundle: Option<PathBuf>,
    spec: Option<PathBuf>,
    platform: Option<PlatformOverlay>,
    network: Option<NetworkOverlay>,
    log_file: Option<PathBuf>,
    debug_log_dir: Option<PathBuf>,
    console_socket: Option<PathBuf>,
    device: Option<PathBuf>,
    #[serde(default)]
    io_sockets: Vec<PathBuf>,
    binary: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum PlatformOverlay {
    Ptrace,
    Accelerator,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum NetworkOverlay {
    None,
    Host,
    SandboxInternal,
}

fn load_overlay(path: &std::path::Path) -> anyhow::Result<ConfigOverlay> {
    let body = fs::read_to_string(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        Ok(serde_json::from_str(&body)?)
    } else {
        Ok(serde_yaml::from_str(&body)?)
    }
}

pub async fn execute(args: CreateArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let overlay = args
        .config
        .as_deref()
        .map(load_overlay)
        .transpose()?
        .unwrap_or_default();

    let bundle_dir = args
        .bundle
        .clone()
        .or(overlay.bundle)
        .ok_or_else(|| anyhow::anyhow!("--bundle is required (or set `bundle` in --config)"))?;

    let spec_file = args
        .spec
        .clone()
        .or(overlay.spec)
        .unwrap_or_else(|| bundle_dir.join("config.json"));

    let platform = args
        .platform
        .map(sandrun::Platform::from)
        .or(overlay.platform.map(|p| match p {
            PlatformOverlay::Ptrace => sandrun::Platform::Ptrace,
            PlatformOverlay::Accelerator => sandrun::Platform::Accelerator,
        }))
        .ok_or_else(|| anyhow::anyhow!("--platform is required (or set `platform` in --config)"))?;

    let network = args
        .network
        .map(sandrun::NetworkMode::from)
        .or(overlay.network.map(|n| match n {
            NetworkOverlay::None => sandrun::NetworkMode::None,
            NetworkOverlay::Host => sandrun::NetworkMode::Host,
            NetworkOverlay::SandboxInternal => sandrun::NetworkMode::SandboxInternal,
        }))
        .unwrap_or(sandrun::NetworkMode::None);

    let config = SandboxConfig {
        platform,
        network,
        log_file: args.log_file.or(overlay.log_file),
        debug_log_dir: args.debug_log_dir.or(overlay.debug_log_dir),
        spec_file: spec_file.clone(),
        bundle_dir,
        binary_path: args.binary.or(overlay.binary),
        console_socket: args.console_socket.or(overlay.console_socket),
        device_path: args.device.or(overlay.device),
        test_mode: TestModeFlags {
            allow_run_as_current_user_without_chroot: args
                .allow_run_as_current_user_without_chroot,
        },
    };

    let spec = Spec::load(&spec_file)
        .map_err(|e| anyhow::anyhow!("failed to load OCI spec {}: {e}", spec_file.display()))?;

    let io_sockets = if args.io_sockets.is_empty() {
        overlay.io_sockets
    } else {
        args.io_sockets
    };
    let io_files = crate::util::connect_io_sockets(&io_sockets)?;

    let id = args.id.clone();
    let handle = tokio::task::spawn_blocking(move || {
        SandboxHandle::create(id, &config, &spec, io_files)
    })
    .await??;

    let home = global.home_dir();
    state::save(
        &home,
        &HandleState {
            id: handle.id().to_string(),
            pid: handle.pid(),
            chroot: handle.chroot(),
        },
    )?;

    println!("{}", handle.id());
    Ok(())
}
