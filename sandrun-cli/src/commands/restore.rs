//! `sandrun restore`: recreate a container from a checkpoint state file
//! (§4.6 `Restore`).

use std::fs::File;
use std::path::PathBuf;

use clap::Args;

use sandrun::{SandboxConfig, TestModeFlags};

use crate::cli::{GlobalFlags, NetworkArg, PlatformArg};
use crate::state;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to restore.
    #[arg(index = 2)]
    pub cid: String,

    /// Checkpoint state file produced by a prior `checkpoint` call.
    #[arg(long)]
    pub state_file: PathBuf,

    /// Platform selector; only consulted for its device requirement (§4.3).
    #[arg(long, value_enum, default_value = "ptrace")]
    pub platform: PlatformArg,

    /// Accelerator device file; required when `--platform=accelerator`.
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Network mode to configure before restoring.
    #[arg(long, value_enum, default_value = "none")]
    pub network: NetworkArg,

    /// OCI bundle directory. `Restore` only reuses the handle's launcher
    /// config shape; this need not be the original bundle.
    #[arg(long, default_value = ".")]
    pub bundle: PathBuf,

    /// OCI spec file. Same caveat as `--bundle`.
    #[arg(long)]
    pub spec: Option<PathBuf>,
}

pub async fn execute(args: RestoreArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let state_file = File::open(&args.state_file)
        .map_err(|e| anyhow::anyhow!("opening state file {}: {e}", args.state_file.display()))?;

    let spec_file = args.spec.clone().unwrap_or_else(|| args.bundle.join("config.json"));
    let config = SandboxConfig {
        platform: args.platform.into(),
        network: args.network.into(),
        log_file: None,
        debug_log_dir: None,
        spec_file,
        bundle_dir: args.bundle,
        binary_path: None,
        console_socket: None,
        device_path: args.device,
        test_mode: TestModeFlags::default(),
    };
    let network = config.network;
    let cid = args.cid;

    tokio::task::spawn_blocking(move || handle.restore(cid, &config, network, state_file))
        .await??;
    Ok(())
}
