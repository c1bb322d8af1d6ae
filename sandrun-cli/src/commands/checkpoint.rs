//! `sandrun checkpoint`: snapshot a container's state to a file (§4.6
//! `Checkpoint`).

use std::fs::File;
use std::path::PathBuf;

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct CheckpointArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to checkpoint.
    #[arg(index = 2)]
    pub cid: String,

    /// Output file to receive the checkpoint image.
    #[arg(long)]
    pub out: PathBuf,
}

pub async fn execute(args: CheckpointArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let out_file = File::create(&args.out)
        .map_err(|e| anyhow::anyhow!("creating checkpoint file {}: {e}", args.out.display()))?;
    let cid = args.cid;
    tokio::task::spawn_blocking(move || handle.checkpoint(cid, out_file)).await??;
    Ok(())
}
