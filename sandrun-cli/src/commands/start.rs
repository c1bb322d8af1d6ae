//! `sandrun start`: start a non-root container (§4.6 `Start`).

use std::path::PathBuf;

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to start inside the sandbox.
    #[arg(index = 2)]
    pub cid: String,

    /// Gofer/io socket endpoints to connect to and donate, in order given.
    #[arg(long = "io-socket")]
    pub io_sockets: Vec<PathBuf>,
}

pub async fn execute(args: StartArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let io_files = crate::util::connect_io_sockets(&args.io_sockets)?;
    let cid = args.cid;
    tokio::task::spawn_blocking(move || handle.start(cid, io_files)).await??;
    Ok(())
}
