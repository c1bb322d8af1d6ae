//! `sandrun start-root`: run the root container's argv (§4.6 `StartRoot`).

use clap::Args;

use crate::cli::{GlobalFlags, NetworkArg};
use crate::state;

#[derive(Args, Debug)]
pub struct StartRootArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Network mode to configure before starting the root container.
    #[arg(long, value_enum, default_value = "none")]
    pub network: NetworkArg,
}

pub async fn execute(args: StartRootArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let network = sandrun::NetworkMode::from(args.network);
    tokio::task::spawn_blocking(move || handle.start_root(network)).await??;
    Ok(())
}
