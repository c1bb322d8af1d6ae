//! `sandrun destroy`: tear down a sandbox and forget its on-disk state
//! (§4.6 `Destroy`).

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,
}

pub async fn execute(args: DestroyArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let home = global.home_dir();
    let handle = state::attach(&home, &args.id)?;
    tokio::task::spawn_blocking(move || handle.destroy()).await??;
    state::remove(&home, &args.id)?;
    Ok(())
}
