//! `sandrun stacks`: dump goroutine/thread stacks from the sandbox process
//! (§4.6 `Stacks`), for debugging a wedged sandbox.

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct StacksArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,
}

pub async fn execute(args: StacksArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let dump = tokio::task::spawn_blocking(move || handle.stacks()).await??;
    println!("{dump}");
    Ok(())
}
