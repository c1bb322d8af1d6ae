//! `sandrun event`: report CPU/memory stats for a container (§4.6 `Event`).

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct EventArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to report on.
    #[arg(index = 2)]
    pub cid: String,
}

pub async fn execute(args: EventArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid;
    let event = tokio::task::spawn_blocking(move || handle.event(cid)).await??;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}
