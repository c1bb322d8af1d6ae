//! `sandrun pause`/`sandrun resume`: suspend and resume guest execution
//! (§4.6 `Pause`, `Resume`).

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct PauseArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to pause.
    #[arg(index = 2)]
    pub cid: String,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to resume.
    #[arg(index = 2)]
    pub cid: String,
}

pub async fn execute_pause(args: PauseArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid;
    tokio::task::spawn_blocking(move || handle.pause(cid)).await??;
    Ok(())
}

pub async fn execute_resume(args: ResumeArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid;
    tokio::task::spawn_blocking(move || handle.resume(cid)).await??;
    Ok(())
}
