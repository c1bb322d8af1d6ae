//! `sandrun processes`: list process metadata in a sandbox (§4.6
//! `Processes`).

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct ProcessesArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id. Currently accepted for wire-shape future-proofing
    /// only; the sandbox reports sandbox-wide process data regardless
    /// (see DESIGN.md's open-question decision).
    #[arg(index = 2, default_value = "")]
    pub cid: String,
}

pub async fn execute(args: ProcessesArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid;
    let processes =
        tokio::task::spawn_blocking(move || handle.processes(cid)).await??;
    println!("{}", serde_json::to_string_pretty(&processes)?);
    Ok(())
}
