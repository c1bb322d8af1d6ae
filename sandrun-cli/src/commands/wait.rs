//! `sandrun wait`: block until a container exits (§4.6 `Wait`).

use clap::Args;

use crate::cli::GlobalFlags;
use crate::state;
use crate::util::to_shell_exit_code;

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to wait on.
    #[arg(index = 2)]
    pub cid: String,
}

pub async fn execute(args: WaitArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid;
    let status = tokio::task::spawn_blocking(move || handle.wait(cid)).await??;
    println!("{}", serde_json::to_string_pretty(&status)?);
    let code = to_shell_exit_code(&status);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
