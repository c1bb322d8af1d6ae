//! `sandrun exec`: run a new process inside a container (§4.6 `Execute`,
//! optionally followed by `WaitPID`).

use clap::Args;

use crate::cli::{GlobalFlags, ProcessFlags};
use crate::state;
use crate::util::to_shell_exit_code;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to execute inside.
    #[arg(index = 2)]
    pub cid: String,

    /// Working directory inside the container.
    #[arg(short = 'w', long, default_value = "/")]
    pub cwd: String,

    /// Environment variables, `KEY=VALUE`.
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    #[command(flatten)]
    pub process: ProcessFlags,

    /// Command to execute, e.g. `-- /bin/echo hi`.
    #[arg(index = 3, last = true, required = true)]
    pub command: Vec<String>,
}

/// Entry point: `Execute` always returns immediately with a pid; unless
/// `--detach` was passed, this then blocks on `WaitPID` and exits with the
/// matching shell convention exit code, forwarding Ctrl-C as `SIGKILL`
/// rather than leaving the exec'd process orphaned when the CLI itself is
/// interrupted.
pub async fn execute(args: ExecArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid.clone();
    let argv = args.command;
    let envv = args.env;
    let cwd = args.cwd;

    let exec_cid = cid.clone();
    let pid = tokio::task::spawn_blocking(move || handle.execute(exec_cid, argv, envv, cwd))
        .await??;

    if args.process.detach {
        println!("{pid}");
        return Ok(());
    }

    let handle = state::attach(&global.home_dir(), &args.id)?;
    let wait_cid = cid;
    let wait_task = tokio::task::spawn_blocking(move || handle.wait_pid(wait_cid, pid, true));

    tokio::select! {
        result = wait_task => {
            let status = result??;
            let code = to_shell_exit_code(&status);
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            let handle = state::attach(&global.home_dir(), &args.id)?;
            let _ = handle.signal(cid, nix::sys::signal::Signal::SIGKILL as i32);
            anyhow::bail!("interrupted, sent SIGKILL to pid {pid}");
        }
    }
}
