//! `sandrun signal`: best-effort signal delivery to a container (§4.6
//! `Signal`).

use std::str::FromStr;

use clap::Args;
use nix::sys::signal::Signal;

use crate::cli::GlobalFlags;
use crate::state;

#[derive(Args, Debug)]
pub struct SignalArgs {
    /// Sandbox id, as passed to `create`.
    #[arg(index = 1)]
    pub id: String,

    /// Container id to signal.
    #[arg(index = 2)]
    pub cid: String,

    /// Signal name (e.g. `SIGTERM`, `TERM`) or raw signal number.
    #[arg(index = 3)]
    pub signal: String,
}

fn parse_signal(raw: &str) -> anyhow::Result<i32> {
    if let Ok(signo) = raw.parse::<i32>() {
        return Ok(signo);
    }
    let name = if raw.to_uppercase().starts_with("SIG") {
        raw.to_uppercase()
    } else {
        format!("SIG{}", raw.to_uppercase())
    };
    Signal::from_str(&name)
        .map(|s| s as i32)
        .map_err(|_| anyhow::anyhow!("unrecognized signal: {raw}"))
}

pub async fn execute(args: SignalArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let signo = parse_signal(&args.signal)?;
    let handle = state::attach(&global.home_dir(), &args.id)?;
    let cid = args.cid;
    tokio::task::spawn_blocking(move || handle.signal(cid, signo)).await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_number() {
        assert_eq!(parse_signal("9").unwrap(), 9);
    }

    #[test]
    fn parses_bare_name() {
        assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM as i32);
    }

    #[test]
    fn parses_sig_prefixed_name() {
        assert_eq!(parse_signal("SIGKILL").unwrap(), Signal::SIGKILL as i32);
    }

    #[test]
    fn rejects_unknown_name() {
        assert!(parse_signal("NOTASIGNAL").is_err());
    }
}
