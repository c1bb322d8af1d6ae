//! `sandrun`: command-line front end for the sandbox supervisor library
//! (§10.3 "a `clap`-derived CLI front end ... dispatching into the
//! blocking `sandrun` library via `tokio::task::spawn_blocking`").

use clap::{Parser, Subcommand};

use sandrun_cli::cli::GlobalFlags;
use sandrun_cli::commands::{
    checkpoint, create, destroy, event, exec, pause_resume, processes, restore, signal, stacks,
    start, start_root, wait,
};

#[derive(Parser, Debug)]
#[command(name = "sandrun", about = "Host-side sandbox supervisor", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalFlags,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch a new sandbox process.
    Create(create::CreateArgs),
    /// Run the root container's argv.
    StartRoot(start_root::StartRootArgs),
    /// Start a non-root container.
    Start(start::StartArgs),
    /// Recreate a container from a checkpoint.
    Restore(restore::RestoreArgs),
    /// List process metadata in a sandbox.
    Processes(processes::ProcessesArgs),
    /// Run a new process inside a container.
    Exec(exec::ExecArgs),
    /// Report CPU/memory stats for a container.
    Event(event::EventArgs),
    /// Block until a container exits.
    Wait(wait::WaitArgs),
    /// Send a signal to a container.
    Signal(signal::SignalArgs),
    /// Snapshot a container's state to a file.
    Checkpoint(checkpoint::CheckpointArgs),
    /// Suspend guest execution.
    Pause(pause_resume::PauseArgs),
    /// Resume guest execution.
    Resume(pause_resume::ResumeArgs),
    /// Dump the sandbox process's stacks for debugging.
    Stacks(stacks::StacksArgs),
    /// Tear down a sandbox and forget its state.
    Destroy(destroy::DestroyArgs),
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.global.log_level))
        .init();

    let result = match cli.command {
        Command::Create(args) => create::execute(args, &cli.global).await,
        Command::StartRoot(args) => start_root::execute(args, &cli.global).await,
        Command::Start(args) => start::execute(args, &cli.global).await,
        Command::Restore(args) => restore::execute(args, &cli.global).await,
        Command::Processes(args) => processes::execute(args, &cli.global).await,
        Command::Exec(args) => exec::execute(args, &cli.global).await,
        Command::Event(args) => event::execute(args, &cli.global).await,
        Command::Wait(args) => wait::execute(args, &cli.global).await,
        Command::Signal(args) => signal::execute(args, &cli.global).await,
        Command::Checkpoint(args) => checkpoint::execute(args, &cli.global).await,
        Command::Pause(args) => pause_resume::execute_pause(args, &cli.global).await,
        Command::Resume(args) => pause_resume::execute_resume(args, &cli.global).await,
        Command::Stacks(args) => stacks::execute(args, &cli.global).await,
        Command::Destroy(args) => destroy::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sandrun command failed");
            eprintln!("sandrun: {err:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
