//! Library half of the `sandrun` CLI front end: subcommand argument
//! structs and their `execute` bodies, split out from `main.rs` so they
//! can carry doc-tests and be exercised from integration tests under
//! `tests/`.

pub mod cli;
pub mod commands;
pub mod state;
pub mod util;
