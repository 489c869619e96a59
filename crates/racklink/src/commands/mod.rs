//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod discover;
pub mod probe;
pub mod register;
pub mod send;
pub mod tag;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a network-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(args, global).await,
        Command::Probe(args) => probe::handle(args, global).await,
        Command::Register(args) => register::handle(args, global).await,
        Command::Watch(args) => watch::handle(args, global).await,
        Command::Send(args) => send::handle(args, global).await,
        Command::Tag(args) => tag::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(_) => Err(CliError::Internal(
            "completions are generated before dispatch".into(),
        )),
    }
}
