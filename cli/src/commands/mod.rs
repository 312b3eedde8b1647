//! One-shot subcommands for scripted and non-interactive use.

pub mod kill;
pub mod list;
