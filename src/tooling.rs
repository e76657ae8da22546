//! Tooling Layer
//!
//! The command-line front end and the interactive shell. Both are thin
//! wrappers over `VirtualFileSystem`.

pub mod cli;
pub mod shell;

pub use cli::{Cli, CliContext, Commands};
pub use shell::run_shell;
