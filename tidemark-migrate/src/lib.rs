//! Tidemark Migration CLI Library
//!
//! Argument parsing, settings resolution and command handlers for the
//! `tidemark-migrate` binary. `main.rs` only wires these together.

pub mod cli;
pub mod commands;
pub mod settings;

pub use cli::{Cli, Commands};
pub use commands::{render_error, run};
pub use settings::{CliError, Settings};
