//! CMDB CLI - Administration of authentication settings and users.
//!
//! Opens the sled database, reconciles the stored settings document on
//! every start, and runs one command against it.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::{run, Workspace};
pub use config::{Args, CliConfig, Command, SettingsCommand, UserCommand, DEFAULT_LOG_FILTER};
pub use error::{CliError, CliResult};
