//! Command-line configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default database directory.
pub const DEFAULT_DATA_PATH: &str = "./data";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "cmdb_auth=info,cmdb_cli=info";

/// Tool configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Path to the sled database directory.
    pub data_path: PathBuf,

    /// Application secret for password digests and token signing.
    pub secret: Option<String>,

    /// Log in by e-mail address and put the tenant into tokens.
    pub cloud_mode: bool,

    /// JSON fixture loaded into the in-memory directory.
    pub directory_fixture: Option<PathBuf>,
}

impl CliConfig {
    /// Create a configuration for the given database directory.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            secret: None,
            cloud_mode: false,
            directory_fixture: None,
        }
    }

    /// Set the application secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Enable cloud mode.
    pub fn with_cloud_mode(mut self, cloud_mode: bool) -> Self {
        self.cloud_mode = cloud_mode;
        self
    }

    /// Set the directory fixture file.
    pub fn with_directory_fixture(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory_fixture = Some(path.into());
        self
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "cmdb-auth")]
#[command(version, about = "CMDB authentication administration", long_about = None)]
pub struct Args {
    /// Path to the database storage directory.
    #[arg(short, long, env = "CMDB_DATA_PATH", default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Application secret.
    #[arg(long, env = "CMDB_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Multi-tenant mode.
    #[arg(long, env = "CMDB_CLOUD_MODE")]
    pub cloud_mode: bool,

    /// Directory fixture (JSON) for the directory provider.
    #[arg(long, env = "CMDB_DIRECTORY_FIXTURE")]
    pub directory_fixture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Tool configuration from the global options.
    pub fn config(&self) -> CliConfig {
        let mut config = CliConfig::new(&self.data_path).with_cloud_mode(self.cloud_mode);
        if let Some(secret) = &self.secret {
            config = config.with_secret(secret);
        }
        if let Some(path) = &self.directory_fixture {
            config = config.with_directory_fixture(path);
        }
        config
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List installed providers.
    Providers,

    /// Show or change authentication settings.
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// Manage local users.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Log in and print a token.
    Login {
        user_name: String,

        #[arg(long, env = "CMDB_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SettingsCommand {
    /// Print the reconciled settings with secrets hidden.
    Show,

    /// Change global options.
    Set {
        /// Allow external providers.
        #[arg(long)]
        enable_external: Option<bool>,

        /// Token lifetime in seconds.
        #[arg(long)]
        token_lifetime: Option<u64>,
    },

    /// Replace one provider's configuration with a JSON object.
    Provider { name: String, config: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Create a local user.
    Add {
        user_name: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        email: Option<String>,

        /// Tenant database (cloud mode).
        #[arg(long)]
        database: Option<String>,

        #[arg(long)]
        group: Option<i64>,
    },

    /// List users.
    List,
}
