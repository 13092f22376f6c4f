//! Command execution.

use std::io::Write;
use std::sync::Arc;

use cmdb_auth::settings::set_provider_value;
use cmdb_auth::{
    reconcile, AuthModule, AuthSettings, CredentialVerifier, DirectoryConnector, Identity,
    IdentityField, IdentityStore, JwtTokenIssuer, KeyedHashVerifier, ProviderContext,
    ProviderKind, ProviderRegistry, SettingsStore, SledIdentityStore, StaticDirectory,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{CliConfig, Command, SettingsCommand, UserCommand};
use crate::error::{CliError, CliResult};

/// Opened database plus the reconciled settings document.
pub struct Workspace {
    config: CliConfig,
    registry: Arc<ProviderRegistry>,
    settings: SettingsStore,
    identities: Arc<SledIdentityStore>,
    document: Value,
    _db: sled::Db,
}

impl Workspace {
    /// Open the database, reconcile the stored settings and write back the
    /// repaired document if it changed.
    pub fn open(config: CliConfig) -> CliResult<Self> {
        let db = sled::open(&config.data_path)?;
        let settings = SettingsStore::open(&db)?;
        let identities = Arc::new(SledIdentityStore::open(&db)?);
        let registry = Arc::new(ProviderRegistry::with_builtins());

        let stored = settings.load()?.unwrap_or(Value::Null);
        let reconciled = reconcile(&stored, &registry);
        let document = reconciled.settings.to_value();
        if document != stored {
            settings.save_value(&document)?;
            info!(
                warnings = reconciled.warnings.len(),
                "settings document repaired"
            );
        }

        Ok(Self {
            config,
            registry,
            settings,
            identities,
            document,
            _db: db,
        })
    }

    /// Current reconciled settings.
    pub fn settings(&self) -> AuthSettings {
        reconcile(&self.document, &self.registry).settings
    }

    /// Apply an edit to the stored document, reconcile and save.
    fn edit_settings(
        &mut self,
        out: &mut impl Write,
        edit: impl FnOnce(&mut Value),
    ) -> CliResult<()> {
        let mut document = self.document.clone();
        edit(&mut document);

        let reconciled = reconcile(&document, &self.registry);
        for warning in &reconciled.warnings {
            writeln!(out, "warning: {}", warning)?;
        }
        self.document = reconciled.settings.to_value();
        self.settings.save_value(&self.document)?;
        Ok(())
    }

    fn secret(&self) -> CliResult<&str> {
        self.config.secret.as_deref().ok_or(CliError::MissingSecret)
    }

    fn directory(&self) -> CliResult<Arc<dyn DirectoryConnector>> {
        match &self.config.directory_fixture {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                debug!(path = %path.display(), "loading directory fixture");
                Ok(Arc::new(StaticDirectory::from_json(&json)?))
            }
            None => Ok(Arc::new(StaticDirectory::new())),
        }
    }

    fn module(&self) -> CliResult<AuthModule> {
        let secret = self.secret()?.as_bytes();
        let context = ProviderContext::new(
            self.identities.clone(),
            Arc::new(KeyedHashVerifier::from_secret(secret)),
            self.directory()?,
        )
        .with_cloud_mode(self.config.cloud_mode);

        Ok(AuthModule::new(
            self.registry.clone(),
            self.settings(),
            context,
            Arc::new(JwtTokenIssuer::with_secret(secret)),
        ))
    }
}

/// Run one command, writing its output to `out`.
pub fn run(workspace: &mut Workspace, command: Command, out: &mut impl Write) -> CliResult<()> {
    match command {
        Command::Providers => {
            print_json(out, &serde_json::to_value(workspace.registry.summaries())?)?;
        }
        Command::Settings { action } => run_settings(workspace, action, out)?,
        Command::User { action } => run_user(workspace, action, out)?,
        Command::Login {
            user_name,
            password,
        } => {
            let result = workspace.module()?.login(&user_name, &password)?;
            print_json(
                out,
                &json!({
                    "user_id": result.identity.user_id,
                    "token": result.token,
                    "issued_at": result.issued_at,
                    "expires_at": result.expires_at,
                }),
            )?;
        }
    }
    Ok(())
}

fn run_settings(
    workspace: &mut Workspace,
    action: SettingsCommand,
    out: &mut impl Write,
) -> CliResult<()> {
    match action {
        SettingsCommand::Show => {
            print_json(out, &workspace.settings().to_redacted_value())?;
        }
        SettingsCommand::Set {
            enable_external,
            token_lifetime,
        } => {
            workspace.edit_settings(out, |document| {
                if let Some(enable) = enable_external {
                    document["enable_external"] = json!(enable);
                }
                if let Some(secs) = token_lifetime {
                    document["token_lifetime_seconds"] = json!(secs);
                }
            })?;
            info!(?enable_external, ?token_lifetime, "settings updated");
        }
        SettingsCommand::Provider { name, config } => {
            if !workspace.registry.exists(&name) {
                return Err(CliError::UnknownProvider(name));
            }
            let config: Value = serde_json::from_str(&config)?;
            workspace.edit_settings(out, |document| {
                set_provider_value(document, &name, config);
            })?;
            info!(provider = %name, "provider configuration updated");
        }
    }
    Ok(())
}

fn run_user(workspace: &mut Workspace, action: UserCommand, out: &mut impl Write) -> CliResult<()> {
    match action {
        UserCommand::Add {
            user_name,
            password,
            email,
            database,
            group,
        } => {
            let user_name = user_name.trim().to_lowercase();
            let identities = &workspace.identities;
            if identities
                .find_by(IdentityField::UserName, &user_name)?
                .is_some()
            {
                return Err(CliError::UserExists(user_name));
            }

            let verifier = KeyedHashVerifier::from_secret(workspace.secret()?.as_bytes());
            let mut identity = Identity::new(&user_name, ProviderKind::Local.name())
                .with_password_hash(verifier.hash(&password));
            if let Some(email) = email {
                identity = identity.with_email(email.trim().to_lowercase());
            }
            if let Some(database) = database {
                identity = identity.with_database(database);
            }
            if let Some(group) = group {
                identity = identity.with_group(group);
            }

            let user_id = identities.insert(identity)?;
            info!(user_id, user_name = %user_name, "local user created");
            writeln!(out, "created user {} ({})", user_name, user_id)?;
        }
        UserCommand::List => {
            let users: Vec<Value> = workspace
                .identities
                .list()?
                .into_iter()
                .map(|identity| {
                    json!({
                        "user_id": identity.user_id,
                        "user_name": identity.user_name,
                        "email": identity.email,
                        "authenticator": identity.authenticator,
                        "group_id": identity.group_id,
                    })
                })
                .collect();
            print_json(out, &Value::Array(users))?;
        }
    }
    Ok(())
}

fn print_json(out: &mut impl Write, value: &Value) -> CliResult<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Report a failed command.
pub fn log_failure(error: &CliError) {
    match error {
        CliError::Auth(e) if e.is_configuration_error() => {
            warn!(error = %e, "authentication is misconfigured")
        }
        _ => debug!(error = %error, "command failed"),
    }
}
