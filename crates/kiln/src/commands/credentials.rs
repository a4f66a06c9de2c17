//! `kiln credentials` subcommand group.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use kiln_config::{CliSettings, Config};
use kiln_store_s3::{Credential, CredentialStore};

use crate::error::CliError;
use crate::output::Output;

/// Options shared by every credentials command.
#[derive(Args)]
pub(crate) struct StoreArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the credentials file (overrides config).
    #[arg(long)]
    credentials: Option<PathBuf>,
}

impl StoreArgs {
    fn open(&self) -> Result<CredentialStore, CliError> {
        let cli_settings = CliSettings {
            credentials_path: self.credentials.clone(),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        Ok(CredentialStore::new(config.credentials_path))
    }
}

/// Credential commands.
#[derive(Subcommand)]
pub(crate) enum CredentialsCommand {
    /// Store credentials for a bucket.
    Add(AddArgs),
    /// List buckets with stored credentials.
    List {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Remove the credentials of a bucket.
    Remove {
        /// Bucket name.
        name: String,
        #[command(flatten)]
        store: StoreArgs,
    },
}

/// Arguments for `credentials add`.
#[derive(Args)]
pub(crate) struct AddArgs {
    /// Bucket name.
    name: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: String,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: String,

    #[arg(long, env = "AWS_REGION", default_value = "")]
    region: String,

    /// Custom S3-compatible endpoint URL.
    #[arg(long)]
    endpoint: Option<String>,

    /// Encrypt the stored record with this PIN.
    #[arg(long, env = "KILN_PIN", hide_env_values = true)]
    pin: Option<String>,

    #[command(flatten)]
    store: StoreArgs,
}

impl CredentialsCommand {
    /// Execute the credentials subcommand.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        match self {
            Self::Add(args) => args.execute(&output),
            Self::List { store } => {
                let store = store.open()?;
                let names = store.names()?;
                if names.is_empty() {
                    output.info("No stored credentials");
                }
                for name in names {
                    let lock = if store.is_encrypted(&name)? {
                        " (PIN)"
                    } else {
                        ""
                    };
                    output.info(&format!("{name}{lock}"));
                }
                Ok(())
            }
            Self::Remove { name, store } => {
                if store.open()?.remove(&name)? {
                    output.success(&format!("Removed credentials for {name}"));
                } else {
                    output.warning(&format!("No credentials for {name}"));
                }
                Ok(())
            }
        }
    }
}

impl AddArgs {
    fn execute(self, output: &Output) -> Result<(), CliError> {
        if self.name.trim().is_empty() {
            return Err(CliError::Validation("bucket name must not be empty".to_owned()));
        }
        let store = self.store.open()?;
        let credential = Credential {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            region: self.region,
            endpoint: self.endpoint.filter(|e| !e.is_empty()),
        };
        store.put(&self.name, &credential, self.pin.as_deref())?;

        output.success(&format!(
            "Stored credentials for {} in {}",
            self.name,
            store.path().display()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: CredentialsCommand,
    }

    #[test]
    fn test_parse_add() {
        let cli = TestCli::try_parse_from([
            "kiln",
            "add",
            "site",
            "--access-key-id",
            "AKIA",
            "--secret-access-key",
            "secret",
            "--region",
            "eu-west-1",
            "--endpoint",
            "https://s3.example.com",
        ])
        .unwrap();

        let CredentialsCommand::Add(args) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(args.name, "site");
        assert_eq!(args.access_key_id, "AKIA");
        assert_eq!(args.region, "eu-west-1");
        assert_eq!(args.endpoint.as_deref(), Some("https://s3.example.com"));
    }

    #[test]
    fn test_parse_remove() {
        let cli = TestCli::try_parse_from(["kiln", "remove", "site"]).unwrap();

        assert!(matches!(cli.command, CredentialsCommand::Remove { ref name, .. } if name == "site"));
    }
}
