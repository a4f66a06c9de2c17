//! `kiln sync` command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Args};
use kiln_config::{CliSettings, Config, RuntimeSourceConfig};
use kiln_store::ObjectStore;
use kiln_store_s3::{CredentialStore, S3Connector};
use kiln_store_static::StaticReadStore;
use kiln_sync::{Scope, StorageRouter, SyncEngine, SyncOptions};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the sync command.
#[derive(Args)]
#[command(group(ArgGroup::new("scope").required(true).args(["bucket", "dir"])))]
pub(crate) struct SyncArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remote bucket to publish to.
    #[arg(short, long)]
    bucket: Option<String>,

    /// PIN decrypting the bucket credentials.
    #[arg(long, env = "KILN_PIN", requires = "bucket", hide_env_values = true)]
    pin: Option<String>,

    /// Local directory to publish to.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Runtime build directory (overrides config).
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Runtime base URL (overrides config).
    #[arg(long, conflicts_with = "runtime_dir")]
    runtime_url: Option<String>,

    /// Path to the credentials file (overrides config).
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl SyncArgs {
    /// Execute the sync command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the scope cannot be activated.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            runtime_dir: self.runtime_dir,
            runtime_url: self.runtime_url,
            debounce_ms: None,
            credentials_path: self.credentials,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let runtime: Arc<dyn ObjectStore> = Arc::new(runtime_store(&config.runtime_resolved));
        match &config.runtime_resolved {
            RuntimeSourceConfig::Dir(dir) => {
                output.info(&format!("Runtime: {}", dir.display()));
                if !dir.is_dir() {
                    output.warning("Runtime directory does not exist, build assets are skipped");
                }
            }
            RuntimeSourceConfig::Url(url) => output.info(&format!("Runtime: {url}")),
        }

        let router = Arc::new(StorageRouter::new(
            Arc::clone(&runtime),
            Arc::new(S3Connector::new()),
            CredentialStore::new(config.credentials_path.clone()),
        ));
        let engine = SyncEngine::new(
            Arc::clone(&router) as Arc<dyn ObjectStore>,
            runtime,
            sync_options(&config),
        );

        let scope = match (self.bucket, self.dir) {
            (Some(bucket), _) => {
                router.activate_bucket(&bucket, self.pin.as_deref()).await?;
                router.scope()
            }
            (None, Some(dir)) => router.open_directory(dir).await?,
            (None, None) => {
                return Err(CliError::Validation(
                    "either --bucket or --dir is required".to_owned(),
                ));
            }
        };
        output.info(&format!("Scope: {}", describe(&scope)));

        let diff = engine.hydrate().await;
        engine.regenerate_all();
        engine.flush().await;

        let pages = engine.state().read(|data| data.tree.pages().len());
        router.clear();

        output.success(&format!("Published {pages} page(s)"));
        if !diff.uploaded.is_empty() {
            output.info(&format!("Uploaded {} build asset(s):", diff.uploaded.len()));
            for key in &diff.uploaded {
                output.item(key);
            }
        }
        if !diff.deleted.is_empty() {
            output.info(&format!("Deleted {} stale asset(s):", diff.deleted.len()));
            for key in &diff.deleted {
                output.item(key);
            }
        }

        Ok(())
    }
}

fn runtime_store(source: &RuntimeSourceConfig) -> StaticReadStore {
    match source {
        RuntimeSourceConfig::Dir(dir) => StaticReadStore::from_dir(dir.clone()),
        RuntimeSourceConfig::Url(url) => StaticReadStore::from_url(url.clone()),
    }
}

fn sync_options(config: &Config) -> SyncOptions {
    SyncOptions {
        debounce: config.sync.debounce(),
        prune_exclude: config.sync.prune_exclude.clone(),
        probe_files: config.sync.probe_files.clone(),
    }
}

fn describe(scope: &Scope) -> String {
    match scope {
        Scope::None => "none".to_owned(),
        Scope::Bucket(name) => format!("bucket {name}"),
        Scope::Directory { root, .. } => format!("directory {}", root.display()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: SyncArgs,
    }

    #[test]
    fn test_requires_scope() {
        assert!(TestCli::try_parse_from(["kiln"]).is_err());
    }

    #[test]
    fn test_bucket_and_dir_conflict() {
        assert!(TestCli::try_parse_from(["kiln", "--bucket", "b", "--dir", "out"]).is_err());
    }

    #[test]
    fn test_pin_requires_bucket() {
        assert!(TestCli::try_parse_from(["kiln", "--dir", "out", "--pin", "1234"]).is_err());
    }

    #[test]
    fn test_parse_bucket() {
        let cli = TestCli::try_parse_from(["kiln", "-b", "site", "--pin", "1234", "-v"]).unwrap();

        assert_eq!(cli.args.bucket.as_deref(), Some("site"));
        assert_eq!(cli.args.pin.as_deref(), Some("1234"));
        assert!(cli.args.dir.is_none());
        assert!(cli.args.verbose);
    }

    #[test]
    fn test_sync_options_from_config() {
        let mut config = Config::default();
        config.sync.debounce_ms = 250;
        config.sync.probe_files = vec!["robots.txt".to_owned()];

        let options = sync_options(&config);

        assert_eq!(options.debounce, Duration::from_millis(250));
        assert_eq!(options.prune_exclude, vec!["node_modules", ".git"]);
        assert_eq!(options.probe_files, vec!["robots.txt"]);
    }

    #[test]
    fn test_describe_scope() {
        assert_eq!(describe(&Scope::Bucket("site".to_owned())), "bucket site");
        assert_eq!(
            describe(&Scope::Directory {
                name: "out".to_owned(),
                root: PathBuf::from("/tmp/out"),
            }),
            "directory /tmp/out"
        );
    }
}
