//! CLI error types.

use kiln_config::ConfigError;
use kiln_store_s3::CredentialError;
use kiln_sync::RouterError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Credentials(#[from] CredentialError),

    #[error("{0}")]
    Router(#[from] RouterError),

    #[error("{0}")]
    Validation(String),
}
