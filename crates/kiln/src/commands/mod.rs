//! CLI command implementations.

pub(crate) mod credentials;
pub(crate) mod sync;

pub(crate) use credentials::CredentialsCommand;
pub(crate) use sync::SyncArgs;
