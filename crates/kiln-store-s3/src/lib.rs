//! S3 backend for kiln.
//!
//! - [`RemoteStore`]: [`ObjectStore`](kiln_store::ObjectStore) over one bucket of an
//!   S3-compatible service
//! - [`S3Connector`]: builds and authenticates a [`RemoteStore`] from a [`Credential`]
//! - [`CredentialStore`]: per-bucket credentials persisted as JSON, optionally
//!   encrypted with a PIN

mod connector;
mod credentials;
mod remote;

pub use connector::{ConnectError, S3Connector};
pub use credentials::{Credential, CredentialError, CredentialStore};
pub use remote::RemoteStore;

/// Walk the error source chain and join all messages.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msgs = vec![err.to_string()];
    let mut source = err.source();
    while let Some(s) = source {
        let msg = s.to_string();
        if msgs.last() != Some(&msg) {
            msgs.push(msg);
        }
        source = s.source();
    }
    msgs.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_error_chain_joins_sources() {
        let err = Outer(std::io::Error::other("inner"));

        assert_eq!(error_chain(&err), "outer: inner");
    }
}
