//! Builds authenticated [`RemoteStore`]s from stored credentials.

use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::ProvideErrorMetadata;

use crate::credentials::Credential;
use crate::error_chain;
use crate::remote::RemoteStore;

/// Region used when a credential does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// Error returned when a bucket cannot be reached with the given credential.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// `HeadBucket` was rejected or could not be sent.
    #[error("{message}")]
    Authentication {
        /// Bucket that was probed.
        bucket: String,
        /// Plain message reported by the service.
        message: String,
    },
}

/// Creates S3 clients for buckets.
#[derive(Debug, Default, Clone)]
pub struct S3Connector;

impl S3Connector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build a client for `credential` and authenticate it against `bucket`.
    ///
    /// The client is torn down before the error is returned when the probe fails.
    pub async fn connect(
        &self,
        bucket: &str,
        credential: &Credential,
    ) -> Result<RemoteStore, ConnectError> {
        let client = Self::build_client(credential).await;
        let store = RemoteStore::new(bucket, client.clone());

        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket, "Authenticated");
                Ok(store)
            }
            Err(e) => {
                kiln_store::ObjectStore::teardown(&store);
                let message = e
                    .message()
                    .or_else(|| e.code())
                    .map_or_else(|| error_chain(&e), str::to_owned);
                tracing::warn!(bucket, error = %message, "Authentication failed");
                Err(ConnectError::Authentication {
                    bucket: bucket.to_owned(),
                    message,
                })
            }
        }
    }

    async fn build_client(credential: &Credential) -> Client {
        let region = if credential.region.is_empty() {
            DEFAULT_REGION.to_owned()
        } else {
            credential.region.clone()
        };
        let credentials = Credentials::new(
            &credential.access_key_id,
            &credential.secret_access_key,
            None,
            None,
            "kiln",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .credentials_provider(credentials);

        let endpoint = credential.endpoint.as_deref().filter(|e| !e.is_empty());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;

        // Custom endpoints (MinIO, R2, LocalStack) expect endpoint/bucket/key.
        if endpoint.is_some() {
            let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(true)
                .build();
            return Client::from_conf(s3_config);
        }

        Client::new(&sdk_config)
    }
}
