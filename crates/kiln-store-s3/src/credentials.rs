//! Per-bucket credentials persisted as a JSON file.
//!
//! Each record holds the access key id, secret, region and optional endpoint of
//! one bucket. When a PIN is given every field is encrypted with AES-256-GCM
//! under `SHA-256(pin)` and stored as base64 (`nonce || ciphertext`). Records are
//! only decrypted while a bucket is being activated.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes.
const NONCE_SIZE: usize = 12;

/// Decrypted credential for one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Region; empty selects the default region.
    pub region: String,
    /// Custom S3-compatible endpoint URL.
    pub endpoint: Option<String>,
}

/// Errors from reading or writing the credential file.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to access credentials file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid credentials file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("No credentials for bucket '{0}'")]
    UnknownBucket(String),
    #[error("Credentials for bucket '{0}' are encrypted, a PIN is required")]
    PinRequired(String),
    #[error("Failed to decrypt credentials for bucket '{0}', wrong PIN?")]
    Decrypt(String),
    #[error("Failed to encrypt credentials")]
    Encrypt,
}

/// On-disk shape of one record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialRecord {
    #[serde(default)]
    encrypted: bool,
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    region: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    endpoint: String,
}

/// JSON credential file keyed by bucket name.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the credential file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bucket names with stored credentials, sorted.
    pub fn names(&self) -> Result<Vec<String>, CredentialError> {
        Ok(self.load()?.into_keys().collect())
    }

    /// True if the record for `bucket` needs a PIN.
    pub fn is_encrypted(&self, bucket: &str) -> Result<bool, CredentialError> {
        self.load()?
            .get(bucket)
            .map(|r| r.encrypted)
            .ok_or_else(|| CredentialError::UnknownBucket(bucket.to_owned()))
    }

    /// Load the credential for `bucket`, decrypting it with `pin` if needed.
    pub fn get(&self, bucket: &str, pin: Option<&str>) -> Result<Credential, CredentialError> {
        let record = self
            .load()?
            .remove(bucket)
            .ok_or_else(|| CredentialError::UnknownBucket(bucket.to_owned()))?;

        if !record.encrypted {
            return Ok(Credential {
                access_key_id: record.access_key_id,
                secret_access_key: record.secret_access_key,
                region: record.region,
                endpoint: Some(record.endpoint).filter(|e| !e.is_empty()),
            });
        }

        let pin = pin
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CredentialError::PinRequired(bucket.to_owned()))?;
        let cipher = cipher(pin);
        let decrypt = |field: &str| {
            decrypt_field(&cipher, field).ok_or_else(|| CredentialError::Decrypt(bucket.to_owned()))
        };

        let endpoint = if record.endpoint.is_empty() {
            None
        } else {
            Some(decrypt(&record.endpoint)?).filter(|e| !e.is_empty())
        };
        Ok(Credential {
            access_key_id: decrypt(&record.access_key_id)?,
            secret_access_key: decrypt(&record.secret_access_key)?,
            region: if record.region.is_empty() {
                String::new()
            } else {
                decrypt(&record.region)?
            },
            endpoint,
        })
    }

    /// Store `credential` for `bucket`, replacing any previous record.
    pub fn put(
        &self,
        bucket: &str,
        credential: &Credential,
        pin: Option<&str>,
    ) -> Result<(), CredentialError> {
        let endpoint = credential.endpoint.clone().unwrap_or_default();
        let record = match pin.filter(|p| !p.is_empty()) {
            None => CredentialRecord {
                encrypted: false,
                access_key_id: credential.access_key_id.clone(),
                secret_access_key: credential.secret_access_key.clone(),
                region: credential.region.clone(),
                endpoint,
            },
            Some(pin) => {
                let cipher = cipher(pin);
                let encrypt = |field: &str| -> Result<String, CredentialError> {
                    if field.is_empty() {
                        Ok(String::new())
                    } else {
                        encrypt_field(&cipher, field)
                    }
                };
                CredentialRecord {
                    encrypted: true,
                    access_key_id: encrypt(&credential.access_key_id)?,
                    secret_access_key: encrypt(&credential.secret_access_key)?,
                    region: encrypt(&credential.region)?,
                    endpoint: encrypt(&endpoint)?,
                }
            }
        };

        let mut records = self.load()?;
        records.insert(bucket.to_owned(), record);
        self.save(&records)
    }

    /// Remove the record for `bucket`. Returns whether one existed.
    pub fn remove(&self, bucket: &str) -> Result<bool, CredentialError> {
        let mut records = self.load()?;
        let existed = records.remove(bucket).is_some();
        if existed {
            self.save(&records)?;
        }
        Ok(existed)
    }

    fn load(&self) -> Result<BTreeMap<String, CredentialRecord>, CredentialError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, records: &BTreeMap<String, CredentialRecord>) -> Result<(), CredentialError> {
        let io_err = |source| CredentialError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(records).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(io_err)
    }
}

fn cipher(pin: &str) -> Aes256Gcm {
    let digest = Sha256::digest(pin.as_bytes());
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest[..]))
}

fn encrypt_field(cipher: &Aes256Gcm, plaintext: &str) -> Result<String, CredentialError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CredentialError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

fn decrypt_field(cipher: &Aes256Gcm, encoded: &str) -> Option<String> {
    let data = STANDARD.decode(encoded).ok()?;
    if data.len() < NONCE_SIZE {
        return None;
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    let plaintext = cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
    String::from_utf8(plaintext).ok()
}
